// ABOUTME: Command module aggregator for the clusteradm CLI.
// ABOUTME: Re-exports one handler per subcommand.

mod audit;
mod check;
mod deploy;
mod migrate;
mod session;
mod status;

pub use audit::audit;
pub use check::check;
pub use deploy::{clean, deploy, lifecycle};
pub use migrate::migrate;
pub use session::Session;
pub use status::status;
