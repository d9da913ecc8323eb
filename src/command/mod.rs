// ABOUTME: Single-use command builders rendered from parameterized templates.
// ABOUTME: Shell verbs and container-engine verbs share one renderer and quoting rule.

mod container;
mod shell;
mod template;

pub use container::{ContainerCommand, ContainerVerb};
pub use shell::{ShellCommand, ShellVerb};
pub use template::{TemplateError, render};

use crate::transport::ExecOptions;

/// A fully parameterized command that can be turned into one command line.
///
/// `build` consumes the builder: one builder, one command.
pub trait CommandBuilder: Send {
    fn build(self, options: &ExecOptions) -> Result<String, TemplateError>;
}

/// A pre-rendered command line, for scripts handed over by collaborators.
#[derive(Debug, Clone)]
pub struct RawCommand(pub String);

impl CommandBuilder for RawCommand {
    fn build(self, _options: &ExecOptions) -> Result<String, TemplateError> {
        Ok(self.0)
    }
}

/// Quote a word for POSIX shells. Plain words pass through untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '@' | '+' | '%')
        });
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}
