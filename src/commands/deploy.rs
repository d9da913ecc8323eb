// ABOUTME: Deploy, lifecycle and clean commands.
// ABOUTME: Build one Task per service, grouped into per-role phases, and run them.

use super::session::{Session, phases_by_role};
use clusteradm::error::{Error, Result};
use clusteradm::output::Output;
use clusteradm::runner::RunReport;
use clusteradm::types::Role;
use clusteradm::workflow::{CleanItems, Lifecycle};

pub async fn deploy(session: &Session, role: Option<Role>, output: &mut Output) -> Result<()> {
    output.start_timer();
    let specs = session.services(role)?;
    output.progress(&format!(
        "Deploying {} service(s) of cluster {}",
        specs.len(),
        session.cluster.name
    ));

    let phases = phases_by_role("deploy", &specs, false, |s| session.workflows.deploy(s));
    let report = session.run(phases).await;
    finish(output, report)?;

    // The persisted topology is the baseline for the next migrate.
    if role.is_none() {
        let topology = session.config.topology().to_yaml()?;
        session
            .storage
            .update_topology(session.cluster.id, &topology)
            .await?;
    }
    output.success("Deployment complete!");
    Ok(())
}

pub async fn lifecycle(
    session: &Session,
    role: Option<Role>,
    action: Lifecycle,
    output: &mut Output,
) -> Result<()> {
    output.start_timer();
    let specs = session.services(role)?;
    let reverse = action == Lifecycle::Stop;
    let phases = phases_by_role(action.as_str(), &specs, reverse, |s| {
        session.workflows.lifecycle(s, action)
    });
    let report = session.run(phases).await;
    finish(output, report)?;
    output.success(&format!("{action} complete"));
    Ok(())
}

pub async fn clean(
    session: &Session,
    role: Option<Role>,
    only: &str,
    output: &mut Output,
) -> Result<()> {
    let items = CleanItems::parse(only).map_err(Error::InvalidConfig)?;
    output.start_timer();
    let specs = session.services(role)?;
    let phases = phases_by_role("clean", &specs, true, |s| session.workflows.clean(s, items));
    let report = session.run(phases).await;
    finish(output, report)?;
    output.success("Clean complete");
    Ok(())
}

/// Print the report and turn failures into an error.
pub(super) fn finish(output: &Output, report: RunReport) -> Result<()> {
    output.run_report(&report);
    report.into_result()?;
    Ok(())
}
