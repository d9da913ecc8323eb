// ABOUTME: Status command: live container status for every configured service.
// ABOUTME: Reads the classification each status Task leaves on its blackboard.

use super::session::Session;
use clusteradm::error::Result;
use clusteradm::output::{Output, StatusRow};
use clusteradm::runner::{Phase, RunReport};
use clusteradm::types::Role;
use clusteradm::workflow::{CONTAINER_ID, SERVICE_STATUS, ServiceSpec};

pub async fn status(session: &Session, role: Option<Role>, output: &Output) -> Result<()> {
    let specs = session.services(role)?;
    let tasks = specs.iter().map(|s| session.workflows.status(s)).collect();
    let report = session.run(vec![Phase::from_tasks("status", tasks)]).await;

    output.status_table(&rows(&specs, &report));
    if !report.is_success() {
        output.run_report(&report);
    }
    report.into_result()?;
    Ok(())
}

fn rows(specs: &[ServiceSpec], report: &RunReport) -> Vec<StatusRow> {
    report
        .reports()
        .filter_map(|task| {
            let spec = specs.iter().find(|s| Some(&s.id) == task.identity.as_ref())?;
            let status = task.blackboard.get(SERVICE_STATUS)?.clone();
            let container = task
                .blackboard
                .get(CONTAINER_ID)
                .map(|c| c.short().to_string())
                .unwrap_or_else(|| "-".to_string());
            Some(StatusRow {
                id: spec.id.to_string(),
                role: spec.role.to_string(),
                host: spec.host.clone(),
                container,
                status,
            })
        })
        .collect()
}
