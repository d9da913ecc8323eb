// ABOUTME: Migrate command: move members whose host changed since the last deploy.
// ABOUTME: Diffs the stored topology against the config and runs one migration plan per move.

use super::deploy::finish;
use super::session::Session;
use clusteradm::error::Result;
use clusteradm::output::Output;
use clusteradm::topology::{self, Topology};
use clusteradm::workflow::{MemberMove, MemberProtocol};

pub async fn migrate(session: &Session, output: &mut Output) -> Result<()> {
    output.start_timer();
    let current = Topology::from_yaml(&session.cluster.topology)?;
    let desired = session.config.topology();
    let diff = topology::diff(&current, &desired);

    for placement in &diff.added {
        output.progress(&format!(
            "  {} on {} is new; run deploy to create it",
            placement.role, placement.host
        ));
    }
    for placement in &diff.removed {
        output.progress(&format!(
            "  {} on {} is no longer configured; clean it explicitly",
            placement.role, placement.host
        ));
    }
    if diff.moved.is_empty() {
        output.success("Nothing to migrate");
        return Ok(());
    }

    let cluster_id = session.cluster.id;
    let desired_specs = session.config.service_specs(cluster_id)?;
    for moved in &diff.moved {
        let mut pair = session
            .config
            .specs_for(&[moved.from.clone(), moved.to.clone()], cluster_id)?
            .into_iter();
        let (Some(from), Some(to)) = (pair.next(), pair.next()) else {
            continue;
        };
        output.progress(&format!("Migrating {} -> {}", from.id, to.id));

        let protocol = MemberProtocol::for_role(from.role);
        let members: Vec<_> = desired_specs
            .iter()
            .filter(|s| s.role == from.role)
            .cloned()
            .collect();
        let dependents: Vec<_> = desired_specs
            .iter()
            .filter(|s| protocol.dependent_key(s.role).is_some())
            .cloned()
            .collect();

        let plan = session
            .workflows
            .plan_migration(&MemberMove { from, to }, &members, &dependents)
            .await?;
        if plan.is_empty() {
            output.progress("  source member already gone, skipping");
            continue;
        }
        let report = session.run(plan.into_phases()).await;
        finish(output, report)?;
    }

    session
        .storage
        .update_topology(cluster_id, &desired.to_yaml()?)
        .await?;
    output.success("Migration complete");
    Ok(())
}
