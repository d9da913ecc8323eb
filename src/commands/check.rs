// ABOUTME: Check command: preflight probes on every host before deploying.
// ABOUTME: One Task per host and check so every failing check is reported.

use super::deploy::finish;
use super::session::Session;
use clusteradm::checker::{self, Check};
use clusteradm::error::Result;
use clusteradm::output::Output;
use clusteradm::runner::Phase;
use clusteradm::task::Task;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const MIN_KERNEL: (u32, u32, u32) = (3, 15, 0);
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(3);

pub async fn check(session: &Session, output: &mut Output) -> Result<()> {
    output.start_timer();
    let specs = session.services(None)?;
    let connectors = session.config.connectors();
    let options = session.workflows.options().clone();

    let mut tasks = Vec::new();
    for (host, target) in &connectors {
        let on_host: Vec<_> = specs.iter().filter(|s| &s.host == host).collect();
        if on_host.is_empty() {
            continue;
        }
        let ports: BTreeSet<u16> = on_host
            .iter()
            .flat_map(|s| [s.client_port, s.peer_port])
            .flatten()
            .collect();
        let data_roots: BTreeSet<&str> = on_host
            .iter()
            .map(|s| s.layout.data_dir.as_str())
            .collect();

        let mut checks: Vec<Check> = vec![
            checker::ssh_reachable(),
            checker::engine_present(),
            checker::kernel_version(MIN_KERNEL),
            checker::clock_skew(MAX_CLOCK_SKEW),
        ];
        checks.extend(data_roots.into_iter().map(checker::directory_writable));
        checks.extend(ports.into_iter().map(checker::port_available));

        for check in checks {
            let mut task = Task::new("check", format!("{host}: {}", check.name()))
                .with_target(Arc::clone(target))
                .with_options(options.clone());
            check.add_to(&mut task);
            tasks.push(task);
        }
    }

    output.progress(&format!("Running {} check(s)", tasks.len()));
    let report = session.run(vec![Phase::from_tasks("check", tasks)]).await;
    finish(output, report)?;
    output.success("All checks passed");
    Ok(())
}
