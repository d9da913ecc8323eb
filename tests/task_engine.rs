// ABOUTME: Integration tests for Task execution and the runner over a scripted transport.
// ABOUTME: Connection lifetime, privilege wrapping, skip/break handling, cancellation and waves.

mod support;

use async_trait::async_trait;
use clusteradm::command::ContainerCommand;
use clusteradm::errno;
use clusteradm::runner::{Phase, RunErrorKind, Runner};
use clusteradm::step::{CreateDirectories, Lambda, RunCommand};
use clusteradm::task::{Context, Slot, StepOutcome, Task, TaskOutcome};
use clusteradm::transport::{Connector, ExecOptions, Transport, TransportError};
use clusteradm::types::{Role, ServiceId};
use std::sync::Arc;
use std::time::Duration;
use support::mock_host::MockHost;

const OUT: Slot<String> = Slot::new("test.out");

fn task_on(host: &MockHost, name: &str) -> Task {
    Task::new(name, host.name()).with_target(host.connector())
}

#[derive(Debug)]
struct Unreachable;

#[async_trait]
impl Connector for Unreachable {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        Err(TransportError::Connect {
            addr: "10.0.0.9:22".to_string(),
            reason: "connection refused".to_string(),
        })
    }

    fn describe(&self) -> String {
        "root@10.0.0.9:22".to_string()
    }
}

#[tokio::test]
async fn one_connection_per_task_closed_after_failure() {
    support::init_tracing();
    let host = MockHost::new("host1");
    host.fail("false", 1, "nope");

    let mut task = task_on(&host, "probe");
    task.add_step(RunCommand::new("first", "true"));
    task.add_step(RunCommand::new("second", "false"));
    task.add_step(RunCommand::new("third", "true"));
    task.add_post_step(RunCommand::new("cleanup", "rm -f /tmp/probe"));
    let report = task.execute().await;

    assert_eq!(report.outcome.error().map(|e| e.code), Some(errno::COMMAND_FAILED));
    assert_eq!(report.steps_run(), 2);
    assert_eq!(report.post_steps_run, 1);
    assert_eq!(host.log(), vec!["true", "false", "rm -f /tmp/probe"]);
    assert_eq!(host.connects(), 1);
    assert_eq!(host.closes(), 1);
    assert_eq!(report.target, "mock:host1");
}

#[tokio::test]
async fn unreachable_host_fails_before_any_step() {
    let mut task = Task::new("probe", "host9").with_target(Arc::new(Unreachable));
    task.add_step(RunCommand::new("first", "true"));
    let report = task.execute().await;

    let err = report.outcome.error().unwrap();
    assert_eq!(err.code, errno::CONNECT_FAILED);
    assert!(err.to_string().contains("connection refused"));
    assert!(report.steps.is_empty());
}

#[tokio::test]
async fn sudo_alias_prefixes_remote_commands() {
    let host = MockHost::new("host1");
    let options = ExecOptions::default().with_sudo(true).with_sudo_alias("sudo -E");
    let mut task = task_on(&host, "mkdir").with_options(options);
    task.add_step(CreateDirectories::new(["/data/a", "/data/b"]));
    let report = task.execute().await;

    assert!(report.is_success());
    assert_eq!(host.log(), vec!["sudo -E mkdir -p /data/a /data/b"]);
}

#[tokio::test]
async fn local_commands_bypass_the_remote_host() {
    let host = MockHost::new("host1");
    let mut task = task_on(&host, "mixed");
    task.add_step(
        RunCommand::new("local echo", "echo from-here")
            .options(ExecOptions::default().with_local(true))
            .capture(OUT),
    );
    task.add_step(RunCommand::new("remote", "hostname"));
    let report = task.execute().await;

    assert!(report.is_success());
    assert_eq!(report.blackboard.get(OUT).map(|s| s.trim()), Some("from-here"));
    assert_eq!(host.log(), vec!["hostname"]);
}

#[tokio::test]
async fn command_timeout_is_its_own_code() {
    let host = MockHost::new("host1");
    host.hang("sleep");
    let options = ExecOptions::default().with_timeout(Duration::from_millis(50));
    let mut task = task_on(&host, "slow").with_options(options);
    task.add_step(RunCommand::new("wait", "sleep 600"));
    let report = task.execute().await;

    assert_eq!(report.outcome.error().map(|e| e.code), Some(errno::COMMAND_TIMEOUT));
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn cancel_abandons_running_tasks_and_closes_transports() {
    support::init_tracing();
    let host = MockHost::new("host1");
    host.hang("sleep");
    let runner = Runner::new(4);
    let handle = runner.cancel_handle();

    let mut stuck = task_on(&host, "stuck");
    stuck.add_step(RunCommand::new("wait", "sleep 600"));
    let mut later = task_on(&host, "later");
    later.add_step(RunCommand::new("never", "true"));
    let phases = vec![
        Phase::new("first").with_task(stuck),
        Phase::new("second").with_task(later),
    ];

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });
    let report = tokio::time::timeout(Duration::from_secs(5), runner.run(phases))
        .await
        .expect("cancel must stop the run");
    canceller.await.unwrap();

    assert!(report.was_cancelled());
    assert!(report.phases[1].not_run);
    assert_eq!(host.log(), vec!["sleep 600"]);
    assert_eq!(host.closes(), host.connects());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::Cancelled);
}

#[tokio::test]
async fn same_service_tasks_never_overlap() {
    let host = MockHost::new("host1");
    let id = ServiceId::new("c1", Role::Etcd, "host1", 0).unwrap();
    let other = ServiceId::new("c1", Role::Etcd, "host1", 1).unwrap();

    let tasks = vec![
        task_on(&host, "a").with_identity(id.clone()),
        task_on(&host, "b").with_identity(id.clone()),
        task_on(&host, "c").with_identity(other),
    ]
    .into_iter()
    .map(|mut t| {
        let name = t.name().to_string();
        t.add_step(RunCommand::new("mark", format!("echo {name}")));
        t
    })
    .collect();

    let report = Runner::new(8).run_tasks("batch", tasks).await;

    assert!(report.is_success());
    let log = host.log();
    let a = log.iter().position(|l| l == "echo a").unwrap();
    let b = log.iter().position(|l| l == "echo b").unwrap();
    assert!(a < b, "{log:?}");
    // Reports follow the waves: `b` waits for the wave after `a`.
    let names: Vec<&str> = report.reports().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn skipped_task_counts_as_success() {
    let host = MockHost::new("host1");
    let mut task = task_on(&host, "noop");
    task.add_step(Lambda::new("skip", |_ctx: &mut Context| {
        Ok(StepOutcome::SkipRemaining)
    }));
    task.add_step(RunCommand::new("unreached", "true"));
    let report = task.execute().await;

    assert_eq!(report.outcome, TaskOutcome::Skipped);
    assert!(report.is_success());
    assert!(host.log().is_empty());
}

#[tokio::test]
async fn skip_at_third_of_five_steps_still_runs_post_steps() {
    let host = MockHost::new("host1");
    let mut task = task_on(&host, "configure");
    task.add_step(RunCommand::new("one", "echo 1"));
    task.add_step(RunCommand::new("two", "echo 2"));
    task.add_step(Lambda::new("nothing to change", |_ctx: &mut Context| {
        Ok(StepOutcome::SkipRemaining)
    }));
    task.add_step(RunCommand::new("four", "echo 4"));
    task.add_step(RunCommand::new("five", "echo 5"));
    task.add_post_step(RunCommand::new("cleanup a", "rm -f /tmp/a"));
    task.add_post_step(RunCommand::new("cleanup b", "rm -f /tmp/b"));
    let report = task.execute().await;

    assert_eq!(report.outcome, TaskOutcome::Skipped);
    assert!(report.is_success());
    assert_eq!(report.steps_run(), 3);
    assert_eq!(report.post_steps_run, 2);
    assert_eq!(host.log(), vec!["echo 1", "echo 2", "rm -f /tmp/a", "rm -f /tmp/b"]);
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn break_at_first_step_runs_only_post_steps() {
    let host = MockHost::new("host1");
    let mut task = task_on(&host, "deploy");
    task.add_step(Lambda::new("already deployed", |_ctx: &mut Context| {
        Ok(StepOutcome::BreakAsDone)
    }));
    task.add_step(RunCommand::new("create", "docker create img"));
    task.add_step(RunCommand::new("start", "docker start x"));
    task.add_post_step(RunCommand::new("cleanup", "rm -f /tmp/scratch"));
    let report = task.execute().await;

    assert_eq!(report.outcome, TaskOutcome::Broken);
    assert!(report.is_success());
    assert_eq!(report.steps_run(), 1);
    assert!(report.side_effecting_steps().is_empty());
    assert_eq!(report.post_steps_run, 1);
    assert_eq!(host.log(), vec!["rm -f /tmp/scratch"]);
}

#[tokio::test]
async fn locality_and_privilege_only_change_the_wrapping() {
    let host = MockHost::new("host1");
    let remote_transport = host.connector().connect().await.ok();
    let ctx = Context::new(remote_transport, ExecOptions::default());
    assert_eq!(ctx.remote_addr(), "mock:host1");
    let command = || ContainerCommand::stop("c1_etcd_host1_0");
    let base = ExecOptions::default().with_sudo_alias("doas");
    let render = |options: ExecOptions| ctx.render(command(), &options).unwrap();

    let remote = render(base.clone());
    let remote_sudo = render(base.clone().with_sudo(true));
    let local = render(base.clone().with_local(true));
    let local_sudo = render(base.with_local(true).with_sudo(true));

    assert_eq!(remote, "docker stop c1_etcd_host1_0");
    assert_eq!(remote_sudo, format!("doas {remote}"));
    assert_eq!(local, format!("bash -c '{remote}'"));
    assert_eq!(local_sudo, format!("bash -c '{remote_sudo}'"));
}
