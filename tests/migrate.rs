// ABOUTME: Integration tests for member migration plans run through the phased runner.
// ABOUTME: Checks phase order, membership token judging and dependent config rewrites.

mod support;

use clusteradm::errno;
use clusteradm::runner::{RunErrorKind, Runner};
use clusteradm::storage::{ContainerState, Storage};
use clusteradm::transport::ExecOptions;
use clusteradm::types::{ContainerId, Role};
use clusteradm::workflow::{MemberMove, ServiceSpec, Workflows};
use std::sync::Arc;
use support::mock_host::{MockHost, service_on};

struct Cluster {
    wf: Workflows,
    hosts: Vec<MockHost>,
}

impl Cluster {
    /// Four hosts; etcd bound on host1..host3, mds bound on host1.
    async fn new() -> Self {
        support::init_tracing();
        let storage = Storage::open("sqlite::memory:").await.unwrap();
        storage.insert_cluster("c1", "", "").await.unwrap();
        let hosts: Vec<MockHost> = (1..=4).map(|i| MockHost::new(&format!("host{i}"))).collect();
        for (i, host) in hosts.iter().take(3).enumerate() {
            let etcd = service_on(host, Role::Etcd, 0);
            storage
                .record_container(&etcd.id, 1, &ContainerId::new(format!("etcd{}", i + 1)))
                .await
                .unwrap();
        }
        let mds = service_on(&hosts[0], Role::Mds, 0);
        storage
            .record_container(&mds.id, 1, &ContainerId::new("mds1"))
            .await
            .unwrap();
        hosts[0].put_file(
            &mds.config_path(),
            "mds.listen.addr=host1.lan:6700\nmds.etcd.endpoint=host1.lan:2379,host2.lan:2379,host3.lan:2379\n",
        );
        hosts[3].reply("docker create", "etcd4\n");

        Self {
            wf: Workflows::new(Arc::new(storage), ExecOptions::default()),
            hosts,
        }
    }

    fn etcd(&self, host: usize) -> ServiceSpec {
        service_on(&self.hosts[host - 1], Role::Etcd, 0)
    }

    fn mds(&self) -> ServiceSpec {
        service_on(&self.hosts[0], Role::Mds, 0)
    }

    /// Move etcd from host3 to host4.
    fn etcd_move(&self) -> (MemberMove, Vec<ServiceSpec>) {
        let mv = MemberMove {
            from: self.etcd(3),
            to: self.etcd(4),
        };
        let members = vec![self.etcd(1), self.etcd(2), self.etcd(4)];
        (mv, members)
    }

    async fn state(&self, service: &ServiceSpec) -> ContainerState {
        self.wf.storage().container_state(&service.id).await.unwrap()
    }
}

fn position(log: &[String], pattern: &str) -> usize {
    log.iter()
        .position(|l| l.contains(pattern))
        .unwrap_or_else(|| panic!("no '{pattern}' in {log:?}"))
}

#[tokio::test]
async fn etcd_move_adds_amends_removes_then_cleans() {
    let cluster = Cluster::new().await;
    let peer = &cluster.hosts[0];
    peer.reply("add-member", "SUCCESS\n");
    peer.reply("remove-member", "NOTEXIST\n");
    let (mv, members) = cluster.etcd_move();

    let plan = cluster
        .wf
        .plan_migration(&mv, &members, &[cluster.mds()])
        .await
        .unwrap();
    assert_eq!(
        plan.phase_names(),
        vec!["add member", "create member", "amend dependents", "remove member", "clean member"]
    );

    let report = Runner::new(4).run(plan.into_phases()).await;
    assert!(report.is_success(), "{:?}", report.first_error());

    let log = peer.log();
    let add = position(&log, "add-member");
    let restart = position(&log, "docker restart mds1");
    let remove = position(&log, "remove-member");
    assert!(add < restart && restart < remove, "{log:?}");
    assert!(log[add].starts_with("docker exec etcd1 sh -c "));

    assert_eq!(
        cluster.hosts[0].file(&cluster.mds().config_path()).unwrap(),
        "mds.listen.addr=host1.lan:6700\nmds.etcd.endpoint=host1.lan:2379,host2.lan:2379,host4.lan:2379\n"
    );
    assert_eq!(cluster.state(&cluster.etcd(3)).await, ContainerState::Cleaned);
    assert_eq!(
        cluster.state(&cluster.etcd(4)).await,
        ContainerState::Bound(ContainerId::new("etcd4"))
    );
    assert_eq!(cluster.hosts[2].log_matching("docker rm --force etcd3").len(), 1);
}

#[tokio::test]
async fn rerun_after_partial_move_tolerates_existing_member() {
    let cluster = Cluster::new().await;
    let peer = &cluster.hosts[0];
    peer.reply("add-member", "EXIST\n");
    peer.reply("remove-member", "SUCCESS\n");
    let (mv, members) = cluster.etcd_move();

    let plan = cluster
        .wf
        .plan_migration(&mv, &members, &[cluster.mds()])
        .await
        .unwrap();
    let report = Runner::new(4).run(plan.into_phases()).await;

    assert!(report.is_success(), "{:?}", report.first_error());
}

#[tokio::test]
async fn rejected_add_halts_the_move() {
    let cluster = Cluster::new().await;
    cluster.hosts[0].reply("add-member", "etcdserver: unhealthy cluster\n");
    let (mv, members) = cluster.etcd_move();

    let plan = cluster
        .wf
        .plan_migration(&mv, &members, &[cluster.mds()])
        .await
        .unwrap();
    let report = Runner::new(4).run(plan.into_phases()).await;

    assert!(!report.is_success());
    assert_eq!(report.first_error().map(|e| e.code), Some(errno::ADD_MEMBER_FAILED));
    assert!(report.phases[1..].iter().all(|p| p.not_run));
    assert!(cluster.hosts[3].log().is_empty(), "new member must not be created");
    assert_eq!(
        cluster.state(&cluster.etcd(3)).await,
        ContainerState::Bound(ContainerId::new("etcd3"))
    );

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::TasksFailed);
    assert_eq!(err.code(), errno::ADD_MEMBER_FAILED.code);
}

#[tokio::test]
async fn failed_add_script_surfaces_its_output() {
    let cluster = Cluster::new().await;
    cluster.hosts[0].fail("add-member", 1, "Error: context deadline exceeded");
    let (mv, members) = cluster.etcd_move();

    let plan = cluster.wf.plan_migration(&mv, &members, &[]).await.unwrap();
    let report = Runner::new(4).run(plan.into_phases()).await;

    let err = report.first_error().unwrap();
    assert_eq!(err.code, errno::ADD_MEMBER_FAILED);
    assert!(err.clue.as_deref().unwrap_or_default().contains("deadline"));
}

#[tokio::test]
async fn unbound_source_yields_empty_plan() {
    let cluster = Cluster::new().await;
    let mv = MemberMove {
        from: service_on(&cluster.hosts[3], Role::Etcd, 1),
        to: cluster.etcd(4),
    };

    let plan = cluster
        .wf
        .plan_migration(&mv, &[cluster.etcd(4)], &[])
        .await
        .unwrap();

    assert!(plan.is_empty());
}

#[tokio::test]
async fn mds_move_has_no_membership_phases() {
    let cluster = Cluster::new().await;
    let chunkserver = service_on(&cluster.hosts[1], Role::Chunkserver, 0);
    cluster
        .wf
        .storage()
        .record_container(&chunkserver.id, 1, &ContainerId::new("cs2"))
        .await
        .unwrap();
    cluster.hosts[1].put_file(&chunkserver.config_path(), "mds.listen.addr=host1.lan:6700\n");
    cluster.hosts[3].reply("docker create", "mds4\n");

    let mv = MemberMove {
        from: cluster.mds(),
        to: service_on(&cluster.hosts[3], Role::Mds, 0),
    };
    let members = vec![mv.to.clone()];
    let plan = cluster
        .wf
        .plan_migration(&mv, &members, &[chunkserver.clone(), cluster.etcd(1)])
        .await
        .unwrap();
    assert_eq!(
        plan.phase_names(),
        vec!["create member", "amend dependents", "clean member"]
    );

    let report = Runner::new(4).run(plan.into_phases()).await;
    assert!(report.is_success(), "{:?}", report.first_error());
    assert_eq!(
        cluster.hosts[1].file(&chunkserver.config_path()).unwrap(),
        "mds.listen.addr=host4.lan:6700\n"
    );
    assert!(cluster.hosts[0].log_matching("member").is_empty());
}
