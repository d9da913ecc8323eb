// ABOUTME: Integration tests for the file-backed state store.
// ABOUTME: Persistence across reopen, concurrent writes per identity and audit history.

use clusteradm::storage::{AuditStatus, ContainerState, RecordWrite, Storage, StorageError};
use clusteradm::types::{ContainerId, Role, ServiceId};
use std::sync::Arc;

fn sid(role: Role, host: &str, sequence: u32) -> ServiceId {
    ServiceId::new("prod", role, host, sequence).unwrap()
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("nested/data.db").display());
    let id = sid(Role::Etcd, "host1", 0);

    {
        let store = Storage::open(&url).await.unwrap();
        let cluster = store.insert_cluster("prod", "production", "").await.unwrap();
        store.checkout_cluster("prod").await.unwrap();
        store
            .update_topology(cluster, "placements: []\n")
            .await
            .unwrap();
        store
            .record_container(&id, cluster, &ContainerId::new("c0ffee"))
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = Storage::open(&url).await.unwrap();
    let current = store.get_current_cluster().await.unwrap().unwrap();
    assert_eq!(current.name, "prod");
    assert_eq!(current.description, "production");
    assert_eq!(current.topology, "placements: []\n");
    assert_eq!(
        store.container_state(&id).await.unwrap(),
        ContainerState::Bound(ContainerId::new("c0ffee"))
    );
}

#[tokio::test]
async fn concurrent_records_for_one_identity_keep_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("data.db").display());
    let store = Arc::new(Storage::open(&url).await.unwrap());
    let cluster = store.insert_cluster("prod", "", "").await.unwrap();
    let id = sid(Role::Chunkserver, "host2", 3);

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store
                .record_container(&id, cluster, &ContainerId::new(format!("c{i}")))
                .await
                .unwrap()
        }));
    }
    let mut writes = Vec::new();
    for handle in handles {
        writes.push(handle.await.unwrap());
    }

    assert_eq!(writes.iter().filter(|w| **w == RecordWrite::Inserted).count(), 1);
    assert_eq!(store.list_containers(cluster).await.unwrap().len(), 1);
}

#[tokio::test]
async fn containers_are_listed_per_cluster() {
    let store = Storage::open("sqlite::memory:").await.unwrap();
    let a = store.insert_cluster("a", "", "").await.unwrap();
    let b = store.insert_cluster("b", "", "").await.unwrap();
    let in_a = ServiceId::new("a", Role::Mds, "host1", 0).unwrap();
    let in_b = ServiceId::new("b", Role::Mds, "host1", 0).unwrap();
    store.record_container(&in_a, a, &ContainerId::new("x")).await.unwrap();
    store.record_container(&in_b, b, &ContainerId::new("y")).await.unwrap();

    let rows = store.list_containers(a).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].service_id, in_a);
}

#[tokio::test]
async fn topology_update_of_unknown_cluster_is_not_found() {
    let store = Storage::open("sqlite::memory:").await.unwrap();
    let err = store.update_topology(42, "").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn audit_lists_newest_first_with_limit() {
    let store = Storage::open("sqlite::memory:").await.unwrap();
    let first = store.insert_audit("/ops", "clusteradm deploy").await.unwrap();
    store.finish_audit(first, AuditStatus::Success, 0).await.unwrap();
    let second = store.insert_audit("/ops", "clusteradm migrate").await.unwrap();
    store.finish_audit(second, AuditStatus::Cancelled, 2).await.unwrap();
    store.insert_audit("/ops", "clusteradm status").await.unwrap();

    let entries = store.list_audit(2).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].command, "clusteradm status");
    assert_eq!(entries[0].status, AuditStatus::Running);
    assert_eq!(entries[1].status, AuditStatus::Cancelled);
    assert_eq!(entries[1].error_code, 2);
}

#[tokio::test]
async fn unsupported_scheme_is_rejected() {
    let err = Storage::open("postgres://db/clusteradm").await.unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedScheme(_)));
}
