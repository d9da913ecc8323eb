// ABOUTME: Typed state-store API over a Driver.
// ABOUTME: Container writes are serialized per service identity and never delete rows.

use super::driver::{Driver, Row, Value, open_driver};
use super::locks::KeyedLocks;
use super::records::{
    AuditEntry, AuditStatus, ClientRecord, Cluster, ContainerRecord, ContainerState, Playground,
    RecordWrite,
};
use super::schema::SCHEMA;
use super::StorageError;
use crate::types::{ContainerId, ServiceId};
use chrono::{DateTime, Utc};
use tracing::debug;

pub struct Storage {
    driver: Box<dyn Driver>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("scheme", &self.driver.scheme())
            .finish()
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_time(row: &Row, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let raw = row.get_str(column)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Decode {
            column: column.to_string(),
            reason: e.to_string(),
        })
}

fn cluster_from_row(row: &Row) -> Result<Cluster, StorageError> {
    Ok(Cluster {
        id: row.get_i64("id")?,
        name: row.get_str("name")?.to_string(),
        description: row.get_str("description")?.to_string(),
        topology: row.get_str("topology")?.to_string(),
        create_time: parse_time(row, "create_time")?,
        current: row.get_bool("current")?,
    })
}

fn container_from_row(row: &Row) -> Result<ContainerRecord, StorageError> {
    Ok(ContainerRecord {
        service_id: ServiceId::from_stored(row.get_str("id")?),
        cluster_id: row.get_i64("cluster_id")?,
        state: ContainerState::from_stored(row.get_str("container_id")?),
    })
}

fn client_from_row(row: &Row) -> Result<ClientRecord, StorageError> {
    Ok(ClientRecord {
        id: row.get_str("id")?.to_string(),
        kind: row.get_str("kind")?.to_string(),
        host: row.get_str("host")?.to_string(),
        container_id: row.get_str("container_id")?.to_string(),
        aux_info: row.get_str("aux_info")?.to_string(),
    })
}

fn playground_from_row(row: &Row) -> Result<Playground, StorageError> {
    Ok(Playground {
        id: row.get_i64("id")?,
        name: row.get_str("name")?.to_string(),
        create_time: parse_time(row, "create_time")?,
        mount_point: row.get_str("mount_point")?.to_string(),
        status: row.get_str("status")?.to_string(),
    })
}

fn audit_from_row(row: &Row) -> Result<AuditEntry, StorageError> {
    Ok(AuditEntry {
        id: row.get_i64("id")?,
        execute_time: parse_time(row, "execute_time")?,
        work_directory: row.get_str("work_directory")?.to_string(),
        command: row.get_str("command")?.to_string(),
        status: AuditStatus::from_code(row.get_i64("status")?),
        error_code: u32::try_from(row.get_i64("error_code")?).unwrap_or_default(),
    })
}

impl Storage {
    /// Open the store at `url` and make sure the schema exists.
    pub async fn open(url: &str) -> Result<Self, StorageError> {
        let driver = open_driver(url).await?;
        Self::with_driver(driver).await
    }

    pub async fn with_driver(driver: Box<dyn Driver>) -> Result<Self, StorageError> {
        driver.execute_batch(SCHEMA).await?;
        debug!(scheme = driver.scheme(), "state store ready");
        Ok(Self {
            driver,
            locks: KeyedLocks::default(),
        })
    }

    pub async fn close(&self) -> Result<(), StorageError> {
        self.driver.close().await
    }

    async fn query_one<T>(
        &self,
        sql: &str,
        args: &[Value],
        decode: fn(&Row) -> Result<T, StorageError>,
    ) -> Result<Option<T>, StorageError> {
        let mut rows = self.driver.query(sql, args).await?;
        rows.next().map(|r| decode(&r)).transpose()
    }

    async fn query_all<T>(
        &self,
        sql: &str,
        args: &[Value],
        decode: fn(&Row) -> Result<T, StorageError>,
    ) -> Result<Vec<T>, StorageError> {
        let rows = self.driver.query(sql, args).await?;
        rows.map(|r| decode(&r)).collect()
    }

    // clusters

    /// Insert a cluster and return the id the store assigned.
    pub async fn insert_cluster(
        &self,
        name: &str,
        description: &str,
        topology: &str,
    ) -> Result<i64, StorageError> {
        let result = self
            .driver
            .write(
                "INSERT INTO clusters (name, description, topology, create_time, current) \
                 VALUES (?, ?, ?, ?, 0)",
                &[name.into(), description.into(), topology.into(), now().into()],
            )
            .await?;
        Ok(result.last_insert_id)
    }

    pub async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>, StorageError> {
        self.query_one("SELECT * FROM clusters WHERE name = ?", &[name.into()], cluster_from_row)
            .await
    }

    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, StorageError> {
        self.query_all("SELECT * FROM clusters ORDER BY id", &[], cluster_from_row)
            .await
    }

    pub async fn get_current_cluster(&self) -> Result<Option<Cluster>, StorageError> {
        self.query_one("SELECT * FROM clusters WHERE current = 1", &[], cluster_from_row)
            .await
    }

    /// Make `name` the current cluster.
    pub async fn checkout_cluster(&self, name: &str) -> Result<(), StorageError> {
        let _guard = self.locks.lock("cluster:current").await;
        if self.get_cluster(name).await?.is_none() {
            return Err(StorageError::NotFound(format!("cluster '{name}'")));
        }
        self.driver
            .write("UPDATE clusters SET current = 0 WHERE current = 1", &[])
            .await?;
        self.driver
            .write("UPDATE clusters SET current = 1 WHERE name = ?", &[name.into()])
            .await?;
        Ok(())
    }

    pub async fn update_topology(&self, cluster_id: i64, topology: &str) -> Result<(), StorageError> {
        let result = self
            .driver
            .write(
                "UPDATE clusters SET topology = ? WHERE id = ?",
                &[topology.into(), cluster_id.into()],
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StorageError::NotFound(format!("cluster #{cluster_id}")));
        }
        Ok(())
    }

    // containers

    pub async fn get_container(&self, id: &ServiceId) -> Result<Option<ContainerRecord>, StorageError> {
        self.query_one(
            "SELECT id, cluster_id, container_id FROM containers WHERE id = ?",
            &[id.as_str().into()],
            container_from_row,
        )
        .await
    }

    /// Current container state for `id`; a missing row means never created.
    pub async fn container_state(&self, id: &ServiceId) -> Result<ContainerState, StorageError> {
        Ok(self
            .get_container(id)
            .await?
            .map(|r| r.state)
            .unwrap_or(ContainerState::NeverCreated))
    }

    /// Bind `id` to `container`. Updates the existing row when there is one
    /// (e.g. after a clean), inserts otherwise. The read and the write run
    /// under one per-identity lock.
    pub async fn record_container(
        &self,
        id: &ServiceId,
        cluster_id: i64,
        container: &ContainerId,
    ) -> Result<RecordWrite, StorageError> {
        let _guard = self.locks.lock(id.as_str()).await;
        let write = if self.get_container(id).await?.is_some() {
            self.driver
                .write(
                    "UPDATE containers SET container_id = ? WHERE id = ?",
                    &[container.as_str().into(), id.as_str().into()],
                )
                .await?;
            RecordWrite::Updated
        } else {
            self.driver
                .write(
                    "INSERT INTO containers (id, cluster_id, container_id) VALUES (?, ?, ?)",
                    &[id.as_str().into(), cluster_id.into(), container.as_str().into()],
                )
                .await?;
            RecordWrite::Inserted
        };
        debug!(service = %id, container = %container.short(), ?write, "container recorded");
        Ok(write)
    }

    /// Write the cleaned sentinel. The row itself is kept.
    pub async fn mark_cleaned(&self, id: &ServiceId) -> Result<(), StorageError> {
        let _guard = self.locks.lock(id.as_str()).await;
        self.driver
            .write(
                "UPDATE containers SET container_id = ? WHERE id = ?",
                &[ContainerState::Cleaned.as_stored().into(), id.as_str().into()],
            )
            .await?;
        Ok(())
    }

    pub async fn list_containers(&self, cluster_id: i64) -> Result<Vec<ContainerRecord>, StorageError> {
        self.query_all(
            "SELECT id, cluster_id, container_id FROM containers WHERE cluster_id = ? ORDER BY id",
            &[cluster_id.into()],
            container_from_row,
        )
        .await
    }

    // clients

    pub async fn insert_client(&self, client: &ClientRecord) -> Result<(), StorageError> {
        self.driver
            .write(
                "INSERT INTO clients (id, kind, host, container_id, aux_info) VALUES (?, ?, ?, ?, ?)",
                &[
                    client.id.as_str().into(),
                    client.kind.as_str().into(),
                    client.host.as_str().into(),
                    client.container_id.as_str().into(),
                    client.aux_info.as_str().into(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_client(&self, id: &str) -> Result<Option<ClientRecord>, StorageError> {
        self.query_one("SELECT * FROM clients WHERE id = ?", &[id.into()], client_from_row)
            .await
    }

    pub async fn list_clients(&self) -> Result<Vec<ClientRecord>, StorageError> {
        self.query_all("SELECT * FROM clients ORDER BY id", &[], client_from_row)
            .await
    }

    pub async fn delete_client(&self, id: &str) -> Result<(), StorageError> {
        self.driver
            .write("DELETE FROM clients WHERE id = ?", &[id.into()])
            .await?;
        Ok(())
    }

    // playgrounds

    pub async fn insert_playground(&self, name: &str, mount_point: &str) -> Result<i64, StorageError> {
        let result = self
            .driver
            .write(
                "INSERT INTO playgrounds (name, create_time, mount_point, status) VALUES (?, ?, ?, ?)",
                &[name.into(), now().into(), mount_point.into(), "preparing".into()],
            )
            .await?;
        Ok(result.last_insert_id)
    }

    pub async fn get_playground(&self, name: &str) -> Result<Option<Playground>, StorageError> {
        self.query_one(
            "SELECT * FROM playgrounds WHERE name = ?",
            &[name.into()],
            playground_from_row,
        )
        .await
    }

    pub async fn list_playgrounds(&self) -> Result<Vec<Playground>, StorageError> {
        self.query_all("SELECT * FROM playgrounds ORDER BY id", &[], playground_from_row)
            .await
    }

    pub async fn set_playground_status(&self, id: i64, status: &str) -> Result<(), StorageError> {
        self.driver
            .write(
                "UPDATE playgrounds SET status = ? WHERE id = ?",
                &[status.into(), id.into()],
            )
            .await?;
        Ok(())
    }

    pub async fn delete_playground(&self, name: &str) -> Result<(), StorageError> {
        self.driver
            .write("DELETE FROM playgrounds WHERE name = ?", &[name.into()])
            .await?;
        Ok(())
    }

    // audit log

    /// Record the start of an operator command; the returned id comes from the store.
    pub async fn insert_audit(&self, work_directory: &str, command: &str) -> Result<i64, StorageError> {
        let result = self
            .driver
            .write(
                "INSERT INTO audit (execute_time, work_directory, command, status, error_code) \
                 VALUES (?, ?, ?, ?, 0)",
                &[
                    now().into(),
                    work_directory.into(),
                    command.into(),
                    AuditStatus::Running.code().into(),
                ],
            )
            .await?;
        Ok(result.last_insert_id)
    }

    pub async fn finish_audit(
        &self,
        id: i64,
        status: AuditStatus,
        error_code: u32,
    ) -> Result<(), StorageError> {
        self.driver
            .write(
                "UPDATE audit SET status = ?, error_code = ? WHERE id = ?",
                &[status.code().into(), i64::from(error_code).into(), id.into()],
            )
            .await?;
        Ok(())
    }

    /// Most recent entries first.
    pub async fn list_audit(&self, limit: u32) -> Result<Vec<AuditEntry>, StorageError> {
        self.query_all(
            "SELECT * FROM audit ORDER BY id DESC LIMIT ?",
            &[i64::from(limit).into()],
            audit_from_row,
        )
        .await
    }

    // any-table

    pub async fn set_any(&self, id: &str, data: &str) -> Result<(), StorageError> {
        let _guard = self.locks.lock(id).await;
        let exists = self
            .driver
            .query(r#"SELECT id FROM "any" WHERE id = ?"#, &[id.into()])
            .await?
            .next()
            .is_some();
        let sql = if exists {
            r#"UPDATE "any" SET data = ?2 WHERE id = ?1"#
        } else {
            r#"INSERT INTO "any" (id, data) VALUES (?1, ?2)"#
        };
        self.driver.write(sql, &[id.into(), data.into()]).await?;
        Ok(())
    }

    pub async fn get_any(&self, id: &str) -> Result<Option<String>, StorageError> {
        let mut rows = self
            .driver
            .query(r#"SELECT data FROM "any" WHERE id = ?"#, &[id.into()])
            .await?;
        rows.next()
            .map(|r| r.get_str("data").map(str::to_string))
            .transpose()
    }

    /// Entries whose id starts with `prefix`, as `(id, data)`.
    pub async fn list_any(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let rows = self
            .driver
            .query(
                r#"SELECT id, data FROM "any" WHERE substr(id, 1, length(?1)) = ?1 ORDER BY id"#,
                &[prefix.into()],
            )
            .await?;
        rows.map(|r| Ok((r.get_str("id")?.to_string(), r.get_str("data")?.to_string())))
            .collect()
    }

    pub async fn delete_any(&self, id: &str) -> Result<(), StorageError> {
        self.driver
            .write(r#"DELETE FROM "any" WHERE id = ?"#, &[id.into()])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Storage {
        Storage::open("sqlite::memory:").await.unwrap()
    }

    fn sid(host: &str) -> ServiceId {
        ServiceId::new("c1", crate::types::Role::Mds, host, 0).unwrap()
    }

    #[tokio::test]
    async fn cluster_ids_come_from_the_store() {
        let store = store().await;
        let a = store.insert_cluster("a", "", "").await.unwrap();
        let b = store.insert_cluster("b", "", "").await.unwrap();
        assert_ne!(a, b);
        assert!(store.get_current_cluster().await.unwrap().is_none());

        store.checkout_cluster("b").await.unwrap();
        assert_eq!(store.get_current_cluster().await.unwrap().unwrap().id, b);
        store.checkout_cluster("a").await.unwrap();
        let current = store.get_current_cluster().await.unwrap().unwrap();
        assert_eq!(current.id, a);
        let ids: Vec<_> = store.list_clusters().await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(matches!(
            store.checkout_cluster("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_cluster_name_conflicts() {
        let store = store().await;
        store.insert_cluster("a", "", "").await.unwrap();
        assert!(matches!(
            store.insert_cluster("a", "", "").await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn clean_then_record_updates_same_row() {
        let store = store().await;
        let cluster = store.insert_cluster("c1", "", "").await.unwrap();
        let id = sid("host1");

        assert_eq!(store.container_state(&id).await.unwrap(), ContainerState::NeverCreated);
        let first = store
            .record_container(&id, cluster, &ContainerId::new("aaa"))
            .await
            .unwrap();
        assert_eq!(first, RecordWrite::Inserted);

        store.mark_cleaned(&id).await.unwrap();
        assert_eq!(store.container_state(&id).await.unwrap(), ContainerState::Cleaned);

        let second = store
            .record_container(&id, cluster, &ContainerId::new("bbb"))
            .await
            .unwrap();
        assert_eq!(second, RecordWrite::Updated);
        let all = store.list_containers(cluster).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, ContainerState::Bound(ContainerId::new("bbb")));
    }

    #[tokio::test]
    async fn audit_round() {
        let store = store().await;
        let id = store.insert_audit("/work", "clusteradm deploy").await.unwrap();
        store.finish_audit(id, AuditStatus::Failed, 300_002).await.unwrap();
        let entries = store.list_audit(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, AuditStatus::Failed);
        assert_eq!(entries[0].error_code, 300_002);
    }

    #[tokio::test]
    async fn any_table_prefix_listing() {
        let store = store().await;
        store.set_any("client:fs1", "{}").await.unwrap();
        store.set_any("client:fs2", "{}").await.unwrap();
        store.set_any("other", "x").await.unwrap();
        store.set_any("client:fs1", "{\"v\":2}").await.unwrap();

        let clients = store.list_any("client:").await.unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(store.get_any("client:fs1").await.unwrap().as_deref(), Some("{\"v\":2}"));
        store.delete_any("other").await.unwrap();
        assert!(store.get_any("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clients_and_playgrounds() {
        let store = store().await;
        let client = ClientRecord {
            id: "fs-1".into(),
            kind: "curvefs".into(),
            host: "client1".into(),
            container_id: "ccc".into(),
            aux_info: String::new(),
        };
        store.insert_client(&client).await.unwrap();
        assert_eq!(store.get_client("fs-1").await.unwrap(), Some(client));
        store.delete_client("fs-1").await.unwrap();
        assert!(store.list_clients().await.unwrap().is_empty());

        let pg = store.insert_playground("pg1", "/mnt/pg1").await.unwrap();
        store.set_playground_status(pg, "running").await.unwrap();
        let got = store.get_playground("pg1").await.unwrap().unwrap();
        assert_eq!(got.id, pg);
        assert_eq!(got.status, "running");
        store.insert_playground("pg2", "/mnt/pg2").await.unwrap();
        store.delete_playground("pg1").await.unwrap();
        let names: Vec<_> = store
            .list_playgrounds()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["pg2"]);
    }
}
