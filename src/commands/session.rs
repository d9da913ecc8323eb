// ABOUTME: Shared setup for commands that act on the cluster: config, store, engine, runner.
// ABOUTME: Also records every invocation in the audit log and wires ctrl-c to cancellation.

use crate::cli::GlobalArgs;
use clusteradm::config::Config;
use clusteradm::engine::{Engine, detect_engine};
use clusteradm::error::{Error, Result};
use clusteradm::runner::{Phase, RunErrorKind, RunReport, Runner};
use clusteradm::storage::{AuditStatus, Cluster, Storage};
use clusteradm::transport::{Connector, ExecOptions};
use clusteradm::types::Role;
use clusteradm::workflow::{ServiceSpec, Workflows};
use std::env;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Session {
    pub config: Config,
    pub storage: Arc<Storage>,
    pub cluster: Cluster,
    pub workflows: Workflows,
    pub runner: Runner,
    audit_id: i64,
}

impl Session {
    pub async fn open(args: &GlobalArgs, command: &str) -> Result<Self> {
        let cwd = env::current_dir()?;
        let config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::discover(&cwd)?,
        };
        config.validate()?;

        let storage = Arc::new(Storage::open(&config.store_url()).await?);
        let audit_id = storage
            .insert_audit(&cwd.display().to_string(), command)
            .await?;

        let (cluster, engine) = match setup(&storage, &config).await {
            Ok(done) => done,
            Err(e) => {
                storage.finish_audit(audit_id, AuditStatus::Failed, e.code()).await?;
                storage.close().await?;
                return Err(e);
            }
        };
        debug!(cluster = %cluster.name, engine = %engine, "session opened");

        let workflows = Workflows::new(Arc::clone(&storage), config.exec_options(engine));
        let runner = Runner::new(args.parallelism.unwrap_or(config.parallelism));
        Ok(Self {
            config,
            storage,
            cluster,
            workflows,
            runner,
            audit_id,
        })
    }

    /// Desired services, optionally narrowed to one role.
    pub fn services(&self, role: Option<Role>) -> Result<Vec<ServiceSpec>> {
        let specs = self.config.service_specs(self.cluster.id)?;
        Ok(specs
            .into_iter()
            .filter(|s| role.is_none_or(|r| s.role == r))
            .collect())
    }

    /// Run phases; ctrl-c cancels the batch.
    pub async fn run(&self, phases: Vec<Phase>) -> RunReport {
        let handle = self.runner.cancel_handle();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                handle.cancel();
            }
        });
        let report = self.runner.run(phases).await;
        watcher.abort();
        report
    }

    /// Record the final status and close the store.
    pub async fn finish(self, result: &Result<()>) -> Result<()> {
        let (status, code) = match result {
            Ok(()) => (AuditStatus::Success, 0),
            Err(Error::Run(e)) if e.kind() == RunErrorKind::Cancelled => {
                (AuditStatus::Cancelled, e.code())
            }
            Err(e) => (AuditStatus::Failed, e.code()),
        };
        self.storage.finish_audit(self.audit_id, status, code).await?;
        self.storage.close().await?;
        Ok(())
    }
}

/// One phase per role, in role order (`reverse` for teardown).
pub fn phases_by_role<F>(name: &str, specs: &[ServiceSpec], reverse: bool, mut build: F) -> Vec<Phase>
where
    F: FnMut(&ServiceSpec) -> clusteradm::task::Task,
{
    let mut roles: Vec<Role> = Role::ALL.to_vec();
    if reverse {
        roles.reverse();
    }
    roles
        .into_iter()
        .filter_map(|role| {
            let tasks: Vec<_> = specs.iter().filter(|s| s.role == role).map(&mut build).collect();
            (!tasks.is_empty()).then(|| Phase::from_tasks(format!("{name} {role}"), tasks))
        })
        .collect()
}

async fn setup(storage: &Storage, config: &Config) -> Result<(Cluster, Engine)> {
    let cluster = ensure_cluster(storage, config).await?;
    let engine = resolve_engine(config).await?;
    Ok((cluster, engine))
}

async fn ensure_cluster(storage: &Storage, config: &Config) -> Result<Cluster> {
    if storage.get_cluster(&config.cluster).await?.is_none() {
        storage.insert_cluster(&config.cluster, "", "").await?;
    }
    storage.checkout_cluster(&config.cluster).await?;
    storage
        .get_cluster(&config.cluster)
        .await?
        .ok_or_else(|| Error::ClusterNotFound(config.cluster.clone()))
}

/// Configured engine, or whatever the first host has installed.
async fn resolve_engine(config: &Config) -> Result<Engine> {
    if let Some(engine) = config.engine {
        return Ok(engine);
    }
    let target = config.target(config.hosts.first());
    let transport = target.connect().await?;
    let options = ExecOptions::default()
        .with_sudo(config.sudo)
        .with_sudo_alias(&config.sudo_alias);
    let detected = detect_engine(transport.as_ref(), &options, None).await;
    if let Err(e) = transport.close().await {
        debug!(error = %e, "closing detection transport failed");
    }
    detected.map_err(|e| Error::EngineDetection(e.to_string()))
}
