// ABOUTME: Member migration: move one role instance between hosts without losing quorum.
// ABOUTME: Plans ordered phases of add, create, amend dependents, remove and clean.

use super::amend::AmendConfig;
use super::clean::CleanItems;
use super::scripts::{self, status_token};
use super::steps::{CONTAINER_ID, Gate, LoadContainer};
use super::{ServiceSpec, Workflows, endpoint_list};
use crate::errno::{self, ErrorCode};
use crate::runner::Phase;
use crate::step::{ContainerExec, Lambda, ReplaceValues};
use crate::storage::StorageError;
use crate::task::{Context, Slot, StepOutcome, StepResult, Task};
use crate::types::Role;
use tracing::{debug, info};

const MEMBERSHIP_OUTPUT: Slot<String> = Slot::new("migrate.membership_output");

/// One instance moving from one placement to another.
#[derive(Debug, Clone)]
pub struct MemberMove {
    pub from: ServiceSpec,
    pub to: ServiceSpec,
}

/// Whether dependents are re-pointed before or after the old member leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendOrder {
    BeforeRemove,
    AfterRemove,
}

/// How a role changes membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberProtocol {
    pub role: Role,
    /// The role keeps an explicit member list that must be edited.
    pub membership: bool,
    pub amend_order: AmendOrder,
}

impl MemberProtocol {
    pub fn for_role(role: Role) -> Self {
        match role {
            // Dependents must see the new member before the old one leaves,
            // otherwise they can be left with only unreachable endpoints.
            Role::Etcd => Self {
                role,
                membership: true,
                amend_order: AmendOrder::BeforeRemove,
            },
            _ => Self {
                role,
                membership: false,
                amend_order: AmendOrder::AfterRemove,
            },
        }
    }

    /// Config key in `dependent` that lists this role's endpoints.
    pub fn dependent_key(&self, dependent: Role) -> Option<&'static str> {
        match (self.role, dependent) {
            (Role::Etcd, Role::Mds) => Some("mds.etcd.endpoint"),
            (Role::Etcd, Role::Snapshotclone) => Some("etcd.endpoint"),
            (Role::Mds, Role::Chunkserver) => Some("mds.listen.addr"),
            (Role::Mds, Role::Snapshotclone) => Some("mds.addr"),
            (Role::Mds, Role::Metaserver) => Some("mds.listen.addr"),
            _ => None,
        }
    }
}

/// Ordered phases of one migration. Empty when there is nothing to move.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    pub phases: Vec<Phase>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(Phase::name).collect()
    }

    pub fn into_phases(self) -> Vec<Phase> {
        self.phases
    }
}

impl Workflows {
    /// Plan the phases that move `mv.from` to `mv.to`.
    ///
    /// `members` is the role's full membership after the move (including
    /// `mv.to`). `dependents` are services whose config embeds it.
    pub async fn plan_migration(
        &self,
        mv: &MemberMove,
        members: &[ServiceSpec],
        dependents: &[ServiceSpec],
    ) -> Result<MigrationPlan, StorageError> {
        let state = self.storage.container_state(&mv.from.id).await?;
        if !state.is_bound() {
            info!(service = %mv.from.id, "source member has no container, nothing to migrate");
            return Ok(MigrationPlan::default());
        }

        let protocol = MemberProtocol::for_role(mv.from.role);
        let peer = members
            .iter()
            .find(|m| m.id != mv.to.id && m.id != mv.from.id)
            .unwrap_or(&mv.from);
        // Old and new member both answer while the move is in flight.
        let transitional = endpoint_list(members.iter().chain(std::iter::once(&mv.from)));
        let endpoints = endpoint_list(members);

        let mut plan = MigrationPlan::default();
        if protocol.membership {
            plan.phases
                .push(Phase::new("add member").with_task(self.add_member(peer, &mv.to, &transitional)));
        }
        plan.phases
            .push(Phase::new("create member").with_task(self.deploy(&mv.to)));

        let amend = self.amend_dependents(&protocol, dependents, &endpoints);
        let remove = protocol
            .membership
            .then(|| Phase::new("remove member").with_task(self.remove_member(peer, &mv.from, &transitional)));
        match protocol.amend_order {
            AmendOrder::BeforeRemove => {
                plan.phases.extend(amend);
                plan.phases.extend(remove);
            }
            AmendOrder::AfterRemove => {
                plan.phases.extend(remove);
                plan.phases.extend(amend);
            }
        }
        plan.phases
            .push(Phase::new("clean member").with_task(self.clean(&mv.from, CleanItems::default())));

        debug!(service = %mv.from.id, phases = ?plan.phase_names(), "migration planned");
        Ok(plan)
    }

    fn add_member(&self, peer: &ServiceSpec, member: &ServiceSpec, endpoints: &str) -> Task {
        let peer_url = member.peer_url().unwrap_or_default();
        self.membership_task(
            "add member",
            peer,
            member,
            vec![
                "sh".to_string(),
                "-c".to_string(),
                scripts::ADD_MEMBER.to_string(),
                "add-member".to_string(),
                endpoints.to_string(),
                member.id.to_string(),
                peer_url,
            ],
            &["SUCCESS", "EXIST"],
            errno::ADD_MEMBER_FAILED,
        )
    }

    fn remove_member(&self, peer: &ServiceSpec, member: &ServiceSpec, endpoints: &str) -> Task {
        self.membership_task(
            "remove member",
            peer,
            member,
            vec![
                "sh".to_string(),
                "-c".to_string(),
                scripts::REMOVE_MEMBER.to_string(),
                "remove-member".to_string(),
                endpoints.to_string(),
                member.id.to_string(),
            ],
            &["SUCCESS", "NOTEXIST"],
            errno::REMOVE_MEMBER_FAILED,
        )
    }

    /// Run a membership script in `peer`'s container and judge its token.
    fn membership_task(
        &self,
        name: &str,
        peer: &ServiceSpec,
        member: &ServiceSpec,
        argv: Vec<String>,
        accepted: &'static [&'static str],
        on_failure: ErrorCode,
    ) -> Task {
        let mut task = Task::new(name, member.id.as_str())
            .with_target(peer.target.clone())
            .with_options(self.options.clone())
            .with_identity(peer.id.clone());
        task.add_step(LoadContainer::new(
            self.storage.clone(),
            peer.id.clone(),
            Gate::Never,
        ));
        task.add_step(
            ContainerExec::new(name, CONTAINER_ID, argv)
                .capture(MEMBERSHIP_OUTPUT)
                .on_failure(on_failure),
        );
        task.add_step(Lambda::new(format!("judge {name}"), move |ctx: &mut Context| {
            judge_token(ctx, accepted, on_failure)
        }));
        task
    }

    fn amend_dependents(
        &self,
        protocol: &MemberProtocol,
        dependents: &[ServiceSpec],
        endpoints: &str,
    ) -> Option<Phase> {
        let tasks: Vec<Task> = dependents
            .iter()
            .filter_map(|dep| {
                let key = protocol.dependent_key(dep.role)?;
                let mutation = ReplaceValues::default().set(key, endpoints);
                Some(self.amend(dep, AmendConfig::new(mutation).restart()))
            })
            .collect();
        (!tasks.is_empty()).then(|| Phase::from_tasks("amend dependents", tasks))
    }
}

fn judge_token(ctx: &mut Context, accepted: &[&str], on_failure: ErrorCode) -> StepResult {
    let output = ctx.blackboard().require(MEMBERSHIP_OUTPUT)?;
    let token = status_token(output);
    if accepted.contains(&token) {
        debug!(token, "membership change accepted");
        return Ok(StepOutcome::Continue);
    }
    Err(on_failure.clue(output.clone()))
}
