//! Deletion orchestration across both targets
//!
//! Normal inconsistencies become one inventory task each, plus one
//! service-desk task when the record has a forward object. The run mode is
//! fixed for the whole run: in simulation no request leaves the process and
//! every task resolves to [`DeletionStatus::Simulated`].
//!
//! The two targets are independent and run concurrently. Inside a target,
//! tasks run through a bounded buffered stream so results keep task order.
//! A failed task never stops the others.

use crate::config::{RetryPolicy, RunMode};
use crate::retry::{IsRetryable, retry_with_policy};
use crate::targets::DeletionTarget;
use crate::types::{
    DeletionResult, DeletionStatus, DeletionTask, Event, InconsistencyKind, InconsistencyRecord,
    ResultSummary, Stage, TargetKind,
};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Tasks for each target
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    /// One per normal record
    pub inventory: Vec<DeletionTask>,
    /// One per downstream-eligible normal record
    pub service_desk: Vec<DeletionTask>,
}

/// Plan deletions for a set of normal inconsistencies
///
/// Particular records are never planned, even if passed in.
pub fn plan_tasks(normal: &[InconsistencyRecord]) -> DeletionPlan {
    let mut plan = DeletionPlan::default();
    for record in normal {
        if record.kind() != InconsistencyKind::Normal {
            tracing::warn!(
                relationship_id = record.relationship_id(),
                "refusing to plan deletion of a particular inconsistency"
            );
            continue;
        }
        plan.inventory.push(DeletionTask::inventory(record));
        if let Some(task) = DeletionTask::service_desk(record) {
            plan.service_desk.push(task);
        }
    }
    plan
}

/// Per-target results of one orchestration run
#[derive(Clone, Debug, Default, Serialize)]
pub struct OrchestrationResults {
    /// Inventory results, in task order
    pub inventory: Vec<DeletionResult>,
    /// Service-desk results, in task order
    pub service_desk: Vec<DeletionResult>,
}

impl OrchestrationResults {
    /// Counts for the inventory target
    pub fn inventory_summary(&self) -> ResultSummary {
        ResultSummary::from_results(&self.inventory)
    }

    /// Counts for the service-desk target
    pub fn service_desk_summary(&self) -> ResultSummary {
        ResultSummary::from_results(&self.service_desk)
    }
}

/// Drives deletions against the inventory and the service desk
pub struct Orchestrator {
    inventory: Arc<dyn DeletionTarget>,
    service_desk: Arc<dyn DeletionTarget>,
    concurrency: usize,
    event_tx: broadcast::Sender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator; `concurrency` is per target and at least 1
    pub fn new(
        inventory: Arc<dyn DeletionTarget>,
        service_desk: Arc<dyn DeletionTarget>,
        concurrency: usize,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            inventory,
            service_desk,
            concurrency: concurrency.max(1),
            event_tx,
        }
    }

    /// Delete every normal inconsistency from both targets
    pub async fn run(
        &self,
        normal: &[InconsistencyRecord],
        mode: RunMode,
        policy: &RetryPolicy,
    ) -> OrchestrationResults {
        let plan = plan_tasks(normal);
        tracing::info!(
            %mode,
            inventory_tasks = plan.inventory.len(),
            service_desk_tasks = plan.service_desk.len(),
            concurrency = self.concurrency,
            "starting deletions"
        );

        let (inventory, service_desk) = tokio::join!(
            self.run_target(self.inventory.as_ref(), &plan.inventory, mode, policy),
            self.run_target(self.service_desk.as_ref(), &plan.service_desk, mode, policy),
        );

        OrchestrationResults {
            inventory,
            service_desk,
        }
    }

    async fn run_target(
        &self,
        target: &dyn DeletionTarget,
        tasks: &[DeletionTask],
        mode: RunMode,
        policy: &RetryPolicy,
    ) -> Vec<DeletionResult> {
        let kind = target.kind();
        let stage = match kind {
            TargetKind::Inventory => Stage::DeleteInventory,
            TargetKind::ServiceDesk => Stage::DeleteServiceDesk,
        };
        let started = Instant::now();
        self.event_tx.send(Event::StageStarted { stage }).ok();

        let results: Vec<DeletionResult> = futures::stream::iter(tasks)
            .map(|task| self.execute(target, task, mode, policy))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = ResultSummary::from_results(&results);
        tracing::info!(
            target = %kind,
            total = summary.total,
            succeeded = summary.succeeded,
            simulated = summary.simulated,
            failed_permanent = summary.failed_permanent,
            failed_transient = summary.failed_transient,
            "target finished"
        );
        self.event_tx
            .send(Event::TargetFinished {
                target: kind,
                summary,
            })
            .ok();
        self.event_tx
            .send(Event::StageFinished {
                stage,
                duration_ms: started.elapsed().as_millis() as u64,
            })
            .ok();

        results
    }

    async fn execute(
        &self,
        target: &dyn DeletionTarget,
        task: &DeletionTask,
        mode: RunMode,
        policy: &RetryPolicy,
    ) -> DeletionResult {
        let endpoint = target.endpoint(task);
        let mut result = DeletionResult {
            target: target.kind(),
            relationship_id: task.relationship_id().to_string(),
            forward_object_id: task.forward_object_id().map(str::to_string),
            endpoint,
            status: DeletionStatus::Simulated,
            attempts: 0,
            http_status: None,
            error: None,
        };

        if mode.is_simulation() {
            tracing::info!(
                target = %result.target,
                relationship_id = %result.relationship_id,
                endpoint = %result.endpoint,
                "[SIMULATION] would delete relationship"
            );
        } else {
            let outcome = retry_with_policy(policy, || target.delete(task)).await;
            result.attempts = outcome.attempts;
            match outcome.result {
                Ok(status) => {
                    tracing::info!(
                        target = %result.target,
                        relationship_id = %result.relationship_id,
                        status,
                        attempts = outcome.attempts,
                        "relationship deleted"
                    );
                    result.status = DeletionStatus::Success;
                    result.http_status = Some(status);
                }
                Err(e) => {
                    result.status = if e.is_retryable() {
                        DeletionStatus::FailedTransient
                    } else {
                        DeletionStatus::FailedPermanent
                    };
                    tracing::error!(
                        target = %result.target,
                        relationship_id = %result.relationship_id,
                        error = %e,
                        attempts = outcome.attempts,
                        status = ?result.status,
                        "relationship deletion failed"
                    );
                    result.http_status = e.status();
                    result.error = Some(e.to_string());
                }
            }
        }

        self.event_tx
            .send(Event::TaskFinished {
                target: result.target,
                relationship_id: result.relationship_id.clone(),
                status: result.status,
                attempts: result.attempts,
            })
            .ok();
        result
    }
}
