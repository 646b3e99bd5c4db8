//! Task board with optimistic completion
//!
//! Completing a task marks it locally first, then tells the backend. If the
//! backend refuses, the whole task list goes back to what it was before the
//! call. When the last task of the current stage is done the planting moves
//! to the next stage locally and a notice is queued for the user.
//!
//! Boards showing the same planting can share one [`InFlight`] set so a task
//! is never sent twice while a request for it is outstanding.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::api::BackendClient;
use crate::error::{Error, Result};
use crate::mutation::PendingMutation;
use crate::session::Session;
use crate::stage::{group_by_stage, stage_complete, Actionability, Stage, StageKey};
use crate::types::{Planting, Task, TaskStatus};

/// Backend operations the task board needs
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn complete_task(&self, task_id: i64, session: &Session) -> Result<()>;

    async fn fetch_planting(&self, planting_id: i64, session: &Session) -> Result<Planting>;
}

#[async_trait]
impl TaskBackend for BackendClient {
    async fn complete_task(&self, task_id: i64, session: &Session) -> Result<()> {
        BackendClient::complete_task(self, task_id, session).await
    }

    async fn fetch_planting(&self, planting_id: i64, session: &Session) -> Result<Planting> {
        self.planting(planting_id, session).await
    }
}

/// Task ids with a completion request outstanding
///
/// Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<i64>>>,
}

impl InFlight {
    pub fn contains(&self, task_id: i64) -> bool {
        self.lock().contains(&task_id)
    }

    /// Mark `task_id` in flight, or `None` if it already is.
    ///
    /// The mark is cleared when the returned guard is dropped.
    pub fn begin(&self, task_id: i64) -> Option<InFlightGuard> {
        if !self.lock().insert(task_id) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: self.clone(),
            task_id,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears one task's in-flight mark on drop
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: InFlight,
    task_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.task_id);
    }
}

/// What a successful completion changed
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub task_id: i64,
    /// Stage the planting moved to, if the completion finished a stage
    pub advanced_to: Option<Stage>,
    /// Whether the task list was replaced by a fresh copy from the backend
    pub refetched: bool,
    pub progress_percentage: f64,
}

/// A planting and its tasks, as shown on the detail and task list views
#[derive(Debug)]
pub struct TaskBoard {
    planting: Planting,
    tasks: Vec<Task>,
    completing: InFlight,
    notices: Vec<String>,
    refetch: bool,
}

impl TaskBoard {
    /// Build a board from a planting, taking ownership of its tasks.
    pub fn new(mut planting: Planting) -> Self {
        let tasks = std::mem::take(&mut planting.tasks);
        let mut board = Self {
            planting,
            tasks,
            completing: InFlight::default(),
            notices: Vec::new(),
            refetch: true,
        };
        board.recount();
        board
    }

    /// Fetch a planting and build a board for it.
    pub async fn load<B: TaskBackend + ?Sized>(
        backend: &B,
        session: &Session,
        planting_id: i64,
    ) -> Result<Self> {
        let planting = backend.fetch_planting(planting_id, session).await?;
        Ok(Self::new(planting))
    }

    /// Whether to reload the planting after each successful completion
    pub fn with_refetch(mut self, refetch: bool) -> Self {
        self.refetch = refetch;
        self
    }

    /// Share the in-flight set with other boards
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.completing = in_flight;
        self
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.completing
    }

    pub fn planting(&self) -> &Planting {
        &self.planting
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn current_stage(&self) -> Stage {
        self.planting.current_stage
    }

    pub fn is_completing(&self, task_id: i64) -> bool {
        self.completing.contains(task_id)
    }

    /// Tasks grouped by stage in lifecycle order, unassigned last
    pub fn groups(&self) -> Vec<(StageKey, Vec<&Task>)> {
        group_by_stage(&self.tasks)
    }

    pub fn is_actionable(&self, task: &Task, actionability: Actionability) -> bool {
        !task.is_completed()
            && !self.is_completing(task.id)
            && actionability.is_actionable(task, self.planting.current_stage)
    }

    /// Drain notices queued by completions (stage advances)
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Complete a task optimistically.
    ///
    /// Without a session nothing is sent and [`Error::Unauthorized`] is
    /// returned. On backend failure the task list is restored to its state
    /// before the call and the backend error is returned.
    pub async fn complete_task<B: TaskBackend + ?Sized>(
        &mut self,
        backend: &B,
        session: Option<&Session>,
        task_id: i64,
    ) -> Result<CompletionReport> {
        let session = session.ok_or(Error::Unauthorized)?;

        if !self.tasks.iter().any(|t| t.id == task_id) {
            return Err(Error::TaskNotFound(task_id));
        }
        let Some(marker) = self.completing.begin(task_id) else {
            return Err(Error::CompletionInFlight(task_id));
        };

        let pending = PendingMutation::apply(&mut self.tasks, |tasks| mark_completed(tasks, task_id));
        let outcome = backend.complete_task(task_id, session).await;
        drop(marker);
        pending.settle(&mut self.tasks, &outcome);

        if let Err(e) = outcome {
            tracing::warn!(
                task_id,
                planting_id = self.planting.id,
                error = %e,
                "Task completion failed, restored task list"
            );
            return Err(e);
        }

        tracing::info!(task_id, planting_id = self.planting.id, "Task completed");

        let refetched = self.refetch && self.reload(backend, session).await;

        // The refetched copy may lag behind the completion.
        mark_completed(&mut self.tasks, task_id);
        let advanced_to = self.advance_stage_if_complete();
        self.recount();

        Ok(CompletionReport {
            task_id,
            advanced_to,
            refetched,
            progress_percentage: self.planting.progress_percentage,
        })
    }

    async fn reload<B: TaskBackend + ?Sized>(&mut self, backend: &B, session: &Session) -> bool {
        match backend.fetch_planting(self.planting.id, session).await {
            Ok(mut fresh) => {
                self.tasks = std::mem::take(&mut fresh.tasks);
                self.planting = fresh;
                true
            }
            Err(e) => {
                tracing::warn!(
                    planting_id = self.planting.id,
                    error = %e,
                    "Refetch after completion failed, keeping local state"
                );
                false
            }
        }
    }

    fn advance_stage_if_complete(&mut self) -> Option<Stage> {
        let current = self.planting.current_stage;
        if !stage_complete(&self.tasks, current) {
            return None;
        }
        let next = current.next()?;

        self.planting.current_stage = next;
        self.notices.push(format!(
            "All {} tasks are done. Moving on to {}.",
            current.label(),
            next.label()
        ));
        tracing::info!(
            planting_id = self.planting.id,
            from = %current,
            to = %next,
            "Stage advanced"
        );
        Some(next)
    }

    fn recount(&mut self) {
        self.planting.recount(&self.tasks);
    }
}

fn mark_completed(tasks: &mut [Task], task_id: i64) {
    if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
        task.status = TaskStatus::Completed;
    }
}
