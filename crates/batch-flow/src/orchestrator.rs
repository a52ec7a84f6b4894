//! Batch state machine
//!
//! A run walks the batches of a [`BatchSchedule`]: establish the position,
//! act on each item with a confirmed advance in between, persist a checkpoint
//! after the batch's last item, then wait for the remote queue before the next
//! batch re-establishes its position from that checkpoint.

use std::sync::Arc;
use std::time::Duration;

use carousel_checkpoint_store::CheckpointStore;
use carousel_core_types::{Cursor, DriverPhase, Fingerprint, ProgressUpdate};
use carousel_event_bus::ProgressBus;
use carousel_nav::{ActionExecutor, CarouselNavigator, RemoteView};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::advance::advance_confirmed;
use crate::config::{ActionFailurePolicy, DrainTimeoutPolicy, DriverConfig};
use crate::drain::{pause_cancellable, DrainOutcome, DrainSettings, QueueDrainer};
use crate::errors::FlowError;
use crate::plan::{plan_batches, BatchPlan, BatchSchedule};
use crate::resume::{ResumeSettings, ResumeStrategy, ResumeVerifier};
use crate::strategies::finalization_wait;
use crate::types::{RunReport, RunRequest, RunState};

pub struct BatchOrchestrator {
    navigator: Arc<CarouselNavigator>,
    executor: ActionExecutor,
    verifier: ResumeVerifier,
    drainer: QueueDrainer,
    store: Arc<dyn CheckpointStore>,
    progress: Option<Arc<ProgressBus>>,
    config: DriverConfig,
}

impl BatchOrchestrator {
    /// Build an orchestrator over one remote session and one checkpoint slot.
    pub fn new(
        remote: Arc<dyn RemoteView>,
        store: Arc<dyn CheckpointStore>,
        config: DriverConfig,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        let navigator = Arc::new(CarouselNavigator::new(
            remote.clone(),
            config.nav_settings(),
        ));
        Ok(Self {
            executor: ActionExecutor::new(remote.clone(), config.executor_settings()),
            verifier: ResumeVerifier::new(navigator.clone(), ResumeSettings::from(&config)),
            drainer: QueueDrainer::new(remote, DrainSettings::from(&config)),
            navigator,
            store,
            progress: None,
            config,
        })
    }

    pub fn with_progress(mut self, bus: Arc<ProgressBus>) -> Self {
        self.progress = Some(bus);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Drive one run to completion, a clean stop, or a typed failure.
    ///
    /// On failure the stored checkpoint still names the last item whose
    /// action is covered; a later run with `resume` continues right after it.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport, FlowError> {
        let total = request.actions.len();
        if total == 0 {
            return Err(FlowError::InvalidPlan("work list is empty".into()));
        }

        let mut state = RunState::new(request.run_id.clone(), total);
        info!(
            run_id = %request.run_id,
            total_items = total,
            batch_size = self.config.batch_size,
            resume = request.resume,
            "run starting"
        );
        self.publish(&state, None, None);

        let Some(strategy) = self.choose_strategy(request, &mut state).await? else {
            info!(run_id = %request.run_id, "checkpoint already covers every item");
            state.phase = DriverPhase::Done;
            self.publish(&state, None, None);
            return Ok(state.into_report());
        };

        let schedule = plan_batches(
            total,
            self.config.batch_size,
            strategy.first_index(),
            matches!(strategy, ResumeStrategy::CursorResume(_)),
        )?;
        state.first_index = schedule.first_index;
        state.total_batches = schedule.total_batches;
        info!(
            first_index = schedule.first_index,
            batches = schedule.batches.len(),
            total_batches = schedule.total_batches,
            "batches planned"
        );

        match self
            .run_batches(request, &schedule, strategy, cancel, &mut state)
            .await
        {
            Ok(()) => {
                info!(
                    run_id = %request.run_id,
                    phase = %state.phase,
                    acted = state.acted.len(),
                    failed = state.failed.len(),
                    batches_completed = state.batches_completed,
                    "run finished"
                );
                self.publish(&state, None, None);
                Ok(state.into_report())
            }
            Err(err) => {
                state.phase = match err {
                    FlowError::Cancelled { .. } => DriverPhase::Stopped,
                    _ => DriverPhase::Aborted,
                };
                self.publish(&state, err.item_index(), None);
                if state.phase == DriverPhase::Aborted {
                    error!(run_id = %request.run_id, retryable = err.is_retryable(), "run aborted: {}", err);
                }
                Err(err)
            }
        }
    }

    async fn choose_strategy(
        &self,
        request: &RunRequest,
        state: &mut RunState,
    ) -> Result<Option<ResumeStrategy>, FlowError> {
        let total = request.actions.len();

        if request.resume {
            match self.store.load().await {
                Ok(Some(cursor)) => {
                    info!(checkpoint = %cursor, "resuming from checkpoint");
                    state.resumed_from = Some(cursor.index_hint());
                    state.record_checkpoint(cursor.clone());
                    if cursor.index_hint() + 1 >= total {
                        return Ok(None);
                    }
                    return Ok(Some(ResumeStrategy::CursorResume(cursor)));
                }
                Ok(None) => info!(
                    start_index = request.start_index,
                    "no checkpoint stored; starting from position"
                ),
                Err(err) => warn!(
                    start_index = request.start_index,
                    "checkpoint unavailable, starting from position: {}",
                    err
                ),
            }
        } else {
            // A fresh run must not be resumed later from an older job's cursor.
            match self.store.clear().await {
                Ok(true) => info!("previous checkpoint discarded for fresh run"),
                Ok(false) => {}
                Err(err) => warn!("could not discard previous checkpoint: {}", err),
            }
        }

        if request.start_index >= total {
            return Err(FlowError::InvalidPlan(format!(
                "start index {} is outside a work list of {} items",
                request.start_index, total
            )));
        }
        Ok(Some(ResumeStrategy::PositionResume {
            start_index: request.start_index,
        }))
    }

    async fn run_batches(
        &self,
        request: &RunRequest,
        schedule: &BatchSchedule,
        strategy: ResumeStrategy,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), FlowError> {
        let mut pending = Some(strategy);
        let limit = request.max_batches.unwrap_or(usize::MAX);

        for (position, plan) in schedule.batches.iter().enumerate() {
            if position >= limit {
                info!(
                    batches_run = position,
                    next_index = plan.start_index,
                    "batch limit reached; stopping"
                );
                state.phase = DriverPhase::Stopped;
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(self.stop(state, Some(plan.start_index)).await);
            }

            state.batch_number = plan.batch_number;
            info!(
                batch = plan.batch_number,
                total_batches = state.total_batches,
                start_index = plan.start_index,
                size = plan.size,
                "batch starting"
            );

            let mut visible = self.establish(plan, pending.take(), state).await?;
            self.act_on_batch(request, plan, &mut visible, cancel, state)
                .await?;
            self.complete_batch(plan, &visible, state).await?;

            let more = position + 1 < schedule.batches.len() && position + 1 < limit;
            if more || self.config.finalization.enabled {
                self.settle_queue(plan, cancel, state).await?;
            }
        }

        state.phase = DriverPhase::Done;
        Ok(())
    }

    /// Put the view on the batch's first item and return its fingerprint.
    async fn establish(
        &self,
        plan: &BatchPlan,
        strategy: Option<ResumeStrategy>,
        state: &mut RunState,
    ) -> Result<Fingerprint, FlowError> {
        match strategy {
            Some(ResumeStrategy::PositionResume { start_index }) => {
                state.phase = DriverPhase::FreshStart;
                self.publish(state, Some(start_index), None);
                self.verifier.position_resume(start_index).await
            }
            Some(ResumeStrategy::CursorResume(cursor)) => self.resume_from(&cursor, state).await,
            None => {
                let cursor = state.last_checkpoint.clone().ok_or_else(|| {
                    FlowError::InvalidPlan(format!(
                        "batch {} has no checkpoint to resume from",
                        plan.batch_number
                    ))
                })?;
                self.resume_from(&cursor, state).await
            }
        }
    }

    async fn resume_from(
        &self,
        cursor: &Cursor,
        state: &mut RunState,
    ) -> Result<Fingerprint, FlowError> {
        state.phase = DriverPhase::Resuming;
        self.publish(state, Some(cursor.index_hint() + 1), None);
        let outcome = self.verifier.resume(cursor).await?;
        Ok(outcome.fingerprint)
    }

    /// Act on every item of `plan`. `visible` always holds the proven
    /// fingerprint of the item the next action lands on.
    async fn act_on_batch(
        &self,
        request: &RunRequest,
        plan: &BatchPlan,
        visible: &mut Fingerprint,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), FlowError> {
        for index in plan.indices() {
            state.phase = DriverPhase::Acting;
            self.publish(state, Some(index), None);

            let kind = &request.actions[index].kind;
            let record = match self.executor.act(index, kind).await {
                Ok(record) => record,
                Err(err) => return Err(self.abort(state, plan, index, err.into()).await),
            };

            if record.confirmed {
                state.record_confirmed(index, visible);
            } else {
                match self.config.on_action_failure {
                    ActionFailurePolicy::Abort => {
                        let cause = FlowError::ActionNotConfirmed {
                            item_index: index,
                            action: kind.clone(),
                            attempts: record.attempt_count,
                        };
                        return Err(self.abort(state, plan, index, cause).await);
                    }
                    ActionFailurePolicy::Skip => {
                        warn!(
                            item_index = index,
                            action = %kind,
                            attempts = record.attempt_count,
                            "action not confirmed; skipping item"
                        );
                        state.failed.push(index);
                    }
                }
            }

            if plan.is_last_item(index) {
                break;
            }
            if cancel.is_cancelled() {
                return Err(self.stop(state, Some(index + 1)).await);
            }

            state.phase = DriverPhase::Advancing;
            self.publish(state, Some(index + 1), None);
            *visible = match advance_confirmed(
                &self.navigator,
                visible,
                index + 1,
                self.config.advance_retries,
            )
            .await
            {
                Ok(fingerprint) => fingerprint,
                Err(err) => return Err(self.abort(state, plan, index + 1, err).await),
            };
        }
        Ok(())
    }

    async fn complete_batch(
        &self,
        plan: &BatchPlan,
        visible: &Fingerprint,
        state: &mut RunState,
    ) -> Result<(), FlowError> {
        let last = plan.last_index();
        match self.save_checkpoint(last, visible).await {
            Ok(cursor) => {
                info!(batch = plan.batch_number, checkpoint = %cursor, "batch complete");
                state.record_checkpoint(cursor);
                state.batches_completed += 1;
                state.phase = DriverPhase::BatchComplete;
                self.publish(state, Some(last), None);
                Ok(())
            }
            Err(err) => Err(self.abort(state, plan, last, err).await),
        }
    }

    async fn save_checkpoint(
        &self,
        index: usize,
        fingerprint: &Fingerprint,
    ) -> Result<Cursor, FlowError> {
        let cursor = self.capture_checkpoint(index, fingerprint).await?;
        self.store.save(&cursor).await?;
        Ok(cursor)
    }

    /// Capture a cursor for `index`, retrying while the view settles.
    async fn capture_checkpoint(
        &self,
        index: usize,
        fingerprint: &Fingerprint,
    ) -> Result<Cursor, FlowError> {
        let attempts = self.config.baseline_retries + 1;
        let mut reason = String::new();
        for attempt in 1..=attempts {
            match self.navigator.capture_cursor(index, fingerprint).await {
                Ok(cursor) => return Ok(cursor),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    debug!(item_index = index, attempt, "checkpoint capture retry: {}", err);
                    reason = err.to_string();
                }
                Err(err) => {
                    reason = err.to_string();
                    break;
                }
            }
        }
        Err(FlowError::CheckpointCaptureFailed {
            item_index: index,
            reason,
        })
    }

    /// Wait out the remote queue after `plan`, then the finalization window.
    async fn settle_queue(
        &self,
        plan: &BatchPlan,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), FlowError> {
        if let Err(err) = self.navigator.remote().leave_detail().await {
            debug!("could not leave detail view: {}", err);
        }

        state.phase = DriverPhase::Draining;
        self.publish(state, None, None);
        let bus = self.progress.as_deref();
        let template = state.progress(None, None);
        let report = self
            .drainer
            .wait_for_drain(cancel, |reading| {
                if let Some(bus) = bus {
                    let _ = bus.try_publish(ProgressUpdate {
                        queue_depth: reading.depth(),
                        ..template.clone()
                    });
                }
            })
            .await;

        match report.outcome {
            DrainOutcome::Drained | DrainOutcome::Unreadable => {}
            DrainOutcome::Cancelled => {
                return Err(self.stop(state, Some(plan.end_index())).await);
            }
            DrainOutcome::Stuck | DrainOutcome::TimedOut => {
                let waited_ms = report.elapsed.as_millis() as u64;
                match self.config.on_drain_timeout {
                    DrainTimeoutPolicy::Abort => {
                        return Err(FlowError::DrainTimedOut {
                            batch: plan.batch_number,
                            depth: report.last_depth,
                            waited_ms,
                            stuck: report.outcome == DrainOutcome::Stuck,
                        });
                    }
                    DrainTimeoutPolicy::Proceed => warn!(
                        batch = plan.batch_number,
                        depth = ?report.last_depth,
                        waited_ms,
                        "queue not drained; proceeding"
                    ),
                }
            }
        }

        if !self.config.finalization.enabled {
            return Ok(());
        }

        let wait = finalization_wait(&self.config.finalization, Some(&report));
        state.phase = DriverPhase::Finalizing;
        self.publish(state, None, None);
        let template = state.progress(None, None);
        let drainer = &self.drainer;
        let finished = pause_cancellable(
            wait,
            Duration::from_millis(self.config.finalization.poll_ms),
            cancel,
            |_| {
                let update = template.clone();
                async move {
                    if let Some(bus) = bus {
                        let queue_depth = drainer.read().await.depth();
                        let _ = bus.try_publish(ProgressUpdate {
                            queue_depth,
                            ..update
                        });
                    }
                }
            },
        )
        .await;

        if !finished {
            return Err(self.stop(state, Some(plan.end_index())).await);
        }
        Ok(())
    }

    async fn stop(&self, state: &mut RunState, next_index: Option<usize>) -> FlowError {
        info!(next_index = ?next_index, "cancellation requested; stopping");
        self.persist_progress(state).await;
        FlowError::Cancelled {
            next_index,
            last_cursor: state.last_checkpoint.clone(),
        }
    }

    async fn abort(
        &self,
        state: &mut RunState,
        plan: &BatchPlan,
        item_index: usize,
        cause: FlowError,
    ) -> FlowError {
        warn!(batch = plan.batch_number, item_index, "batch aborted: {}", cause);
        self.persist_progress(state).await;
        FlowError::BatchAborted {
            batch: plan.batch_number,
            item_index,
            last_cursor: state.last_checkpoint.clone(),
            unsaved_items: state.unsaved,
            cause: Box::new(cause),
        }
    }

    /// Checkpoint the last confirmed item when a batch ends early, so a
    /// resumed run neither repeats nor skips it.
    async fn persist_progress(&self, state: &mut RunState) {
        if state.unsaved == 0 {
            return;
        }
        if !self.config.checkpoint_on_abort {
            warn!(
                unsaved = state.unsaved,
                "confirmed items are not covered by any checkpoint"
            );
            return;
        }
        let Some((index, fingerprint)) = state.last_confirmed.clone() else {
            return;
        };
        match self.save_checkpoint(index, &fingerprint).await {
            Ok(cursor) => {
                info!(checkpoint = %cursor, "checkpoint saved for last confirmed item");
                state.record_checkpoint(cursor);
            }
            Err(err) => warn!(
                unsaved = state.unsaved,
                item_index = index,
                "could not checkpoint last confirmed item: {}",
                err
            ),
        }
    }

    fn publish(&self, state: &RunState, item_index: Option<usize>, queue_depth: Option<u32>) {
        if let Some(bus) = &self.progress {
            // Advisory; a bus without subscribers rejects the send.
            let _ = bus.try_publish(state.progress(item_index, queue_depth));
        }
    }
}
