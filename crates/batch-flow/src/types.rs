use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carousel_core_types::{
    ActionSpec, Cursor, DriverPhase, Fingerprint, ProgressUpdate, RunId,
};

/// One invocation of the driver over a work list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: RunId,
    /// One entry per carousel item, in sequence order
    pub actions: Vec<ActionSpec>,
    /// Continue from the stored checkpoint when one exists
    pub resume: bool,
    /// First item for a run without a usable checkpoint
    pub start_index: usize,
    /// Stop cleanly after this many batches
    pub max_batches: Option<usize>,
}

impl RunRequest {
    pub fn new(actions: Vec<ActionSpec>) -> Self {
        Self {
            run_id: RunId::new(),
            actions,
            resume: false,
            start_index: 0,
            max_batches: None,
        }
    }

    pub fn resuming(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn starting_at(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn stop_after(mut self, batches: usize) -> Self {
        self.max_batches = Some(batches);
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }
}

/// Summary of a finished (or cleanly stopped) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub total_items: usize,
    /// First item this run was responsible for
    pub first_index: usize,
    /// Index of the checkpoint the run resumed from
    pub resumed_from: Option<usize>,
    /// Items whose action was confirmed, in order
    pub acted: Vec<usize>,
    /// Items skipped after an unconfirmed action
    pub failed: Vec<usize>,
    pub batches_completed: usize,
    pub total_batches: usize,
    pub final_phase: DriverPhase,
    pub last_checkpoint: Option<Cursor>,
    /// Whole-run attempts it took
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.final_phase == DriverPhase::Done
    }
}

/// Mutable bookkeeping for one run.
#[derive(Debug)]
pub(crate) struct RunState {
    pub run_id: RunId,
    pub total_items: usize,
    pub total_batches: usize,
    pub batch_number: usize,
    pub first_index: usize,
    pub phase: DriverPhase,
    pub acted: Vec<usize>,
    pub failed: Vec<usize>,
    pub batches_completed: usize,
    pub resumed_from: Option<usize>,
    pub last_checkpoint: Option<Cursor>,
    /// Last item whose action was confirmed, with the fingerprint it showed
    pub last_confirmed: Option<(usize, Fingerprint)>,
    /// Confirmed items not yet covered by `last_checkpoint`
    pub unsaved: usize,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(run_id: RunId, total_items: usize) -> Self {
        Self {
            run_id,
            total_items,
            total_batches: 0,
            batch_number: 0,
            first_index: 0,
            phase: DriverPhase::Starting,
            acted: Vec::new(),
            failed: Vec::new(),
            batches_completed: 0,
            resumed_from: None,
            last_checkpoint: None,
            last_confirmed: None,
            unsaved: 0,
            started_at: Utc::now(),
        }
    }

    pub fn record_confirmed(&mut self, index: usize, fingerprint: &Fingerprint) {
        self.acted.push(index);
        self.last_confirmed = Some((index, fingerprint.clone()));
        self.unsaved += 1;
    }

    pub fn record_checkpoint(&mut self, cursor: Cursor) {
        self.last_checkpoint = Some(cursor);
        self.unsaved = 0;
    }

    pub fn progress(&self, item_index: Option<usize>, queue_depth: Option<u32>) -> ProgressUpdate {
        ProgressUpdate {
            run_id: self.run_id.clone(),
            batch_number: self.batch_number,
            total_batches: self.total_batches,
            item_index,
            total_items: self.total_items,
            state: self.phase,
            queue_depth,
        }
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            total_items: self.total_items,
            first_index: self.first_index,
            resumed_from: self.resumed_from,
            acted: self.acted,
            failed: self.failed,
            batches_completed: self.batches_completed,
            total_batches: self.total_batches,
            final_phase: self.phase,
            last_checkpoint: self.last_checkpoint,
            attempts: 1,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_core_types::ActionKind;

    #[test]
    fn confirmed_items_stay_unsaved_until_checkpointed() {
        let mut state = RunState::new(RunId("r".into()), 12);
        state.record_confirmed(0, &Fingerprint::new("f0"));
        state.record_confirmed(1, &Fingerprint::new("f1"));
        assert_eq!(state.unsaved, 2);
        assert_eq!(state.last_confirmed.as_ref().map(|(i, _)| *i), Some(1));

        state.record_checkpoint(Cursor::new("https://c/jobs/a?index=1", 1, Fingerprint::new("f1")));
        assert_eq!(state.unsaved, 0);

        state.phase = DriverPhase::Done;
        let report = state.into_report();
        assert!(report.is_complete());
        assert_eq!(report.acted, vec![0, 1]);
        assert_eq!(report.attempts, 1);
    }

    #[test]
    fn request_builders() {
        let request = RunRequest::new(ActionSpec::repeat(ActionKind::Download, 3))
            .resuming(true)
            .starting_at(1)
            .stop_after(2);
        assert!(request.resume);
        assert_eq!(request.start_index, 1);
        assert_eq!(request.max_batches, Some(2));
    }
}
