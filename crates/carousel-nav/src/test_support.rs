//! Scripted remote view for unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carousel_core_types::{ActionKind, Direction, Fingerprint};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::address;
use crate::errors::RemoteError;
use crate::remote::RemoteView;

const JOB: &str = "6a1f0c52-3d4e-4b8a-9c17-5e2b7d90a4f1";
const BASE: &str = "https://carousel.test";

#[derive(Default)]
struct State {
    len: usize,
    position: usize,
    previous: usize,
    moved_at: Option<Instant>,
    step_delay: Duration,
    load_gap: Duration,
    stuck_from: Option<usize>,
    address_lag: bool,
    derivable: bool,
    ignore_triggers: u32,
    fail_triggers: bool,
    hide_marker: bool,
    marker: u64,
    steps_issued: u32,
    triggers_issued: u32,
    acted: Vec<usize>,
}

pub(crate) struct ScriptedView {
    state: Mutex<State>,
}

impl ScriptedView {
    pub fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                len,
                ..State::default()
            }),
        })
    }

    pub fn fingerprint_of(&self, index: usize) -> Fingerprint {
        Fingerprint::new(format!("https://cdn.carousel.test/{JOB}/0_{index}.png"))
    }

    pub fn address_of(&self, index: usize) -> String {
        format!("{BASE}/jobs/{JOB}?index={index}")
    }

    pub fn set_step_delay(&self, delay: Duration) {
        self.state.lock().step_delay = delay;
    }

    pub fn set_load_gap(&self, gap: Duration) {
        self.state.lock().load_gap = gap;
    }

    pub fn stick_from(&self, index: usize) {
        self.state.lock().stuck_from = Some(index);
    }

    pub fn set_address_lag(&self, lag: bool) {
        self.state.lock().address_lag = lag;
    }

    pub fn set_derivable(&self, derivable: bool) {
        self.state.lock().derivable = derivable;
    }

    pub fn ignore_triggers(&self, count: u32) {
        self.state.lock().ignore_triggers = count;
    }

    pub fn fail_triggers(&self, fail: bool) {
        self.state.lock().fail_triggers = fail;
    }

    pub fn hide_marker(&self, hide: bool) {
        self.state.lock().hide_marker = hide;
    }

    pub fn jump_to(&self, index: usize) {
        let mut state = self.state.lock();
        state.position = index;
        state.previous = index;
        state.moved_at = None;
    }

    pub fn position(&self) -> usize {
        self.state.lock().position
    }

    pub fn steps_issued(&self) -> u32 {
        self.state.lock().steps_issued
    }

    pub fn triggers_issued(&self) -> u32 {
        self.state.lock().triggers_issued
    }

    pub fn acted(&self) -> Vec<usize> {
        self.state.lock().acted.clone()
    }
}

#[async_trait]
impl RemoteView for ScriptedView {
    async fn goto(&self, address: &str) -> Result<(), RemoteError> {
        let index = address::sub_index(address)
            .ok_or_else(|| RemoteError::InvalidAddress(address.to_string()))?;
        self.jump_to(index);
        Ok(())
    }

    async fn open_first(&self) -> Result<(), RemoteError> {
        self.jump_to(0);
        Ok(())
    }

    async fn step(&self, direction: Direction) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.steps_issued += 1;
        if state.stuck_from.map_or(false, |from| state.position >= from) {
            return Ok(());
        }
        state.previous = state.position;
        state.position = match direction {
            Direction::Forward => (state.position + 1).min(state.len.saturating_sub(1)),
            Direction::Back => state.position.saturating_sub(1),
        };
        state.moved_at = Some(Instant::now());
        Ok(())
    }

    async fn trigger(&self, _kind: &ActionKind) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.triggers_issued += 1;
        if state.fail_triggers {
            return Err(RemoteError::Unavailable("trigger dropped".into()));
        }
        if state.ignore_triggers > 0 {
            state.ignore_triggers -= 1;
            return Ok(());
        }
        state.marker += 1;
        let position = state.position;
        state.acted.push(position);
        Ok(())
    }

    async fn fingerprint(&self) -> Result<Option<String>, RemoteError> {
        let state = self.state.lock();
        if let Some(at) = state.moved_at {
            let since = Instant::now().duration_since(at);
            if since < state.step_delay {
                return Ok(Some(self.fingerprint_of(state.previous).as_str().to_string()));
            }
            if since < state.step_delay + state.load_gap {
                return Ok(None);
            }
        }
        Ok(Some(self.fingerprint_of(state.position).as_str().to_string()))
    }

    async fn address(&self) -> Result<String, RemoteError> {
        let state = self.state.lock();
        let index = if state.address_lag {
            state.previous
        } else {
            state.position
        };
        Ok(self.address_of(index))
    }

    async fn action_marker(&self, _kind: &ActionKind) -> Result<Option<u64>, RemoteError> {
        let state = self.state.lock();
        Ok((!state.hide_marker).then_some(state.marker))
    }

    async fn queue_depth(&self) -> Result<Option<u32>, RemoteError> {
        Ok(Some(0))
    }

    fn address_for(&self, fingerprint: &Fingerprint) -> Option<String> {
        if !self.state.lock().derivable {
            return None;
        }
        address::jobs_address_from_resource(BASE, fingerprint.as_str())
    }
}
