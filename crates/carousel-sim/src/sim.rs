use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carousel_core_types::{ActionKind, Direction, Fingerprint};
use carousel_nav::{address, RemoteError, RemoteView};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use crate::config::{FaultPlan, SimConfig};

/// Counters for what the driver asked of the simulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub steps_issued: u64,
    pub steps_ignored: u64,
    pub triggers_issued: u64,
    pub triggers_ignored: u64,
    pub gotos: u64,
    pub queue_reads: u64,
}

#[derive(Default)]
struct State {
    faults: FaultPlan,
    in_detail: bool,
    position: usize,
    previous: usize,
    moved_at: Option<Instant>,
    jumped: bool,
    marker_times: Vec<Instant>,
    queue: u32,
    ignored_once: BTreeSet<usize>,
    acted: Vec<(usize, ActionKind)>,
    stats: SimStats,
}

pub struct SimCarousel {
    config: SimConfig,
    jobs: Vec<String>,
    state: Mutex<State>,
}

impl SimCarousel {
    pub fn new(config: SimConfig, faults: FaultPlan) -> Arc<Self> {
        let job_size = config.job_size.max(1);
        let job_count = config.total.div_ceil(job_size).max(1);
        let jobs = (0..job_count)
            .map(|job| match config.seed {
                Some(seed) => Uuid::from_u128(((seed as u128) << 64) | job as u128).to_string(),
                None => Uuid::new_v4().to_string(),
            })
            .collect();
        Arc::new(Self {
            config: SimConfig { job_size, ..config },
            jobs,
            state: Mutex::new(State {
                faults,
                ..State::default()
            }),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn total(&self) -> usize {
        self.config.total
    }

    /// Replace the fault plan, e.g. to heal the remote between runs.
    pub fn set_faults(&self, faults: FaultPlan) {
        self.state.lock().faults = faults;
    }

    pub fn position(&self) -> usize {
        self.state.lock().position
    }

    pub fn queue(&self) -> u32 {
        self.state.lock().queue
    }

    pub fn stats(&self) -> SimStats {
        self.state.lock().stats.clone()
    }

    /// Every registered action in order.
    pub fn acted(&self) -> Vec<(usize, ActionKind)> {
        self.state.lock().acted.clone()
    }

    pub fn acted_indices(&self) -> Vec<usize> {
        self.state
            .lock()
            .acted
            .iter()
            .map(|(index, _)| *index)
            .collect()
    }

    pub fn address_of(&self, index: usize) -> String {
        let (job, sub) = self.split(index);
        address::jobs_address(
            &self.config.base_url,
            &address::JobPosition {
                job_id: self.jobs[job].clone(),
                index: sub,
            },
        )
    }

    pub fn fingerprint_of(&self, index: usize) -> Fingerprint {
        let (job, sub) = self.split(index);
        Fingerprint::new(format!(
            "{}/{}/0_{}.png",
            self.config.cdn_url.trim_end_matches('/'),
            self.jobs[job],
            sub
        ))
    }

    fn split(&self, index: usize) -> (usize, usize) {
        let job = (index / self.config.job_size).min(self.jobs.len() - 1);
        (job, index - job * self.config.job_size)
    }

    fn index_of_address(&self, target: &str) -> Option<usize> {
        let position = address::parse_jobs_address(target)?;
        let job = self.jobs.iter().position(|id| *id == position.job_id)?;
        let index = job * self.config.job_size + position.index;
        (position.index < self.config.job_size && index < self.config.total).then_some(index)
    }

    fn land(state: &mut State, index: usize) {
        state.in_detail = true;
        state.position = index;
        state.previous = index;
        state.moved_at = Some(Instant::now());
        state.jumped = true;
    }
}

#[async_trait]
impl RemoteView for SimCarousel {
    async fn goto(&self, destination: &str) -> Result<(), RemoteError> {
        let index = self
            .index_of_address(destination)
            .ok_or_else(|| RemoteError::InvalidAddress(destination.to_string()))?;
        let mut state = self.state.lock();
        state.stats.gotos += 1;
        let landed = if state.faults.goto_misses > 0 {
            state.faults.goto_misses -= 1;
            let last = self.config.total.saturating_sub(1) as isize;
            (index as isize + state.faults.goto_miss_offset).clamp(0, last) as usize
        } else {
            index
        };
        trace!(destination, index, landed, "sim goto");
        Self::land(&mut state, landed);
        Ok(())
    }

    async fn open_first(&self) -> Result<(), RemoteError> {
        if self.config.total == 0 {
            return Err(RemoteError::Protocol("carousel is empty".into()));
        }
        let mut state = self.state.lock();
        Self::land(&mut state, 0);
        Ok(())
    }

    async fn step(&self, direction: Direction) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        if !state.in_detail {
            return Err(RemoteError::Protocol("no item open".into()));
        }
        state.stats.steps_issued += 1;

        let at = state.position;
        let stuck = state.faults.stuck_from.map_or(false, |from| at >= from);
        let dropped = state.faults.drop_step_at.remove(&at);
        let next = match direction {
            Direction::Forward if at + 1 < self.config.total => Some(at + 1),
            Direction::Back if at > 0 => Some(at - 1),
            _ => None,
        };

        match next {
            Some(next) if !stuck && !dropped => {
                state.previous = at;
                state.position = next;
                state.moved_at = Some(Instant::now());
                state.jumped = false;
                trace!(from = at, to = next, "sim step");
            }
            _ => {
                state.stats.steps_ignored += 1;
                trace!(at, stuck, dropped, "sim step ignored");
            }
        }
        Ok(())
    }

    async fn trigger(&self, kind: &ActionKind) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        if !state.in_detail {
            return Err(RemoteError::Protocol("no item open".into()));
        }
        if state.faults.reject_actions {
            return Err(RemoteError::Rejected("rate limited".into()));
        }
        state.stats.triggers_issued += 1;

        let at = state.position;
        if state.faults.ignore_actions_at.contains(&at)
            && (!state.faults.ignore_once || state.ignored_once.insert(at))
        {
            state.stats.triggers_ignored += 1;
            trace!(at, "sim trigger ignored");
            return Ok(());
        }

        let visible_at = Instant::now() + Duration::from_millis(self.config.action_latency_ms);
        state.marker_times.push(visible_at);
        state.acted.push((at, kind.clone()));
        state.queue += self.config.queue_per_action;
        trace!(at, action = %kind, "sim trigger registered");
        Ok(())
    }

    async fn fingerprint(&self) -> Result<Option<String>, RemoteError> {
        let state = self.state.lock();
        if !state.in_detail {
            return Ok(None);
        }
        if let Some(at) = state.moved_at {
            let since = Instant::now().duration_since(at);
            let latency = Duration::from_millis(self.config.step_latency_ms);
            if since < latency {
                if state.jumped {
                    return Ok(None);
                }
                return Ok(Some(self.fingerprint_of(state.previous).as_str().to_string()));
            }
            if since < latency + Duration::from_millis(self.config.load_gap_ms) {
                return Ok(None);
            }
        }
        Ok(Some(self.fingerprint_of(state.position).as_str().to_string()))
    }

    async fn address(&self) -> Result<String, RemoteError> {
        let state = self.state.lock();
        if !state.in_detail {
            return Ok(format!("{}/archive", self.config.base_url));
        }
        let lagging = state
            .moved_at
            .map(|at| at.elapsed() < Duration::from_millis(self.config.address_lag_ms))
            .unwrap_or(false);
        let index = if lagging {
            state.previous
        } else {
            state.position
        };
        Ok(self.address_of(index))
    }

    async fn action_marker(&self, _kind: &ActionKind) -> Result<Option<u64>, RemoteError> {
        let state = self.state.lock();
        if !state.in_detail {
            return Ok(None);
        }
        let now = Instant::now();
        let visible = state.marker_times.iter().filter(|at| **at <= now).count();
        Ok(Some(visible as u64))
    }

    async fn queue_depth(&self) -> Result<Option<u32>, RemoteError> {
        let mut state = self.state.lock();
        state.stats.queue_reads += 1;
        if state.faults.queue_unreadable {
            return Ok(None);
        }
        let depth = state.queue;
        if !state.faults.queue_never_drains {
            state.queue = depth.saturating_sub(self.config.drain_per_poll);
        }
        Ok(Some(depth))
    }

    fn address_for(&self, fingerprint: &Fingerprint) -> Option<String> {
        if !self.config.supports_address_for {
            return None;
        }
        address::jobs_address_from_resource(&self.config.base_url, fingerprint.as_str())
    }

    async fn leave_detail(&self) -> Result<(), RemoteError> {
        self.state.lock().in_detail = false;
        Ok(())
    }
}
