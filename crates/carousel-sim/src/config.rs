use std::collections::BTreeSet;

/// Shape and timing of the simulated carousel.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Items in the whole sequence
    pub total: usize,

    /// Items per sub-collection ("job")
    pub job_size: usize,

    pub base_url: String,
    pub cdn_url: String,

    /// Delay before a step shows up in the fingerprint (milliseconds)
    pub step_latency_ms: u64,

    /// Fingerprint reads empty for this long after the step lands (milliseconds)
    pub load_gap_ms: u64,

    /// Delay before a trigger moves the action marker (milliseconds)
    pub action_latency_ms: u64,

    /// Queue entries added per registered action
    pub queue_per_action: u32,

    /// Queue entries finished per queue read
    pub drain_per_poll: u32,

    /// Whether fingerprints can be turned back into addresses
    pub supports_address_for: bool,

    /// Address bar keeps showing the previous item for this long after a move (milliseconds)
    pub address_lag_ms: u64,

    /// Derive job ids from this seed so separate processes see the same carousel
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total: 12,
            job_size: 4,
            base_url: "https://carousel.local".to_string(),
            cdn_url: "https://cdn.carousel.local".to_string(),
            step_latency_ms: 300,
            load_gap_ms: 0,
            action_latency_ms: 200,
            queue_per_action: 1,
            drain_per_poll: 1,
            supports_address_for: true,
            address_lag_ms: 0,
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total;
        self
    }

    pub fn with_job_size(mut self, job_size: usize) -> Self {
        self.job_size = job_size.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Zero latencies everywhere.
    pub fn instant(mut self) -> Self {
        self.step_latency_ms = 0;
        self.load_gap_ms = 0;
        self.action_latency_ms = 0;
        self
    }
}

/// Faults to inject. All empty by default.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Steps never take effect once the view is at or past this index
    pub stuck_from: Option<usize>,

    /// One step leaving each of these indices is silently dropped
    pub drop_step_at: BTreeSet<usize>,

    /// Triggers at these indices are ignored
    pub ignore_actions_at: BTreeSet<usize>,

    /// Ignore only the first trigger at each index above
    pub ignore_once: bool,

    /// The next N jumps miss their target
    pub goto_misses: u32,

    /// Where a missed jump lands relative to its target (-1 = one item early)
    pub goto_miss_offset: isize,

    /// Queue depth never decreases
    pub queue_never_drains: bool,

    /// Queue indicator exists but cannot be read
    pub queue_unreadable: bool,

    /// Every trigger is rejected as rate limited
    pub reject_actions: bool,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn stuck_from(mut self, index: usize) -> Self {
        self.stuck_from = Some(index);
        self
    }

    pub fn drop_step_at(mut self, index: usize) -> Self {
        self.drop_step_at.insert(index);
        self
    }

    pub fn ignore_action_at(mut self, index: usize) -> Self {
        self.ignore_actions_at.insert(index);
        self
    }

    pub fn ignore_once(mut self) -> Self {
        self.ignore_once = true;
        self
    }

    pub fn goto_lands_behind(self, times: u32) -> Self {
        self.goto_lands_off_by(times, -1)
    }

    /// The next `times` jumps land `offset` items away from their target.
    pub fn goto_lands_off_by(mut self, times: u32, offset: isize) -> Self {
        self.goto_misses = times;
        self.goto_miss_offset = offset;
        self
    }

    pub fn queue_never_drains(mut self) -> Self {
        self.queue_never_drains = true;
        self
    }

    pub fn queue_unreadable(mut self) -> Self {
        self.queue_unreadable = true;
        self
    }
}
