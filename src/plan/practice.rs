// Looping practice plan

/// Practice beep plan: a short interval list that repeats forever
///
/// Fired indices are cumulative across cycles, so with `[3, 7]` the triggers
/// at 3s, 10s, 13s, 20s have indices 0, 1, 2, 3.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticePlan {
    intervals_ms: Vec<u64>,
}

impl PracticePlan {
    /// Build a practice plan; zero and negative intervals are dropped
    pub fn new(intervals_secs: &[f64]) -> Option<Self> {
        let intervals_ms: Vec<u64> = intervals_secs
            .iter()
            .filter(|s| s.is_finite() && **s > 0.0)
            .map(|s| (s * 1000.0).round() as u64)
            .collect();
        (!intervals_ms.is_empty()).then_some(Self { intervals_ms })
    }

    /// Cumulative offsets within one cycle
    fn schedule_ms(&self) -> Vec<u64> {
        self.intervals_ms
            .iter()
            .scan(0u64, |acc, ms| {
                *acc += ms;
                Some(*acc)
            })
            .collect()
    }

    fn cycle_ms(&self) -> u64 {
        self.intervals_ms.iter().sum()
    }

    /// Last fired cumulative index after `elapsed_ms`, if any
    pub fn fired_index(&self, elapsed_ms: u64) -> Option<u64> {
        let schedule = self.schedule_ms();
        let cycle = self.cycle_ms();
        let cycles = elapsed_ms / cycle;
        let offset = elapsed_ms % cycle;
        let in_cycle = schedule.iter().take_while(|&&at| offset >= at).count() as u64;
        (cycles * schedule.len() as u64 + in_cycle).checked_sub(1)
    }

    /// Cumulative index of the next trigger
    pub fn next_index(&self, elapsed_ms: u64) -> u64 {
        self.fired_index(elapsed_ms).map_or(0, |i| i + 1)
    }

    /// Milliseconds until the next trigger, wrapping into the next cycle
    pub fn time_until_next_ms(&self, elapsed_ms: u64) -> u64 {
        let schedule = self.schedule_ms();
        let cycle = self.cycle_ms();
        let offset = elapsed_ms % cycle;
        schedule
            .iter()
            .find(|&&at| offset < at)
            .map(|at| at - offset)
            .unwrap_or(cycle - offset + schedule[0])
    }
}

impl Default for PracticePlan {
    fn default() -> Self {
        Self {
            intervals_ms: vec![10_000, 15_000, 12_000, 13_000],
        }
    }
}
