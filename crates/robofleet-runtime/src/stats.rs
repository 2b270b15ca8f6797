//! Loop counters readable from any thread while the loop runs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the loop counters of one orchestrator.
///
/// Counters accumulate across restarts of the same orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Passes through the steady cycle, novel frame or not.
    pub passes: u64,
    pub novel_frames: u64,
    /// Passes that found no frame or an already-processed frame.
    pub skipped_frames: u64,
    pub world_updates: u64,
    pub strategy_runs: u64,
    /// Commands handed to the robot link successfully.
    pub dispatched: u64,
    pub cycle_failures: u64,
    pub transport_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    passes: AtomicU64,
    novel_frames: AtomicU64,
    skipped_frames: AtomicU64,
    world_updates: AtomicU64,
    strategy_runs: AtomicU64,
    dispatched: AtomicU64,
    cycle_failures: AtomicU64,
    transport_errors: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl StatsCounters {
            $(
                pub(crate) fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    pass => passes,
    novel_frame => novel_frames,
    skipped_frame => skipped_frames,
    world_update => world_updates,
    strategy_run => strategy_runs,
    dispatched => dispatched,
    cycle_failure => cycle_failures,
    transport_error => transport_errors,
}

impl StatsCounters {
    pub(crate) fn snapshot(&self) -> CycleStats {
        CycleStats {
            passes: self.passes.load(Ordering::Relaxed),
            novel_frames: self.novel_frames.load(Ordering::Relaxed),
            skipped_frames: self.skipped_frames.load(Ordering::Relaxed),
            world_updates: self.world_updates.load(Ordering::Relaxed),
            strategy_runs: self.strategy_runs.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            cycle_failures: self.cycle_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let counters = StatsCounters::default();
        counters.pass();
        counters.pass();
        counters.novel_frame();
        counters.cycle_failure();

        let stats = counters.snapshot();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.novel_frames, 1);
        assert_eq!(stats.cycle_failures, 1);
        assert_eq!(stats.dispatched, 0);
    }
}
