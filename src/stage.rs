use std::sync::{Arc, RwLock};

use crate::clock::{Clock, WallTime};

/// A named phase of the enclosing runtime's startup, with start and end
/// timestamps.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub started: WallTime,
    pub ended: Option<WallTime>,
}

impl StageTiming {
    pub fn in_progress(&self) -> bool {
        self.ended.is_none()
    }
}

#[derive(Debug, Default)]
struct StageState {
    finished: Vec<StageTiming>,
    current: Option<StageTiming>,
    current_generation: u64,
}

/// Records start/end timestamps for named initialization stages. The
/// finished list is append-only and never reordered; a single
/// reader/writer lock protects all of this state.
#[derive(Debug)]
pub struct StageTimer {
    clock: Arc<dyn Clock>,
    state: RwLock<StageState>,
}

impl StageTimer {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            state: RwLock::new(StageState::default()),
        })
    }

    /// Implicitly ends any in-progress stage at the current wall-time,
    /// records the new stage as in-progress, and returns an idempotent
    /// finisher: calling it ends the stage at the time of the call, unless
    /// a later `start_stage` has already rolled the stage over, in which
    /// case it is a no-op.
    pub fn start_stage(self: &Arc<Self>, stage: impl Into<String>) -> impl Fn() + Send + Sync + 'static {
        let stage = stage.into();
        let now = self.clock.wall_now();
        let generation = {
            let mut state = self.state.write().unwrap();
            Self::end_current_locked(&mut state, now);
            state.current_generation += 1;
            state.current = Some(StageTiming {
                stage: stage.clone(),
                started: now,
                ended: None,
            });
            state.current_generation
        };
        tracing::debug!(stage = %stage, "stage started");
        let this = Arc::clone(self);
        move || this.finish_if_current(generation)
    }

    fn finish_if_current(&self, generation: u64) {
        let now = self.clock.wall_now();
        let mut state = self.state.write().unwrap();
        if state.current_generation == generation {
            Self::end_current_locked(&mut state, now);
        }
    }

    fn end_current_locked(state: &mut StageState, now: WallTime) {
        if let Some(mut current) = state.current.take() {
            current.ended = Some(now);
            tracing::debug!(stage = %current.stage, "stage finished");
            state.finished.push(current);
        }
    }

    /// A shallow copy of the append-only finished list, taken under the
    /// lock and safe to read afterwards without it — older entries are
    /// never mutated.
    pub fn finished_snapshot(&self) -> Vec<StageTiming> {
        self.state.read().unwrap().finished.clone()
    }

    /// Names of every stage seen so far, finished or in-progress, in the
    /// order they started — included in the one-shot `MetricRegistration`
    /// message.
    pub fn known_stage_names(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        state
            .finished
            .iter()
            .map(|t| t.stage.clone())
            .chain(state.current.iter().map(|t| t.stage.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FixedClock(AtomicI64);
    impl Clock for FixedClock {
        fn now_nanos(&self) -> i64 {
            0
        }
        fn wall_now(&self) -> WallTime {
            WallTime {
                secs: self.0.fetch_add(1, Ordering::Relaxed),
                nanos: 0,
            }
        }
    }

    #[test]
    fn scenario_6_stage_ordering() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(AtomicI64::new(0)));
        let timer = StageTimer::new(clock);

        let finish_restore_config = timer.start_stage("restore_config"); // t=0
        let finish_restore = timer.start_stage("restore"); // t=1, implicitly ends restore_config at t=1
        finish_restore_config(); // no-op: generation already rolled over
        finish_restore(); // end "restore" at t=2

        let finished = timer.finished_snapshot();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].stage, "restore_config");
        assert_eq!(finished[0].started.secs, 0);
        assert_eq!(finished[0].ended.unwrap().secs, 1);
        assert_eq!(finished[1].stage, "restore");
        assert_eq!(finished[1].started.secs, 1);
        assert_eq!(finished[1].ended.unwrap().secs, 2);
        assert!(!finished[0].in_progress());
    }

    #[test]
    fn finisher_closure_is_idempotent() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(AtomicI64::new(0)));
        let timer = StageTimer::new(clock);
        let finish = timer.start_stage("a");
        finish();
        finish();
        assert_eq!(timer.finished_snapshot().len(), 1);
    }
}
