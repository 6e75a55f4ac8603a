use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A wall-clock timestamp, broken into seconds and nanoseconds since the
/// Unix epoch. Stage timings are reported in this shape rather than as an
/// opaque `Instant`, since they cross the event-channel boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct WallTime {
    pub secs: i64,
    pub nanos: u32,
}

/// The clock and transport are external collaborators; this trait
/// is the seam a caller supplies. `now_nanos` backs the hot, allocation-free
/// sample paths (distributions, timers); `wall_now` backs stage timing,
/// which only happens at init-stage boundaries.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> i64;
    fn wall_now(&self) -> WallTime;
}

/// Default [`Clock`] backed by [`Instant`] (monotonic) and [`SystemTime`]
/// (wall-clock), mirroring the real runtime's `cheap_now_nanos`/`wall_now`
/// pair.
#[derive(Debug, Default)]
pub struct SystemClock;

fn process_start() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        process_start().elapsed().as_nanos() as i64
    }

    fn wall_now(&self) -> WallTime {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        WallTime {
            secs: now.as_secs() as i64,
            nanos: now.subsec_nanos(),
        }
    }
}
