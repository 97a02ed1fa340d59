// Solotto - Time sources
use solana_program::clock::UnixTimestamp;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock read by the state machine
pub trait ClockSource {
    fn unix_timestamp(&self) -> UnixTimestamp;
}

/// Host system time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn unix_timestamp(&self) -> UnixTimestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as UnixTimestamp)
            .unwrap_or_default()
    }
}

/// Clock moved by hand; clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: UnixTimestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, now: UnixTimestamp) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn unix_timestamp(&self) -> UnixTimestamp {
        self.now.load(Ordering::SeqCst)
    }
}
