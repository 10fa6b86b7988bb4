use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for expiry checks, in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 { chrono::Utc::now().timestamp() }
}

/// Clock that only moves when told to. Used by tests and by embedders replaying recorded sessions.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_epoch_secs: i64) -> Self { Self { now: AtomicI64::new(now_epoch_secs) } }

    pub fn set(&self, now_epoch_secs: i64) { self.now.store(now_epoch_secs, Ordering::SeqCst); }

    pub fn advance(&self, secs: i64) { self.now.fetch_add(secs, Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> i64 { self.now.load(Ordering::SeqCst) }
}
