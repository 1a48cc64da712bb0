use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum spacing between consecutive external calls.
///
/// The first call goes out immediately; every later call starts no earlier
/// than `spacing` after the previous one finished. Calls are never overlapped.
pub struct Pacer {
    spacing: Duration,
    last_finished: Option<Instant>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_finished: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Later calls use the new spacing; the last finish time is kept, so a
    /// pacer shared between stages still spaces the first call of the next one.
    pub fn set_spacing(&mut self, spacing: Duration) {
        self.spacing = spacing;
    }

    pub async fn pace<F, T>(&mut self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        if let Some(last) = self.last_finished {
            sleep_until(last + self.spacing).await;
        }
        let result = call.await;
        self.last_finished = Some(Instant::now());
        result
    }
}
