use std::time::Duration;

use async_trait::async_trait;

/// Politeness throttle applied between external calls.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Waits long enough for the next call to be polite.
    async fn acquire(&self);
}

/// Fixed blocking delay, no burst allowance.
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn acquire(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

/// No-op throttle for tests.
pub struct NoDelay;

#[async_trait]
impl Throttle for NoDelay {
    async fn acquire(&self) {}
}
