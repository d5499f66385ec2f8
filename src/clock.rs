//! Time source for the pipeline.
//!
//! The optical-extraction path polls an asynchronous OCR job and sleeps
//! between polls. Routing both the sleep and the wall-clock reading through
//! [`Clock`] lets tests drive a 60-second poll budget in microseconds and lets
//! job records carry deterministic timestamps.
//!
//! Every wait is a plain future: dropping the future that awaits it (for
//! example by wrapping [`crate::Pipeline::run`] in `tokio::time::timeout`)
//! cancels the wait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Injectable sleep + wall clock.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the current task for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
