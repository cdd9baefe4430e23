use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::types::{PdomError, Result};

/// Shared flag asking running queries to stop.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// A flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once [`Cancellation::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Checks a [`Cancellation`] once every `interval` calls.
#[derive(Debug, Default)]
pub(crate) struct CancelPoll {
    token: Option<Cancellation>,
    interval: u32,
    countdown: u32,
}

impl CancelPoll {
    pub(crate) fn new(token: Cancellation, interval: u32) -> Self {
        let interval = interval.max(1);
        Self {
            token: Some(token),
            interval,
            countdown: interval,
        }
    }

    /// Fails with [`PdomError::Cancelled`] when the flag is seen raised.
    pub(crate) fn check(&mut self) -> Result<()> {
        let Some(token) = self.token.as_ref() else {
            return Ok(());
        };
        self.countdown -= 1;
        if self.countdown > 0 {
            return Ok(());
        }
        self.countdown = self.interval;
        if token.is_cancelled() {
            debug!("query.cancelled");
            return Err(PdomError::Cancelled);
        }
        Ok(())
    }
}
