//! Flight control: bounds the number of batches submitted but not yet
//! verified.
//!
//! A batch is admitted while the outstanding count is at most the ceiling,
//! so at most `ceiling + 1` batches are ever outstanding. Past that the
//! submitter gets a one-shot signal that fires when the next permit is
//! released. Only one submitter may wait at a time.

use std::sync::{Arc, Mutex};

use futures::channel::oneshot;

use crate::error::{EngineError, EngineResult};

/// Outstanding batches allowed before the submitter has to wait.
pub const DEFAULT_MAX_BATCHES_IN_FLIGHT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    /// Nothing outstanding.
    Idle,
    /// Batches outstanding, submitter not waiting.
    Admitting,
    /// Submitter waiting for a release.
    Blocked,
}

#[derive(Default)]
struct Inner {
    in_flight: usize,
    peak: usize,
    admitted: usize,
    released: usize,
    waiter: Option<oneshot::Sender<()>>,
}

/// Counter of outstanding batches shared with their permits.
#[derive(Clone)]
pub struct FlightController {
    ceiling: usize,
    inner: Arc<Mutex<Inner>>,
}

/// Result of [`FlightController::admit`].
pub enum Admission {
    Granted(FlightPermit),
    /// Resolves when a permit is released; admission must then be retried.
    Blocked(oneshot::Receiver<()>),
}

impl FlightController {
    pub fn new(ceiling: usize) -> Self {
        FlightController {
            ceiling: ceiling.max(1),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit one batch, or hand back the signal to wait on.
    ///
    /// Fails if another submitter is already waiting.
    pub fn admit(&self) -> EngineResult<Admission> {
        let mut inner = self.lock();
        if inner.waiter.as_ref().is_some_and(|w| !w.is_canceled()) {
            return Err(EngineError::FlightControl(
                "a second submitter tried to wait for a flight slot".into(),
            ));
        }
        inner.waiter = None;

        if inner.in_flight > self.ceiling {
            let (tx, rx) = oneshot::channel();
            inner.waiter = Some(tx);
            log::trace!(
                "flight ceiling {} reached, {} outstanding",
                self.ceiling,
                inner.in_flight
            );
            return Ok(Admission::Blocked(rx));
        }

        inner.in_flight += 1;
        inner.admitted += 1;
        inner.peak = inner.peak.max(inner.in_flight);
        Ok(Admission::Granted(FlightPermit {
            inner: Arc::clone(&self.inner),
        }))
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Highest outstanding count observed.
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak
    }

    pub fn admitted(&self) -> usize {
        self.lock().admitted
    }

    pub fn released(&self) -> usize {
        self.lock().released
    }

    pub fn state(&self) -> FlightState {
        let inner = self.lock();
        if inner.waiter.as_ref().is_some_and(|w| !w.is_canceled()) {
            FlightState::Blocked
        } else if inner.in_flight == 0 {
            FlightState::Idle
        } else {
            FlightState::Admitting
        }
    }
}

impl Default for FlightController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCHES_IN_FLIGHT)
    }
}

/// One outstanding batch. Dropping it releases the slot and wakes the
/// waiting submitter, if any.
pub struct FlightPermit {
    inner: Arc<Mutex<Inner>>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.released += 1;
        if let Some(waiter) = inner.waiter.take() {
            // The receiver may already be gone; nothing to wake then.
            let _ = waiter.send(());
        }
    }
}
