//! Thread-safe sampler handle
//!
//! `WindowedSampler` is single-owner. When several threads record into the
//! same quantity, wrap it in a `SharedSampler`: the window check, the optional
//! flush and the group update all happen under one lock, so a window is never
//! split and no increment is lost.
//!
//! Flush handlers run while the lock is held. A handler that calls back into
//! the same `SharedSampler` deadlocks.

use super::bucket::Bucket;
use super::labels::Labels;
use super::window::{SubscriptionId, WindowedSampler};
use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Cloneable, lock-protected handle onto one `WindowedSampler`
pub struct SharedSampler<P, C: Clock = SystemClock> {
    inner: Arc<Mutex<WindowedSampler<P, C>>>,
}

impl<P> SharedSampler<P, SystemClock> {
    pub fn new(window: Duration) -> Self {
        Self::from_sampler(WindowedSampler::new(window))
    }
}

impl<P, C: Clock> SharedSampler<P, C> {
    pub fn from_sampler(sampler: WindowedSampler<P, C>) -> Self {
        SharedSampler {
            inner: Arc::new(Mutex::new(sampler)),
        }
    }

    pub fn record(&self, value: f64, labels: Labels, payload: P) {
        self.inner.lock().record(value, labels, payload);
    }

    pub fn flush_now(&self) {
        self.inner.lock().flush_now();
    }

    pub fn on_flush<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(&[Bucket<P>]) + Send + 'static,
    {
        self.inner.lock().on_flush(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().unsubscribe(id)
    }

    pub fn window(&self) -> Duration {
        self.inner.lock().window()
    }
}

impl<P, C: Clock> Clone for SharedSampler<P, C> {
    fn clone(&self) -> Self {
        SharedSampler {
            inner: self.inner.clone(),
        }
    }
}

impl<P, C: Clock> std::fmt::Debug for SharedSampler<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSampler").field(&*self.inner.lock()).finish()
    }
}
