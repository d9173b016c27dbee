use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A scoped event subscription.
///
/// Holds a release callback that runs exactly once, either through
/// [`dispose`](Self::dispose) or when the guard is dropped. A panicking
/// release callback is contained and logged; disposal never fails.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the subscription now.
    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            if catch_unwind(AssertUnwindSafe(release)).is_err() {
                log::debug!("subscription release callback panicked; ignoring");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.release.is_some())
            .finish()
    }
}

/// Ordered set of subscriptions owned by one resource.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    items: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.items.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Release every subscription in insertion order and empty the set.
    pub fn dispose_all(&mut self) {
        for subscription in self.items.drain(..) {
            subscription.dispose();
        }
    }
}

/// Shared open/closed switch checked by whoever forwards events.
///
/// Reader threads hold a clone and forward only while the gate is open; the
/// owning session holds a [`Subscription`] that closes it.
#[derive(Clone, Debug)]
pub struct Gate(Arc<AtomicBool>);

impl Gate {
    pub fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// A subscription that closes this gate when released.
    pub fn subscription(&self) -> Subscription {
        let gate = self.clone();
        Subscription::new(move || gate.close())
    }
}
