use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Notify;

struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

/// One-shot stop signal shared by the tasks of a client run.
///
/// Any clone may fire it, any number of times, from any task; only the first
/// call has an effect and no call ever waits. Waiters that start after the
/// signal fired return immediately.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Returns true for the one call that actually fired the signal.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);

        // Register before checking the flag, notify_waiters only wakes registered waiters.
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }

        notified.await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
