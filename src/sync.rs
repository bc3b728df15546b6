//! Blocking single-assignment cell for handing results across threads.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Value(T),
    Failed(String),
    Abandoned,
}

#[derive(Debug)]
struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// A value computed elsewhere, set exactly once.
///
/// [`Future::get`] blocks until [`Promise::set`] or [`Promise::set_error`] is
/// called. Completing twice is an error. Dropping an unset promise wakes the
/// readers with [`Error::FutureAbandoned`].
#[derive(Debug)]
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Writing half of a [`Future`].
#[derive(Debug)]
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// Create a connected promise and future.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        ready: Condvar::new(),
    });
    (
        Promise {
            shared: Arc::clone(&shared),
        },
        Future { shared },
    )
}

impl<T> Shared<T> {
    fn complete(&self, slot: Slot<T>) -> Result<()> {
        let mut current = self
            .slot
            .lock()
            .map_err(|_| Error::Other("future lock poisoned".to_string()))?;
        if !matches!(*current, Slot::Pending) {
            return Err(Error::FutureAlreadySet);
        }
        *current = slot;
        self.ready.notify_all();
        Ok(())
    }
}

impl<T> Promise<T> {
    pub fn set(&self, value: T) -> Result<()> {
        self.shared.complete(Slot::Value(value))
    }

    /// Complete with an error message; readers get [`Error::Other`].
    pub fn set_error(&self, message: impl Into<String>) -> Result<()> {
        self.shared.complete(Slot::Failed(message.into()))
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.shared.slot.lock() {
            if matches!(*slot, Slot::Pending) {
                *slot = Slot::Abandoned;
                self.shared.ready.notify_all();
            }
        }
    }
}

impl<T: Clone> Future<T> {
    /// Block until the value is available.
    pub fn get(&self) -> Result<T> {
        let slot = self
            .shared
            .slot
            .lock()
            .map_err(|_| Error::Other("future lock poisoned".to_string()))?;
        let slot = self
            .shared
            .ready
            .wait_while(slot, |s| matches!(s, Slot::Pending))
            .map_err(|_| Error::Other("future lock poisoned".to_string()))?;
        read(&slot)
    }

    /// Block for at most `timeout`; `Ok(None)` if still pending.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let slot = self
            .shared
            .slot
            .lock()
            .map_err(|_| Error::Other("future lock poisoned".to_string()))?;
        let (slot, _) = self
            .shared
            .ready
            .wait_timeout_while(slot, timeout, |s| matches!(s, Slot::Pending))
            .map_err(|_| Error::Other("future lock poisoned".to_string()))?;
        match *slot {
            Slot::Pending => Ok(None),
            _ => read(&slot).map(Some),
        }
    }
}

impl<T> Future<T> {
    /// Whether the future has been completed (in any way).
    pub fn is_set(&self) -> bool {
        self.shared
            .slot
            .lock()
            .map(|s| !matches!(*s, Slot::Pending))
            .unwrap_or(true)
    }
}

fn read<T: Clone>(slot: &Slot<T>) -> Result<T> {
    match slot {
        Slot::Value(v) => Ok(v.clone()),
        Slot::Failed(message) => Err(Error::Other(message.clone())),
        Slot::Abandoned | Slot::Pending => Err(Error::FutureAbandoned),
    }
}
