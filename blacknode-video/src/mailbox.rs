/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Single-slot handoff between the receive thread and the renderer.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Holds at most one value. Writers overwrite, readers take or copy. There is
/// no queue and no backpressure towards the writer.
#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // The slot is a plain value; a panic elsewhere cannot leave it torn.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`, returning the unread value it replaced.
    pub fn put(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    /// Removes and returns the current value.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    /// Runs `f` on the current value without removing it.
    pub fn peek<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.lock().as_ref())
    }
}

impl<T: Clone> Mailbox<T> {
    /// Copies the current value, leaving it in place.
    pub fn latest(&self) -> Option<T> {
        self.lock().clone()
    }
}
