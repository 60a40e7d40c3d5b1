//! Reusable per-response working buffers
//!
//! [`Pool::acquire`] hands out a [`Pooled`] guard. Dropping the guard resets
//! the value and returns it to the pool, so release happens on every exit
//! path including early returns through `?`. A value is only ever reachable
//! through its guard, which makes use-after-release unrepresentable.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, PoisonError},
};

/// Values that can be wiped back to their initial state for reuse
pub trait Reset {
    fn reset(&mut self);

    /// Whether the value is worth keeping after reset
    ///
    /// Lets oversized buffers fall out of the pool instead of pinning memory.
    fn is_reusable(&self) -> bool {
        true
    }
}

/// Largest buffer capacity kept across requests
const MAX_RETAINED_CAPACITY: usize = 4 * 1024 * 1024;

impl<T> Reset for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        self.capacity() <= MAX_RETAINED_CAPACITY
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        self.capacity() <= MAX_RETAINED_CAPACITY
    }
}

struct Shared<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

/// Bounded free list of reusable values
pub struct Pool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.shared.max_idle)
            .finish()
    }
}

impl<T: Reset + Default> Pool<T> {
    /// Create a pool that keeps at most `max_idle` released values
    pub fn new(max_idle: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
            }),
        }
    }

    /// Take a clean value, allocating a new one when the pool is empty
    pub fn acquire(&self) -> Pooled<T> {
        let value = self
            .shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();

        Pooled {
            value: Some(value),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Pool<T> {
    /// Number of values currently waiting for reuse
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Scoped handle to a pooled value
pub struct Pooled<T: Reset> {
    value: Option<T>,
    shared: Arc<Shared<T>>,
}

impl<T: Reset> Pooled<T> {
    /// Keep the value and never return it to the pool
    pub fn detach(mut self) -> T {
        // `value` is only `None` after this call or during drop
        self.value.take().unwrap_or_else(|| unreachable!("pooled value already taken"))
    }
}

impl<T: Reset> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().unwrap_or_else(|| unreachable!("pooled value already taken"))
    }
}

impl<T: Reset> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!("pooled value already taken"))
    }
}

impl<T: Reset + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

impl<T: Reset> Drop for Pooled<T> {
    fn drop(&mut self) {
        let Some(mut value) = self.value.take() else {
            return;
        };

        value.reset();
        if !value.is_reusable() {
            return;
        }

        let mut idle = self.shared.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.shared.max_idle {
            idle.push(value);
        }
    }
}
