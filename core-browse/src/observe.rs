//! # Observable Values
//!
//! A value with an explicit observer list. Observers run synchronously on the
//! thread that changed the value, after every internal lock is released, so
//! an observer may read or even set the same observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: RwLock<T>,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn remove(&self, id: u64) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|(observer_id, _)| *observer_id != id);
        }
    }
}

/// Shared, observable value. Clones share the same value and observers.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        match self.inner.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the value and notifies observers.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Mutates the value in place and notifies observers with the result.
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut T),
    {
        let snapshot = {
            let mut guard = match self.inner.value.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            mutate(&mut guard);
            guard.clone()
        };
        self.notify(&snapshot);
    }

    /// Mutates the value in place; observers run only if `mutate` returns
    /// `true`. Returns what `mutate` returned.
    pub fn update_if<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let snapshot = {
            let mut guard = match self.inner.value.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !mutate(&mut guard) {
                return false;
            }
            guard.clone()
        };
        self.notify(&snapshot);
        true
    }

    /// Registers an observer. It stays registered until the returned
    /// [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.inner.observers.lock() {
            observers.push((id, Arc::new(observer)));
        }

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove(id);
                }
            })),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .lock()
            .map(|observers| observers.len())
            .unwrap_or(0)
    }

    fn notify(&self, value: &T) {
        let observers: Vec<Observer<T>> = match self.inner.observers.lock() {
            Ok(observers) => observers.iter().map(|(_, f)| Arc::clone(f)).collect(),
            Err(_) => return,
        };
        for observer in observers {
            observer(value);
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Sets the value only if it differs. Returns `true` when observers ran.
    pub fn set_if_changed(&self, value: T) -> bool {
        let changed = {
            let mut guard = match self.inner.value.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *guard == value {
                false
            } else {
                *guard = value.clone();
                true
            }
        };
        if changed {
            self.notify(&value);
        }
        changed
    }
}

/// Observer registration handle. Dropping it unsubscribes.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keeps the observer registered for the observable's whole lifetime.
    pub fn detach(mut self) {
        self.unsubscribe.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
