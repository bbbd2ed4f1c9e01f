//! Typed publish/subscribe.
//!
//! Every stateful service owns an [`EventBus`] over its own closed event enum.
//! Observers receive a [`Subscription`] that removes the listener when dropped,
//! so a forgotten observer never outlives the handle that created it.


use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;

/// Listener invoked synchronously for every emitted event
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Minimal typed event bus
pub struct EventBus<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(listener))
    }

    /// Register an already shared listener
    pub fn subscribe_shared(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, listener));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry).listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Deliver an event to every current listener.
    ///
    /// Listeners run outside the registry lock, so a listener may subscribe,
    /// unsubscribe or emit again without deadlocking.
    pub fn emit(&self, event: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.registry)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Forward every event into a channel (used to hand events to a single owner task)
    pub fn forward_to(&self, tx: mpsc::UnboundedSender<T>) -> Subscription {
        self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        })
    }

    /// Forward every event into a channel after mapping it
    pub fn forward_with<U, F>(&self, tx: mpsc::UnboundedSender<U>, map: F) -> Subscription
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            let _ = tx.send(map(event.clone()));
        })
    }
}

impl<T: 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Handle for a registered listener; dropping it unsubscribes
#[must_use = "dropping a Subscription immediately removes the listener"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Subscription that owns nothing
    pub fn empty() -> Self {
        Self { remove: None }
    }

    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
