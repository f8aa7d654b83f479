use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

// this implementation is a mix of the two examples below:
// - https://willcrichton.net/rust-api-type-patterns/registries.html
// - https://refactoring.guru/design-patterns/observer/rust/example

/// mapping of event types to subscribers
///
/// `TypeId` gives a unique, hashable identifier for each event type and
/// `Any` lets the boxed listener lists be down-cast back at runtime
#[derive(Debug, Default)]
struct TypeMap {
    inner: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeMap {
    /// get a reference to the value associated with type `T`
    fn get<T>(&self) -> Option<&T>
    where
        T: Any + 'static + Send + Sync,
    {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|t| t.downcast_ref::<T>())
    }

    /// get a mutable reference to the value associated with type `T`, inserting
    /// `T::default()` first if nothing is there yet
    fn get_or_default<T>(&mut self) -> Option<&mut T>
    where
        T: Any + 'static + Send + Sync + Default,
    {
        self.inner
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::<T>::default())
            .downcast_mut::<T>()
    }

    /// get a mutable reference to the value associated with type `T`
    fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Any + 'static + Send + Sync,
    {
        self.inner
            .get_mut(&TypeId::of::<T>())
            .and_then(|t| t.downcast_mut::<T>())
    }
}

/// identifies one subscription, used to unsubscribe
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(usize);

/// trait for the publisher side of the observer pattern
///
/// made a trait so that it can be implemented on an `Arc<RwLock<..>>`
pub trait EventPublisher {
    /// subscribe to an event of type `E` where the listener accepts `E`
    /// as its only argument and returns nothing
    fn subscribe<E>(&mut self, listener: impl Fn(E) + 'static + Send + Sync) -> Option<ListenerId>
    where
        E: 'static;

    /// remove a previously added listener for events of type `E`
    fn unsubscribe<E>(&mut self, id: ListenerId)
    where
        E: 'static;

    /// notify all listeners of an event of type `E`
    ///
    /// listeners run on the notifying thread and must not subscribe or
    /// unsubscribe from within the callback
    fn notify<E>(&self, event: E)
    where
        E: 'static + Clone;

    /// determine if there are any listeners for an event of type `E`
    fn has_listeners<E>(&self) -> bool
    where
        E: 'static;
}

/// type alias for a subscriber function
type Subscriber<E> = dyn Fn(E) + 'static + Send + Sync;

/// type alias for a vector of subscribers
type ListenerVec<E> = Vec<(ListenerId, Box<Subscriber<E>>)>;

/// publisher side of the observer pattern
#[derive(Debug, Default)]
pub struct Publisher {
    registry: TypeMap,
    next_id: usize,
}

impl Publisher {
    /// create a new [`Publisher`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventPublisher for Publisher {
    fn subscribe<E>(&mut self, listener: impl Fn(E) + 'static + Send + Sync) -> Option<ListenerId>
    where
        E: 'static,
    {
        let id = ListenerId(self.next_id);

        let listeners = self.registry.get_or_default::<ListenerVec<E>>()?;
        listeners.push((id, Box::new(listener)));

        self.next_id += 1;

        Some(id)
    }

    fn unsubscribe<E>(&mut self, id: ListenerId)
    where
        E: 'static,
    {
        if let Some(listeners) = self.registry.get_mut::<ListenerVec<E>>() {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    fn notify<E>(&self, event: E)
    where
        E: 'static + Clone,
    {
        if let Some(listeners) = self.registry.get::<ListenerVec<E>>() {
            for (_, callback) in listeners {
                callback(event.clone());
            }
        }
    }

    fn has_listeners<E>(&self) -> bool
    where
        E: 'static,
    {
        self.registry
            .get::<ListenerVec<E>>()
            .map_or(false, |listeners| !listeners.is_empty())
    }
}

impl EventPublisher for Arc<RwLock<Publisher>> {
    fn subscribe<E>(&mut self, listener: impl Fn(E) + 'static + Send + Sync) -> Option<ListenerId>
    where
        E: 'static,
    {
        if let Ok(mut guard) = self.write() {
            return guard.subscribe(listener);
        }

        warn!("failed to acquire Publisher lock; cannot subscribe");
        None
    }

    fn unsubscribe<E>(&mut self, id: ListenerId)
    where
        E: 'static,
    {
        if let Ok(mut guard) = self.write() {
            guard.unsubscribe::<E>(id);
        }
    }

    fn notify<E>(&self, event: E)
    where
        E: 'static + Clone,
    {
        if let Ok(guard) = self.read() {
            guard.notify(event);
        }
    }

    fn has_listeners<E>(&self) -> bool
    where
        E: 'static,
    {
        self.read()
            .map_or(false, |guard| guard.has_listeners::<E>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FuzzerProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publisher_notifies_until_unsubscribed() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let mut publisher = Publisher::new();
        assert!(!publisher.has_listeners::<FuzzerProgress>());

        let id = publisher.subscribe(move |event: FuzzerProgress| {
            assert_eq!(event.total, 10);
            counter.fetch_add(event.done, Ordering::SeqCst);
        });

        assert!(publisher.has_listeners::<FuzzerProgress>());

        publisher.notify(FuzzerProgress { done: 3, total: 10 });
        publisher.notify(FuzzerProgress { done: 4, total: 10 });
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        if let Some(id) = id {
            publisher.unsubscribe::<FuzzerProgress>(id);
        }

        publisher.notify(FuzzerProgress { done: 100, total: 10 });
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(!publisher.has_listeners::<FuzzerProgress>());
    }
}
