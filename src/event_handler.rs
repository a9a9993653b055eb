use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

pub type EventHandlerFn<T> =
    Box<dyn (Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// HandlerId identifies one registration so it can be removed again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Entry<T> = (HandlerId, Arc<EventHandlerFn<T>>);

/// EventHandlers is the observer list of one event. Handlers run in
/// registration order; a handler registered or removed while an event is
/// being delivered takes effect from the next event.
pub(crate) struct EventHandlers<T> {
    next_id: Arc<AtomicU64>,
    handlers: ArcSwap<Vec<Entry<T>>>,
}

impl<T> Default for EventHandlers<T> {
    fn default() -> Self {
        EventHandlers::sharing_ids(&Arc::new(AtomicU64::new(1)))
    }
}

impl<T> EventHandlers<T> {
    /// sharing_ids draws ids from `ids`, so the lists of one object never
    /// hand out the same HandlerId twice.
    pub(crate) fn sharing_ids(ids: &Arc<AtomicU64>) -> Self {
        EventHandlers {
            next_id: Arc::clone(ids),
            handlers: ArcSwap::from_pointee(vec![]),
        }
    }
}

impl<T: Clone + Send + 'static> EventHandlers<T> {
    pub(crate) fn register(&self, f: EventHandlerFn<T>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let f = Arc::new(f);
        self.handlers.rcu(|handlers| {
            let mut handlers = Vec::clone(handlers);
            handlers.push((id, Arc::clone(&f)));
            handlers
        });
        id
    }

    /// unregister returns false when `id` was not registered.
    pub(crate) fn unregister(&self, id: HandlerId) -> bool {
        let mut found = false;
        self.handlers.rcu(|handlers| {
            found = handlers.iter().any(|(h, _)| *h == id);
            handlers
                .iter()
                .filter(|(h, _)| *h != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        found
    }

    pub(crate) fn clear(&self) {
        self.handlers.store(Arc::new(vec![]));
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.load().len()
    }

    pub(crate) async fn emit(&self, event: T) {
        let handlers = self.handlers.load_full();
        for (_, f) in handlers.iter() {
            f(event.clone()).await;
        }
    }
}
