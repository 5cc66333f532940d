//! Session notifications for the presentation layer.
//!
//! The session runs on a single thread, so listeners are plain boxed
//! closures called synchronously, in registration order, after the state
//! change they describe is complete.

use std::fmt;

use uuid::Uuid;

use crate::fields::{ItemKey, TransactionKey};

/// The field or row the UI should put keyboard focus on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusTarget {
    TransactionField {
        transaction_id: Uuid,
        key: TransactionKey,
    },
    ItemField {
        transaction_id: Uuid,
        item_id: Uuid,
        key: ItemKey,
    },
    Transaction(Uuid),
    Item { transaction_id: Uuid, item_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Reloaded,
    /// `inserted` counts the rows created by the save.
    Saved { inserted: usize },
    Discarded,
    /// A reorder has completed; `item_id` is set for item moves.
    Reordered {
        transaction_id: Uuid,
        item_id: Option<Uuid>,
    },
    /// Emitted after undo/redo.
    Focus(FocusTarget),
}

pub type ListenerId = u64;

type Listener<T> = Box<dyn FnMut(&T)>;

/// Typed synchronous event emitter.
pub struct EventEmitter<T> {
    listeners: Vec<(ListenerId, Listener<T>)>,
    next_id: ListenerId,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers `callback` and returns the id to pass to [`EventEmitter::off`].
    pub fn on(&mut self, callback: impl FnMut(&T) + 'static) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(callback)));
        id
    }

    /// Does nothing if `id` is not registered.
    pub fn off(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener, _)| *listener != id);
    }

    pub fn emit(&mut self, event: &T) {
        for (_, callback) in &mut self.listeners {
            callback(event);
        }
    }

    pub fn size(&self) -> usize {
        self.listeners.len()
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn emits_to_registered_listeners_until_removed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter = EventEmitter::<SessionEvent>::new();
        let sink = Rc::clone(&seen);
        let id = emitter.on(move |event| sink.borrow_mut().push(event.clone()));

        emitter.emit(&SessionEvent::Reloaded);
        emitter.off(id);
        emitter.off(id);
        emitter.emit(&SessionEvent::Discarded);

        assert_eq!(*seen.borrow(), vec![SessionEvent::Reloaded]);
        assert_eq!(emitter.size(), 0);
    }
}
