use crate::cell::CellValue;
use std::fmt;

/// Something that happened to a table that listeners may care about.
#[derive(Clone, Debug, PartialEq)]
pub enum TableEvent {
    CellChanged {
        row: usize,
        column: String,
        old: CellValue,
        new: CellValue,
    },
    /// A row-level action button (edit, view, locate on map, ...) was used.
    RowAction { action: String, row: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Callbacks scoped to one table instance.
///
/// Handlers are called in registration order. Registering returns an id that
/// can later be used to remove the handler.
pub struct EventRegistry<E> {
    handlers: Vec<(HandlerId, Box<dyn FnMut(&E)>)>,
    next_id: u64,
}

impl<E> EventRegistry<E> {
    pub fn new() -> Self {
        EventRegistry {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn register(&mut self, handler: impl FnMut(&E) + 'static) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Returns how many handlers saw the event.
    pub fn dispatch(&mut self, event: &E) -> usize {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
        self.handlers.len()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
