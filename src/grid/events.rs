//! Typed event bus owned by the grid state store.
//!
//! Replaces window-level custom events with an explicit pub-sub surface: the
//! host status bar, logging panel and profile switcher subscribe here instead
//! of scraping rendered output. Emission is synchronous and single-threaded.

use std::fmt;

use crate::grid::{ItemId, NestId};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    WidgetAdded { id: ItemId },
    WidgetRemoved { id: ItemId },
    NestAdded { id: NestId },
    NestRemoved { id: NestId },
    /// A widget changed containers (main grid or a nest).
    WidgetTransferred { id: ItemId, to: Option<NestId> },
    WidgetCountChanged { count: usize },
    ProfileChanged { name: String },
    SaveCompleted,
    SaveFailed { message: String },
    AutoSaveFailed { attempt: u32 },
    AutoSaveDisabled,
}

type Subscriber = Box<dyn FnMut(&Event)>;

#[derive(Default)]
pub struct Events {
    subscribers: Vec<Subscriber>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&Event) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn emit(&mut self, event: Event) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn all_subscribers_see_every_event() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut events = Events::new();

        for _ in 0..2 {
            let seen = seen.clone();
            events.subscribe(move |event| seen.borrow_mut().push(event.clone()));
        }

        events.emit(Event::WidgetCountChanged { count: 3 });
        assert_eq!(seen.borrow().len(), 2);
    }
}
