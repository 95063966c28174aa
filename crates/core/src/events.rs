//! Change notifications for the display layer
//!
//! The engine publishes typed events; the excluded UI layer subscribes
//! with callbacks. The façade holds no UI state, and observers never get
//! mutable access to the model.

use vellum_generator::RenderPurpose;

use crate::annotation::AnnotationId;
use crate::error::DocumentError;
use crate::form::FormFieldId;

/// What happened to an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationChange {
    Added,
    Removed,
    Modified,
}

/// Notifications fanned out to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    Opened,
    OpenFailed {
        reason: DocumentError,
    },
    PixmapReady {
        page_index: usize,
        purpose: RenderPurpose,
    },
    PixmapFailed {
        page_index: usize,
        purpose: RenderPurpose,
        reason: String,
    },
    SearchProgress {
        page_index: usize,
        found: bool,
    },
    AnnotationChanged {
        page_index: usize,
        annotation_id: AnnotationId,
        change: AnnotationChange,
    },
    FormFieldValueChanged {
        field_id: FormFieldId,
    },
    BookmarkChanged {
        page_index: usize,
        bookmarked: bool,
    },
    /// Page geometry changed (e.g. rotation); the display layer must
    /// recompute its layout.
    LayoutReflowNeeded,
    Closed,
}

/// Handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type Observer = Box<dyn Fn(&DocumentEvent)>;

/// Observer registration and fan-out.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<(ObserverId, Observer)>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Observer) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    /// Returns `true` if the observer was registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub fn emit(&self, event: &DocumentEvent) {
        for (_, observer) in &self.observers {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_receive_events_until_unsubscribed() {
        let mut registry = ObserverRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let id = registry.subscribe(Box::new(move |event| {
            sink.borrow_mut().push(event.clone());
        }));

        registry.emit(&DocumentEvent::Opened);
        assert_eq!(seen.borrow().len(), 1);

        assert!(registry.unsubscribe(id));
        registry.emit(&DocumentEvent::Closed);
        assert_eq!(seen.borrow().len(), 1);

        assert!(!registry.unsubscribe(id));
    }

    #[test]
    fn every_subscriber_sees_each_event() {
        let mut registry = ObserverRegistry::new();
        let count = Rc::new(RefCell::new(0));
        for _ in 0..3 {
            let sink = Rc::clone(&count);
            registry.subscribe(Box::new(move |_| {
                *sink.borrow_mut() += 1;
            }));
        }
        registry.emit(&DocumentEvent::LayoutReflowNeeded);
        assert_eq!(*count.borrow(), 3);
    }
}
