//! Observation sidecar: buffers everything a page reports while a test runs
//!
//! The sidecar must be attached before the page navigates. Events emitted
//! before attachment (including exceptions thrown while the document loads)
//! are never delivered, so an empty buffer only means "nothing observed".

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::events::ObservedEvent;
use crate::target::{EventListener, Target};

/// Per-test buffer of observed events
#[derive(Clone, Default)]
pub struct ObservationSidecar {
    buffer: Arc<Mutex<Vec<ObservedEvent>>>,
}

impl ObservationSidecar {
    /// Create a sidecar and register it on `target`
    pub fn attach(target: &dyn Target) -> Self {
        let sidecar = Self::default();
        sidecar.attach_again(target);
        sidecar
    }

    /// Register this sidecar's buffer on another (or the same) target.
    ///
    /// Listeners stack: attaching twice to one target records every event
    /// twice.
    pub fn attach_again(&self, target: &dyn Target) {
        target.add_listener(self.listener());
    }

    fn listener(&self) -> EventListener {
        let buffer = Arc::clone(&self.buffer);
        Arc::new(move |event: ObservedEvent| {
            trace!("observed {}", event);
            buffer.lock().push(event);
        })
    }

    /// Every captured event, in arrival order
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.buffer.lock().clone()
    }

    /// Uncaught exceptions and console errors, in arrival order
    pub fn errors(&self) -> Vec<ObservedEvent> {
        self.buffer
            .lock()
            .iter()
            .filter(|e| e.is_error())
            .cloned()
            .collect()
    }

    /// Native dialogs, in arrival order
    pub fn dialogs(&self) -> Vec<ObservedEvent> {
        self.buffer
            .lock()
            .iter()
            .filter(|e| e.is_dialog())
            .cloned()
            .collect()
    }

    /// Return the events matching `predicate`, removing them from the buffer
    /// when `drain` is set. Non-matching events keep their relative order.
    pub fn consume<F>(&self, predicate: F, drain: bool) -> Vec<ObservedEvent>
    where
        F: Fn(&ObservedEvent) -> bool,
    {
        let mut buffer = self.buffer.lock();
        if !drain {
            return buffer.iter().filter(|e| predicate(e)).cloned().collect();
        }

        let (matched, kept): (Vec<_>, Vec<_>) = buffer.drain(..).partition(|e| predicate(e));
        *buffer = kept;
        matched
    }

    /// Clear the buffer between phases of a single test
    pub fn reset(&self) {
        self.buffer.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl std::fmt::Debug for ObservationSidecar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationSidecar")
            .field("events", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ConsoleLevel, DialogKind};

    fn feed(sidecar: &ObservationSidecar, events: &[ObservedEvent]) {
        let listener = sidecar.listener();
        for event in events {
            listener(event.clone());
        }
    }

    #[test]
    fn test_consume_without_drain_keeps_buffer() {
        let sidecar = ObservationSidecar::default();
        feed(
            &sidecar,
            &[
                ObservedEvent::console(ConsoleLevel::Log, "ready"),
                ObservedEvent::dialog(DialogKind::Alert, "empty input"),
            ],
        );

        let dialogs = sidecar.consume(ObservedEvent::is_dialog, false);
        assert_eq!(dialogs.len(), 1);
        assert_eq!(sidecar.len(), 2);
    }

    #[test]
    fn test_consume_with_drain_preserves_remaining_order() {
        let sidecar = ObservationSidecar::default();
        feed(
            &sidecar,
            &[
                ObservedEvent::console(ConsoleLevel::Log, "a"),
                ObservedEvent::dialog(DialogKind::Alert, "first"),
                ObservedEvent::console(ConsoleLevel::Error, "b"),
                ObservedEvent::dialog(DialogKind::Confirm, "second"),
                ObservedEvent::console(ConsoleLevel::Log, "c"),
            ],
        );

        let dialogs = sidecar.consume(ObservedEvent::is_dialog, true);
        assert_eq!(
            dialogs.iter().map(|e| e.message()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        assert_eq!(
            sidecar.events().iter().map(|e| e.message()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(sidecar.errors().len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let sidecar = ObservationSidecar::default();
        feed(&sidecar, &[ObservedEvent::exception("Error", "x")]);
        assert!(!sidecar.is_empty());
        sidecar.reset();
        assert!(sidecar.is_empty());
        assert!(sidecar.errors().is_empty());
    }
}
