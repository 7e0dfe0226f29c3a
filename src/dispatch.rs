//! Ordered publish/subscribe for room events.
//!
//! Handlers are registered either for one [`MessageType`] or as catch-all
//! listeners. [`Dispatcher::dispatch`] calls every handler registered for the
//! event's type, in registration order, and then every listener, in
//! registration order. Everything runs synchronously on the caller's thread.
//!
//! A failing handler does not stop dispatch: its error is logged and
//! recorded in the returned [`DispatchReport`], and the remaining handlers
//! still run.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::observability::{EVENTS_DISPATCHED, HANDLER_CALLS, HANDLER_ERRORS};
use crate::types::MessageType;

/// Something that reacts to events.
///
/// Implemented for every `FnMut(&Event) -> Result<()> + Send` closure.
pub trait Handler: Send {
    /// React to one event.
    fn handle(&mut self, event: &Event) -> Result<()>;
}

impl<F> Handler for F
where
    F: FnMut(&Event) -> Result<()> + Send,
{
    fn handle(&mut self, event: &Event) -> Result<()> {
        self(event)
    }
}

struct Registration {
    label: String,
    handler: Box<dyn Handler>,
}

/// A handler that returned an error during dispatch.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Label the handler was registered with.
    pub label: String,
    /// The error it returned.
    pub error: Error,
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// How many handlers were invoked.
    pub invoked: usize,
    /// Handlers that failed, in invocation order.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// True when every invoked handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of typed handlers and catch-all listeners.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageType, Vec<Registration>>,
    listeners: Vec<Registration>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on(
        &mut self,
        kind: MessageType,
        label: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> &mut Self {
        self.handlers.entry(kind).or_default().push(Registration {
            label: label.into(),
            handler: Box::new(handler),
        });
        self
    }

    /// Register `handler` for every event.
    pub fn listen(&mut self, label: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        self.listeners.push(Registration {
            label: label.into(),
            handler: Box::new(handler),
        });
        self
    }

    /// Number of handlers registered for `kind`, not counting listeners.
    pub fn handler_count(&self, kind: MessageType) -> usize {
        self.handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Number of catch-all listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// True when nothing is registered at all.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.handlers.values().all(Vec::is_empty)
    }

    /// Deliver `event` to its typed handlers, then to every listener.
    pub fn dispatch(&mut self, event: &Event) -> DispatchReport {
        EVENTS_DISPATCHED.click();
        let mut report = DispatchReport::default();
        let typed = self
            .handlers
            .get_mut(&event.kind)
            .into_iter()
            .flat_map(|registrations| registrations.iter_mut());
        for registration in typed.chain(self.listeners.iter_mut()) {
            HANDLER_CALLS.click();
            report.invoked += 1;
            if let Err(error) = registration.handler.handle(event) {
                HANDLER_ERRORS.click();
                tracing::warn!(
                    handler = %registration.label,
                    kind = %event.kind,
                    room = %event.location(),
                    error = %error,
                    "event handler failed"
                );
                report.failures.push(HandlerFailure {
                    label: registration.label.clone(),
                    error,
                });
            }
        }
        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<(String, Vec<&str>)> = self
            .handlers
            .iter()
            .map(|(kind, regs)| {
                (
                    kind.to_string(),
                    regs.iter().map(|r| r.label.as_str()).collect(),
                )
            })
            .collect();
        handlers.sort();
        f.debug_struct("Dispatcher")
            .field("handlers", &handlers)
            .field(
                "listeners",
                &self
                    .listeners
                    .iter()
                    .map(|r| r.label.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::test_event;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> impl Handler + 'static {
        let log = Arc::clone(log);
        let name = name.to_string();
        move |event: &Event| -> Result<()> {
            log.lock().unwrap().push(format!("{name}:{}", event.kind));
            Ok(())
        }
    }

    #[test]
    fn typed_handlers_run_in_registration_order_then_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .listen("all-1", recorder(&log, "all-1"))
            .on(MessageType::TextMessage, "text-1", recorder(&log, "text-1"))
            .on(MessageType::PasteMessage, "paste", recorder(&log, "paste"))
            .on(MessageType::TextMessage, "text-2", recorder(&log, "text-2"))
            .listen("all-2", recorder(&log, "all-2"));

        let report = dispatcher.dispatch(&test_event(MessageType::TextMessage, Some("hi")));
        assert_eq!(report.invoked, 4);
        assert!(report.is_clean());
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "text-1:TextMessage",
                "text-2:TextMessage",
                "all-1:TextMessage",
                "all-2:TextMessage",
            ]
        );
    }

    #[test]
    fn each_handler_runs_exactly_once_per_event() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .on(MessageType::EnterMessage, "enter", recorder(&log, "enter"))
            .listen("all", recorder(&log, "all"));

        dispatcher.dispatch(&test_event(MessageType::EnterMessage, None));
        dispatcher.dispatch(&test_event(MessageType::LeaveMessage, None));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter:EnterMessage", "all:EnterMessage", "all:LeaveMessage"]
        );
    }

    #[test]
    fn failing_handler_does_not_stop_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .on(MessageType::TextMessage, "broken", |_: &Event| -> Result<()> {
                Err(Error::handler("boom"))
            })
            .on(MessageType::TextMessage, "after", recorder(&log, "after"))
            .listen("all", recorder(&log, "all"));

        let report = dispatcher.dispatch(&test_event(MessageType::TextMessage, Some("x")));
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "broken");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["after:TextMessage", "all:TextMessage"]
        );
    }

    #[test]
    fn empty_dispatcher_invokes_nothing() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.is_empty());
        let report = dispatcher.dispatch(&test_event(MessageType::SoundMessage, None));
        assert_eq!(report.invoked, 0);
        assert_eq!(dispatcher.handler_count(MessageType::SoundMessage), 0);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn stateful_handlers_keep_state() {
        let mut dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let mut calls = 0usize;
        dispatcher.listen("counter", move |_: &Event| -> Result<()> {
            calls += 1;
            *counter.lock().unwrap() = calls;
            Ok(())
        });
        for _ in 0..3 {
            dispatcher.dispatch(&test_event(MessageType::TextMessage, None));
        }
        assert_eq!(*seen.lock().unwrap(), 3);
    }
}
