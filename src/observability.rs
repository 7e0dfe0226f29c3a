use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("kindling.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("kindling.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("kindling.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("kindling.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("kindling.client.retry_backoff_seconds");

pub(crate) static POLL_CYCLES: Counter = Counter::new("kindling.daemon.poll_cycles");
pub(crate) static POLL_ERRORS: Counter = Counter::new("kindling.daemon.poll_errors");
pub(crate) static POLL_SKIPPED: Counter = Counter::new("kindling.daemon.poll_skipped");

pub(crate) static EVENTS_DISPATCHED: Counter = Counter::new("kindling.dispatch.events");
pub(crate) static HANDLER_CALLS: Counter = Counter::new("kindling.dispatch.handler_calls");
pub(crate) static HANDLER_ERRORS: Counter = Counter::new("kindling.dispatch.handler_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&POLL_CYCLES);
    collector.register_counter(&POLL_ERRORS);
    collector.register_counter(&POLL_SKIPPED);

    collector.register_counter(&EVENTS_DISPATCHED);
    collector.register_counter(&HANDLER_CALLS);
    collector.register_counter(&HANDLER_ERRORS);
}
