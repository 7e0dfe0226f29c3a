//! The poll loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::dispatch::Dispatcher;
use crate::event::Event;
use crate::observability::{POLL_CYCLES, POLL_ERRORS, POLL_SKIPPED};
use crate::session::PollTarget;
use crate::types::MessageId;

const MAX_SKIP_CYCLES: u32 = 32;

/// Cooperative stop request, shared between the signal handler and the loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after its current cycle.
    ///
    /// Safe to call from any thread, including a signal handler thread.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether [`StopSignal::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once stop has been requested.
    pub async fn wait(&self) {
        while !self.is_stopped() {
            self.notify.notified().await;
        }
    }
}

/// Per-room failure backoff.
///
/// After `k` consecutive failures the room sits out `min(2^(k-1), 32)`
/// cycles. A disabled room is never polled again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backoff {
    failures: u32,
    skip: u32,
    disabled: bool,
}

impl Backoff {
    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the room has been disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Record a failed poll.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        let exponent = self.failures.saturating_sub(1).min(31);
        self.skip = (1u32 << exponent).min(MAX_SKIP_CYCLES);
    }

    /// Record a successful poll.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.skip = 0;
    }

    /// Stop polling this room.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    /// Whether this cycle should be skipped; consumes one skipped cycle.
    pub fn should_skip(&mut self) -> bool {
        if self.disabled {
            return true;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return true;
        }
        false
    }
}

#[derive(Debug)]
struct RoomPoll {
    target: PollTarget,
    cursor: Option<MessageId>,
    primed: bool,
    backoff: Backoff,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Rooms polled successfully.
    pub polled: usize,
    /// Rooms skipped for backoff or because they are disabled.
    pub skipped: usize,
    /// Rooms whose poll failed.
    pub errors: usize,
    /// Events dispatched.
    pub events: usize,
    /// Events that had at least one failing handler.
    pub handler_failures: usize,
}

/// Polls every room in order and feeds new messages to a dispatcher.
#[derive(Debug)]
pub struct Poller {
    rooms: Vec<RoomPoll>,
    interval: Duration,
}

impl Poller {
    /// A poller over `targets`, cycling every `interval`.
    pub fn new(targets: Vec<PollTarget>, interval: Duration) -> Self {
        let rooms = targets
            .into_iter()
            .map(|target| RoomPoll {
                target,
                cursor: None,
                primed: false,
                backoff: Backoff::default(),
            })
            .collect();
        Self { rooms, interval }
    }

    /// The cursor for `subdomain/room`.
    pub fn cursor(&self, location: &str) -> Option<MessageId> {
        self.room(location).and_then(|room| room.cursor)
    }

    /// Backoff state for `subdomain/room`.
    pub fn backoff(&self, location: &str) -> Option<&Backoff> {
        self.room(location).map(|room| &room.backoff)
    }

    fn room(&self, location: &str) -> Option<&RoomPoll> {
        self.rooms
            .iter()
            .find(|room| room.target.location() == location)
    }

    /// Poll each room once.
    ///
    /// A room's first successful poll only records its cursor. Errors are
    /// logged and charged to that room's backoff; an authentication failure
    /// disables the room.
    pub async fn poll_once(&mut self, dispatcher: &mut Dispatcher) -> CycleReport {
        POLL_CYCLES.click();
        let mut report = CycleReport::default();
        for room in &mut self.rooms {
            if room.backoff.should_skip() {
                POLL_SKIPPED.click();
                report.skipped += 1;
                continue;
            }
            let target = &room.target;
            match target.client.poll_events(&target.room, room.cursor).await {
                Ok((messages, cursor)) => {
                    room.backoff.record_success();
                    report.polled += 1;
                    room.cursor = cursor;
                    if !room.primed {
                        room.primed = true;
                        tracing::info!(
                            subdomain = %target.subdomain,
                            room = %target.room,
                            cursor = ?cursor,
                            "watching room"
                        );
                        continue;
                    }
                    for message in &messages {
                        let event = Event::from_message(&target.subdomain, &target.room, message);
                        let outcome = dispatcher.dispatch(&event);
                        report.events += 1;
                        if !outcome.is_clean() {
                            report.handler_failures += 1;
                        }
                    }
                }
                Err(err) => {
                    POLL_ERRORS.click();
                    report.errors += 1;
                    if err.is_authentication() {
                        room.backoff.disable();
                        tracing::error!(
                            subdomain = %target.subdomain,
                            room = %target.room,
                            error = %err,
                            "authentication failed; room disabled until restart"
                        );
                    } else {
                        room.backoff.record_failure();
                        tracing::warn!(
                            subdomain = %target.subdomain,
                            room = %target.room,
                            error = %err,
                            failures = room.backoff.failures(),
                            "poll failed"
                        );
                    }
                }
            }
        }
        report
    }

    /// Cycle until `stop` fires.
    ///
    /// A cycle in progress always completes; the stop signal only cuts the
    /// sleep between cycles short.
    pub async fn run(&mut self, dispatcher: &mut Dispatcher, stop: &StopSignal) {
        while !stop.is_stopped() {
            let report = self.poll_once(dispatcher).await;
            tracing::debug!(
                polled = report.polled,
                skipped = report.skipped,
                errors = report.errors,
                events = report.events,
                "poll cycle"
            );
            if stop.is_stopped() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.wait() => {}
            }
        }
    }
}
