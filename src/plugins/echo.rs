//! Logs every event.

use crate::config::PluginSpec;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::event::Event;

use super::Plugin;

/// Logs each event at `info` with its location and body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Plugin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn register(&self, _: &PluginSpec, dispatcher: &mut Dispatcher) -> Result<()> {
        dispatcher.listen("echo", |event: &Event| -> Result<()> {
            tracing::info!(
                subdomain = %event.subdomain,
                room = %event.room,
                kind = %event.kind,
                message_id = event.message_id,
                body = event.text(),
                "event"
            );
            Ok(())
        });
        Ok(())
    }
}
