//! Desktop notifications for text messages.

use crate::config::PluginSpec;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::types::MessageType;

use super::{Plugin, ShellCommand};

const DEFAULT_COMMAND: &str = r#"notify-send "$KINDLING_EVENT_SUBDOMAIN/$KINDLING_EVENT_ROOM" "$KINDLING_EVENT_BODY""#;

/// Runs `command` (default `notify-send`) for `TextMessage`s, filtered by
/// `keywords` when given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Notify;

impl Plugin for Notify {
    fn name(&self) -> &str {
        "notify"
    }

    fn register(&self, spec: &PluginSpec, dispatcher: &mut Dispatcher) -> Result<()> {
        let command = spec.option_str("command")?.unwrap_or(DEFAULT_COMMAND);
        let keywords = spec.option_list("keywords")?;
        dispatcher.on(
            MessageType::TextMessage,
            "notify",
            ShellCommand::new(command).with_keywords(keywords),
        );
        Ok(())
    }
}
