//! Shell commands as event handlers.

use std::process::{Command, Stdio};

use time::format_description::well_known::Rfc3339;

use crate::config::HandlerSpec;
use crate::dispatch::{Dispatcher, Handler};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::types::MessageType;

/// Runs `sh -c <command>` for each event it receives.
///
/// The event is passed in the environment as `KINDLING_EVENT_KIND`,
/// `KINDLING_EVENT_SUBDOMAIN`, `KINDLING_EVENT_ROOM`, `KINDLING_EVENT_BODY`,
/// `KINDLING_EVENT_MESSAGE_ID`, `KINDLING_EVENT_USER_ID`, and
/// `KINDLING_EVENT_CREATED_AT`. A non-zero exit is a handler error.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
    keywords: Vec<String>,
}

impl ShellCommand {
    /// Run `command` for every event.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            keywords: Vec::new(),
        }
    }

    /// Only run for events whose body mentions one of `keywords`.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// The command line.
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Handler for ShellCommand {
    fn handle(&mut self, event: &Event) -> Result<()> {
        if !event.mentions_any(&self.keywords) {
            return Ok(());
        }
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .envs(event_env(event))
            .stdin(Stdio::null())
            .status()
            .map_err(|e| Error::handler(format!("spawning `{}`: {e}", self.command)))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::handler(format!("`{}` exited with {status}", self.command)))
        }
    }
}

/// Environment describing `event` for child processes.
pub fn event_env(event: &Event) -> Vec<(&'static str, String)> {
    vec![
        ("KINDLING_EVENT_KIND", event.kind.to_string()),
        ("KINDLING_EVENT_SUBDOMAIN", event.subdomain.clone()),
        ("KINDLING_EVENT_ROOM", event.room.clone()),
        ("KINDLING_EVENT_BODY", event.text().to_string()),
        ("KINDLING_EVENT_MESSAGE_ID", event.message_id.to_string()),
        (
            "KINDLING_EVENT_USER_ID",
            event.user_id.map(|id| id.to_string()).unwrap_or_default(),
        ),
        (
            "KINDLING_EVENT_CREATED_AT",
            event.created_at.format(&Rfc3339).unwrap_or_default(),
        ),
    ]
}

/// Register each `handlers:` entry: `*` as a listener, anything else as a
/// handler for that message type.
pub fn install_handlers(specs: &[HandlerSpec], dispatcher: &mut Dispatcher) -> Result<()> {
    for spec in specs {
        let label = format!("handler:{}", spec.run);
        let handler = ShellCommand::new(spec.run.clone());
        if spec.on.trim() == "*" {
            dispatcher.listen(label, handler);
        } else {
            let kind: MessageType = spec
                .on
                .parse()
                .map_err(|e| Error::config(format!("handler `on: {}`: {e}", spec.on)))?;
            dispatcher.on(kind, label, handler);
        }
    }
    Ok(())
}
