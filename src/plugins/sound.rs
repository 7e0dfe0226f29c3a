//! Plays a sound for sound messages and keyword mentions.

use crate::config::PluginSpec;
use crate::dispatch::{Dispatcher, Handler};
use crate::error::Result;
use crate::event::Event;
use crate::types::MessageType;

use super::{Plugin, ShellCommand};

/// Runs `player` on every `SoundMessage`, and on `TextMessage`s mentioning
/// any of `keywords` when keywords are given.
///
/// Without a `player` the sound is only logged; a detached daemon has no
/// terminal to ring.
///
/// ```yaml
/// plugins:
///   - name: sound
///     player: paplay /usr/share/sounds/freedesktop/stereo/bell.oga
///     keywords: [deploy]
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Sound;

impl Plugin for Sound {
    fn name(&self) -> &str {
        "sound"
    }

    fn register(&self, spec: &PluginSpec, dispatcher: &mut Dispatcher) -> Result<()> {
        let player = spec.option_str("player")?;
        let keywords = spec.option_list("keywords")?;
        match player {
            Some(player) => {
                dispatcher.on(MessageType::SoundMessage, "sound", ShellCommand::new(player));
                if !keywords.is_empty() {
                    dispatcher.on(
                        MessageType::TextMessage,
                        "sound:keywords",
                        ShellCommand::new(player).with_keywords(keywords),
                    );
                }
            }
            None => {
                dispatcher.on(MessageType::SoundMessage, "sound", logged(Vec::new()));
                if !keywords.is_empty() {
                    dispatcher.on(MessageType::TextMessage, "sound:keywords", logged(keywords));
                }
            }
        }
        Ok(())
    }
}

fn logged(keywords: Vec<String>) -> impl Handler + 'static {
    move |event: &Event| -> Result<()> {
        if event.mentions_any(&keywords) {
            tracing::info!(room = %event.location(), body = %event.text(), "sound");
        }
        Ok(())
    }
}
