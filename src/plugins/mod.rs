//! Built-in plugins and the registry that activates them from configuration.
//!
//! A plugin turns one [`PluginSpec`] into handler registrations on a
//! [`Dispatcher`]. Plugins are looked up by name in a [`PluginRegistry`];
//! nothing is discovered from the filesystem.

pub mod command;
pub mod echo;
pub mod notify;
pub mod sound;

use std::collections::BTreeMap;

use crate::config::{Config, PluginSpec};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};

pub use command::ShellCommand;

/// A named bundle of event handlers.
pub trait Plugin: Send + Sync {
    /// Registry name, matched against `plugins[].name` in the configuration.
    fn name(&self) -> &str;

    /// Register this plugin's handlers, configured by `spec`.
    fn register(&self, spec: &PluginSpec, dispatcher: &mut Dispatcher) -> Result<()>;
}

/// Plugins available to the configuration, keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// A registry with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `echo`, `sound`, and `notify`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(echo::Echo);
        registry.register(sound::Sound);
        registry.register(notify::Notify);
        registry
    }

    /// Add `plugin`, replacing any plugin of the same name.
    pub fn register(&mut self, plugin: impl Plugin + 'static) -> &mut Self {
        self.plugins
            .insert(plugin.name().to_string(), Box::new(plugin));
        self
    }

    /// Look up a plugin.
    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name).map(|plugin| plugin.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Activate every configured plugin and shell handler on `dispatcher`.
///
/// Plugins are registered in configuration order, followed by the
/// `handlers:` entries.
pub fn install(config: &Config, registry: &PluginRegistry, dispatcher: &mut Dispatcher) -> Result<()> {
    for spec in &config.plugins {
        let plugin = registry.get(&spec.name).ok_or_else(|| {
            Error::config(format!(
                "unknown plugin {}; available: {}",
                spec.name,
                registry.names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        plugin.register(spec, dispatcher)?;
        tracing::debug!(plugin = %spec.name, "plugin registered");
    }
    command::install_handlers(&config.handlers, dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    #[test]
    fn builtin_names() {
        let registry = PluginRegistry::builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["echo", "notify", "sound"]
        );
        assert!(registry.get("echo").is_some());
        assert!(registry.get("campfire-bot").is_none());
    }

    #[test]
    fn install_registers_plugins_then_handlers() {
        let config = Config::from_yaml(
            r#"
plugins:
  - name: echo
  - name: sound
handlers:
  - on: EnterMessage
    run: "true"
  - on: "*"
    run: "true"
"#,
        )
        .unwrap();
        let mut dispatcher = Dispatcher::new();
        install(&config, &PluginRegistry::builtin(), &mut dispatcher).unwrap();
        assert_eq!(dispatcher.listener_count(), 2);
        assert_eq!(dispatcher.handler_count(MessageType::SoundMessage), 1);
        assert_eq!(dispatcher.handler_count(MessageType::EnterMessage), 1);
    }

    #[test]
    fn unknown_plugin_is_config_error() {
        let config = Config::from_yaml("plugins:\n  - name: growl\n").unwrap();
        let mut dispatcher = Dispatcher::new();
        let err = install(&config, &PluginRegistry::builtin(), &mut dispatcher).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("growl"));
        assert!(dispatcher.is_empty());
    }
}
