//! Declarative configuration.
//!
//! kindling reads a YAML file describing accounts, rooms, the default room,
//! daemon settings, plugin activations, and command handlers. Nothing in the
//! file is executed at load time.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that overrides the configuration path.
pub const CONFIG_ENV: &str = "KINDLING_CONFIG";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Template written by `kindling setup`.
pub const TEMPLATE: &str = r#"# kindling configuration
#
# Each account is one Campfire subdomain. Rooms are listed by name; add an
# `id` to skip the room lookup on first use.
accounts:
  - subdomain: example
    token: YOUR_API_TOKEN
    ssl: true
    rooms:
      - watercooler
      - name: ops
        id: 12345

# Room used when `say`/`paste` are given no subdomain= and room=.
default:
  subdomain: example
  room: watercooler

daemon:
  poll_interval_secs: 5
  max_retries: 3
  # pid_file: /path/to/kindling.pid
  # log_file: /path/to/kindling.log

# Built-in plugins: echo, sound, notify.
plugins:
  - name: echo
  # - name: notify
  #   keywords: [example]

# Shell commands run for matching events. `on` is a message type or `*`.
handlers: []
  # - on: TextMessage
  #   run: 'echo "$KINDLING_EVENT_ROOM: $KINDLING_EVENT_BODY" >> ~/campfire.txt'
"#;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configured accounts.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Room used when a command names none.
    #[serde(default)]
    pub default: Option<DefaultRoom>,

    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Plugins to activate, in order.
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,

    /// Shell command handlers, in order.
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
}

/// One Campfire account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account subdomain, e.g. `acme` for `acme.campfirenow.com`.
    pub subdomain: String,

    /// API token.
    pub token: String,

    /// Use HTTPS.
    #[serde(default = "default_ssl")]
    pub ssl: bool,

    /// Override the service URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Rooms to use on this account.
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

/// A room entry: either a bare name or a name with a known id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomConfig {
    /// Just the name.
    Name(String),
    /// Name plus optional numeric id.
    Detailed {
        /// Room name.
        name: String,
        /// Room id, if known.
        #[serde(default)]
        id: Option<u64>,
    },
}

impl RoomConfig {
    /// The room name.
    pub fn name(&self) -> &str {
        match self {
            RoomConfig::Name(name) => name,
            RoomConfig::Detailed { name, .. } => name,
        }
    }

    /// The room id, if configured.
    pub fn id(&self) -> Option<u64> {
        match self {
            RoomConfig::Name(_) => None,
            RoomConfig::Detailed { id, .. } => *id,
        }
    }
}

/// The default room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRoom {
    /// Account subdomain.
    pub subdomain: String,
    /// Room name.
    pub room: String,
}

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// Pid file location.
    pub pid_file: Option<PathBuf>,
    /// Log file location.
    pub log_file: Option<PathBuf>,
    /// Retries for retryable API failures.
    pub max_retries: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            pid_file: None,
            log_file: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl DaemonConfig {
    /// Interval between poll cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Configured pid file, or `kindling.pid` in the state directory.
    pub fn pid_file_path(&self) -> PathBuf {
        self.pid_file
            .clone()
            .unwrap_or_else(|| state_dir().join("kindling.pid"))
    }

    /// Configured log file, or `kindling.log` in the state directory.
    pub fn log_file_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| state_dir().join("kindling.log"))
    }
}

/// Activation of one plugin with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Registry name of the plugin.
    pub name: String,

    /// Remaining keys, interpreted by the plugin.
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl PluginSpec {
    /// A spec with no options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    /// Add an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// A string option.
    pub fn option_str(&self, key: &str) -> Result<Option<&str>> {
        match self.options.get(key) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(serde_yaml::Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(Error::config(format!(
                "plugin {}: option {key} must be a string",
                self.name
            ))),
        }
    }

    /// A list-of-strings option; a single string is accepted as a one-item list.
    pub fn option_list(&self, key: &str) -> Result<Vec<String>> {
        match self.options.get(key) {
            None | Some(serde_yaml::Value::Null) => Ok(Vec::new()),
            Some(serde_yaml::Value::String(value)) => Ok(vec![value.clone()]),
            Some(serde_yaml::Value::Sequence(values)) => values
                .iter()
                .map(|value| match value {
                    serde_yaml::Value::String(s) => Ok(s.clone()),
                    _ => Err(Error::config(format!(
                        "plugin {}: option {key} must list strings",
                        self.name
                    ))),
                })
                .collect(),
            Some(_) => Err(Error::config(format!(
                "plugin {}: option {key} must be a list of strings",
                self.name
            ))),
        }
    }
}

/// A shell command bound to an event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSpec {
    /// Message type name, or `*` for every event.
    pub on: String,
    /// Command run through `sh -c`.
    pub run: String,
}

fn default_ssl() -> bool {
    true
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config_missing(path));
        }
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}: {e}", path.display()), e))?;
        Self::from_yaml(&yaml)
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.subdomain.trim().is_empty() {
                return Err(Error::config("account subdomain must not be empty"));
            }
            if account.token.trim().is_empty() {
                return Err(Error::config(format!(
                    "account {} has an empty token",
                    account.subdomain
                )));
            }
            if !seen.insert(account.subdomain.as_str()) {
                return Err(Error::config(format!(
                    "account {} is configured twice",
                    account.subdomain
                )));
            }
            let mut rooms = HashSet::new();
            for room in &account.rooms {
                if room.name().trim().is_empty() {
                    return Err(Error::config(format!(
                        "account {} has a room with an empty name",
                        account.subdomain
                    )));
                }
                if !rooms.insert(room.name()) {
                    return Err(Error::config(format!(
                        "room {}/{} is configured twice",
                        account.subdomain,
                        room.name()
                    )));
                }
            }
        }
        if let Some(default) = &self.default {
            let account = self
                .account(&default.subdomain)
                .ok_or_else(|| {
                    Error::config(format!(
                        "default names unknown account {}",
                        default.subdomain
                    ))
                })?;
            if !account.rooms.iter().any(|r| r.name() == default.room) {
                return Err(Error::config(format!(
                    "default names unknown room {}/{}",
                    default.subdomain, default.room
                )));
            }
        }
        if self.daemon.poll_interval_secs == 0 {
            return Err(Error::config("daemon.poll_interval_secs must be positive"));
        }
        for handler in &self.handlers {
            if handler.run.trim().is_empty() {
                return Err(Error::config(format!(
                    "handler for {} has an empty command",
                    handler.on
                )));
            }
        }
        Ok(())
    }

    /// Look up an account by subdomain.
    pub fn account(&self, subdomain: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.subdomain == subdomain)
    }

    /// The configured default, or the first room of the first account.
    pub fn default_room(&self) -> Option<DefaultRoom> {
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        self.accounts.iter().find_map(|account| {
            account.rooms.first().map(|room| DefaultRoom {
                subdomain: account.subdomain.clone(),
                room: room.name().to_string(),
            })
        })
    }
}

/// Resolve the configuration path.
///
/// An explicit path wins, then `$KINDLING_CONFIG`, then
/// `<config dir>/kindling/config.yaml`.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("kindling").join("config.yaml"))
        .ok_or_else(|| Error::config(format!("cannot locate a config directory; set {CONFIG_ENV}")))
}

/// Directory holding the pid and log files by default.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .map(|dir| dir.join("kindling"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".kindling")))
        .unwrap_or_else(|| PathBuf::from("/tmp/kindling"))
}

/// Write [`TEMPLATE`] to `path`, refusing to replace an existing file.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::validation(
            format!("{} already exists; edit it instead", path.display()),
            Some("config".to_string()),
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TEMPLATE)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
accounts:
  - subdomain: acme
    token: abc
    rooms:
      - watercooler
      - name: ops
        id: 42
  - subdomain: widgets
    token: def
    ssl: false
    base_url: http://localhost:3000
    rooms: [lobby]
default:
  subdomain: acme
  room: ops
daemon:
  poll_interval_secs: 10
plugins:
  - name: notify
    keywords: [robert, deploy]
    command: notify-send
handlers:
  - on: TextMessage
    run: echo hi
"#;

    #[test]
    fn parses_full_document() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.accounts.len(), 2);
        let acme = config.account("acme").unwrap();
        assert!(acme.ssl);
        assert_eq!(acme.rooms[0], RoomConfig::Name("watercooler".to_string()));
        assert_eq!(acme.rooms[1].name(), "ops");
        assert_eq!(acme.rooms[1].id(), Some(42));
        let widgets = config.account("widgets").unwrap();
        assert!(!widgets.ssl);
        assert_eq!(widgets.base_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.daemon.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.daemon.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(
            config.default_room(),
            Some(DefaultRoom {
                subdomain: "acme".to_string(),
                room: "ops".to_string()
            })
        );
        assert_eq!(config.plugins[0].name, "notify");
        assert_eq!(
            config.plugins[0].option_list("keywords").unwrap(),
            vec!["robert".to_string(), "deploy".to_string()]
        );
        assert_eq!(
            config.plugins[0].option_str("command").unwrap(),
            Some("notify-send")
        );
        assert_eq!(config.handlers[0].on, "TextMessage");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.accounts.is_empty());
        assert_eq!(config.daemon, DaemonConfig::default());
        assert_eq!(config.default_room(), None);
    }

    #[test]
    fn default_room_falls_back_to_first_room() {
        let config = Config::from_yaml(
            "accounts:\n  - subdomain: acme\n    token: t\n    rooms: [one, two]\n",
        )
        .unwrap();
        let default = config.default_room().unwrap();
        assert_eq!(default.subdomain, "acme");
        assert_eq!(default.room, "one");
    }

    #[test]
    fn rejects_duplicate_subdomains() {
        let err = Config::from_yaml(
            "accounts:\n  - {subdomain: acme, token: a}\n  - {subdomain: acme, token: b}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn rejects_empty_token() {
        assert!(Config::from_yaml("accounts:\n  - {subdomain: acme, token: ''}\n").is_err());
    }

    #[test]
    fn rejects_unknown_default() {
        let err = Config::from_yaml(
            "accounts:\n  - {subdomain: acme, token: a, rooms: [lobby]}\ndefault: {subdomain: acme, room: attic}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("acme/attic"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        assert!(Config::from_yaml("daemon: {poll_interval_secs: 0}\n").is_err());
    }

    #[test]
    fn option_type_errors() {
        let spec = PluginSpec::named("sound").with_option("keywords", 5);
        assert!(spec.option_list("keywords").is_err());
        assert!(spec.option_str("keywords").is_err());
        assert_eq!(spec.option_str("missing").unwrap(), None);
        let spec = PluginSpec::named("sound").with_option("keywords", "deploy");
        assert_eq!(spec.option_list("keywords").unwrap(), vec!["deploy"]);
    }

    #[test]
    fn template_is_valid() {
        let config = Config::from_yaml(TEMPLATE).unwrap();
        assert_eq!(config.accounts[0].subdomain, "example");
        assert_eq!(config.plugins[0].name, "echo");
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.is_config_missing());
    }

    #[test]
    fn write_template_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        write_template(&path).unwrap();
        assert!(Config::load(&path).is_ok());
        assert!(write_template(&path).unwrap_err().is_validation());
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/etc/kindling.yaml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/kindling.yaml"));
    }
}
