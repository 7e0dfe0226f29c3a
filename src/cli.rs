//! Command-line frontend.
//!
//! Options are parsed by `arrrg`; everything else on the command line is a
//! free argument. The first free argument names the command. `say` and
//! `paste` then accept leading `subdomain=X` and `room=Y` selectors before
//! their text.

use std::io::Write;
use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;

use crate::config::{self, Config, DaemonConfig};
use crate::daemon::{Daemon, StopSignal};
use crate::error::{Error, Result};
use crate::logging;
use crate::paste::{self, PasteInput, PasteSource, SystemInput};
use crate::plugins::{self, PluginRegistry};
use crate::session::Session;

/// Usage line shown by `--help`.
pub const USAGE: &str = "kindling [OPTIONS] <command> [ARGS]...

Commands:
  say [subdomain=X] [room=Y] TEXT...
  paste [--from SOURCE] [subdomain=X] [room=Y] [TEXT|FILE]
  rooms [SUBDOMAIN]
  account list
  start [--detach BOOL]
  stop
  setup
  log tail|view";

const TAIL_LINES: usize = 20;

/// Command-line options.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct Args {
    /// Configuration file.
    #[arrrg(optional, "Configuration file (default: $KINDLING_CONFIG, then the user config dir)", "PATH")]
    pub config: Option<String>,

    /// Paste source.
    #[arrrg(optional, "paste: read from clip, sel, stdin, file, arg, or auto (default)", "SOURCE")]
    pub from: Option<String>,

    /// Whether `start` detaches.
    #[arrrg(optional, "start: run in the background (default: true)", "BOOL")]
    pub detach: Option<String>,
}

/// An optional `subdomain=`/`room=` selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// Requested subdomain.
    pub subdomain: Option<String>,
    /// Requested room.
    pub room: Option<String>,
}

impl Target {
    /// Strip leading `subdomain=`/`room=` arguments from `args`.
    pub fn take_leading(args: &[String]) -> (Self, &[String]) {
        let mut target = Target::default();
        let mut consumed = 0;
        for arg in args {
            if let Some(value) = arg.strip_prefix("subdomain=") {
                target.subdomain = Some(value.to_string());
            } else if let Some(value) = arg.strip_prefix("room=") {
                target.room = Some(value.to_string());
            } else {
                break;
            }
            consumed += 1;
        }
        (target, &args[consumed..])
    }
}

/// What to do with the daemon log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCommand {
    /// Print the last lines.
    Tail,
    /// Print the whole file.
    View,
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Post a text message.
    Say {
        /// Room selection.
        target: Target,
        /// Message text.
        text: String,
    },
    /// Post a paste.
    Paste {
        /// Room selection.
        target: Target,
        /// Where the body comes from.
        source: PasteSource,
        /// Remaining arguments: text or a filename.
        args: Vec<String>,
    },
    /// List rooms visible to one or all accounts.
    Rooms {
        /// Only this account.
        subdomain: Option<String>,
    },
    /// List configured accounts.
    AccountList,
    /// Start the daemon.
    Start {
        /// Run in the background.
        detach: bool,
    },
    /// Stop the daemon.
    Stop,
    /// Write a configuration template.
    Setup,
    /// Show the daemon log.
    Log(LogCommand),
}

impl Command {
    /// Interpret the free arguments, using `args` for command options.
    pub fn parse(args: &Args, free: &[String]) -> Result<Self> {
        let Some((name, rest)) = free.split_first() else {
            return Err(usage_error("missing command"));
        };
        match name.as_str() {
            "say" => {
                let (target, words) = Target::take_leading(rest);
                if words.is_empty() {
                    return Err(Error::validation("say needs some text", Some("text".to_string())));
                }
                Ok(Command::Say {
                    target,
                    text: words.join(" "),
                })
            }
            "paste" => {
                let source = match &args.from {
                    Some(from) => from.parse()?,
                    None => PasteSource::Auto,
                };
                let (target, rest) = Target::take_leading(rest);
                Ok(Command::Paste {
                    target,
                    source,
                    args: rest.to_vec(),
                })
            }
            "rooms" => match rest {
                [] => Ok(Command::Rooms { subdomain: None }),
                [subdomain] => Ok(Command::Rooms {
                    subdomain: Some(subdomain.clone()),
                }),
                _ => Err(usage_error("rooms takes at most one subdomain")),
            },
            "account" => match rest {
                [sub] if sub == "list" => Ok(Command::AccountList),
                _ => Err(usage_error("expected `account list`")),
            },
            "start" => {
                if !rest.is_empty() {
                    return Err(usage_error("start takes no arguments"));
                }
                let detach = match &args.detach {
                    Some(value) => parse_bool(value)?,
                    None => true,
                };
                Ok(Command::Start { detach })
            }
            "stop" if rest.is_empty() => Ok(Command::Stop),
            "setup" if rest.is_empty() => Ok(Command::Setup),
            "log" => match rest {
                [sub] if sub == "tail" => Ok(Command::Log(LogCommand::Tail)),
                [sub] if sub == "view" => Ok(Command::Log(LogCommand::View)),
                _ => Err(usage_error("expected `log tail` or `log view`")),
            },
            "stop" | "setup" => Err(usage_error(&format!("{name} takes no arguments"))),
            other => Err(usage_error(&format!("unknown command {other}"))),
        }
    }
}

fn usage_error(message: &str) -> Error {
    Error::validation(format!("{message}\n\nusage: {USAGE}"), None)
}

/// Parse a boolean option value.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::validation(
            format!("expected true or false, got {value}"),
            Some("detach".to_string()),
        )),
    }
}

/// Run a command that only needs a session.
///
/// `Start`, `Stop`, `Setup`, and `Log` are handled by [`run`] and rejected
/// here.
pub async fn execute(
    command: &Command,
    session: &Session,
    input: &mut dyn PasteInput,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Say { target, text } => {
            let room = session.selected_room(target.subdomain.as_deref(), target.room.as_deref())?;
            let message = room.send(text).await?;
            tracing::info!(room = %room.location(), id = message.id, "message posted");
            Ok(())
        }
        Command::Paste {
            target,
            source,
            args,
        } => {
            let room = session.selected_room(target.subdomain.as_deref(), target.room.as_deref())?;
            let body = paste::read_paste(*source, args, input)?;
            let message = room.paste(&body).await?;
            tracing::info!(room = %room.location(), id = message.id, "paste posted");
            Ok(())
        }
        Command::Rooms { subdomain } => rooms(session, subdomain.as_deref(), out).await,
        Command::AccountList => account_list(session, out),
        other => Err(Error::invalid_state(format!(
            "{other:?} does not run against a session"
        ))),
    }
}

async fn rooms(session: &Session, subdomain: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let accounts: Vec<_> = match subdomain {
        Some(subdomain) => vec![
            session
                .account(subdomain)
                .ok_or_else(|| Error::invalid_room(Some(subdomain.to_string()), None))?,
        ],
        None => session.accounts().collect(),
    };
    for account in accounts {
        for info in account.list_rooms().await? {
            let marker = if account.room(&info.name).is_some() { "*" } else { " " };
            match &info.topic {
                Some(topic) if !topic.is_empty() => writeln!(
                    out,
                    "{marker} {}/{} ({}): {topic}",
                    account.subdomain(),
                    info.name,
                    info.id
                )?,
                _ => writeln!(
                    out,
                    "{marker} {}/{} ({})",
                    account.subdomain(),
                    info.name,
                    info.id
                )?,
            }
        }
    }
    Ok(())
}

fn account_list(session: &Session, out: &mut dyn Write) -> Result<()> {
    for account in session.accounts() {
        let rooms: Vec<&str> = account.rooms().map(|room| room.name()).collect();
        let scheme = if account.ssl() { "https" } else { "http" };
        writeln!(out, "{}\t{scheme}\t{}", account.subdomain(), rooms.join(", "))?;
    }
    if let Ok(room) = session.default_room() {
        writeln!(out, "default\t{}", room.location())?;
    }
    Ok(())
}

/// Write the configuration template to `path`.
pub fn setup(path: &Path, out: &mut dyn Write) -> Result<()> {
    config::write_template(path)?;
    writeln!(
        out,
        "Wrote {}. Add your subdomain and API token, then run `kindling rooms`.",
        path.display()
    )?;
    Ok(())
}

/// Print the daemon log, whole or its tail.
pub fn show_log(path: &Path, which: LogCommand, out: &mut dyn Write) -> Result<()> {
    if !path.exists() {
        return Err(Error::not_found(
            format!("no daemon log at {}", path.display()),
            Some("log".to_string()),
            None,
        ));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading {}: {e}", path.display()), e))?;
    match which {
        LogCommand::View => out.write_all(text.as_bytes())?,
        LogCommand::Tail => {
            for line in logging::tail_lines(&text, TAIL_LINES) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}

/// Daemon settings, or the defaults when no configuration exists yet.
fn daemon_config(path: &Path) -> Result<DaemonConfig> {
    match Config::load(path) {
        Ok(config) => Ok(config.daemon),
        Err(err) if err.is_config_missing() => Ok(DaemonConfig::default()),
        Err(err) => Err(err),
    }
}

/// Parse and run one invocation.
pub async fn run(args: Args, free: Vec<String>) -> Result<()> {
    let command = Command::parse(&args, &free)?;
    let config_path = config::config_path(args.config.as_deref().map(Path::new))?;
    let mut stdout = std::io::stdout().lock();

    match command {
        Command::Start { detach: false } => {
            let config = Config::load(&config_path)?;
            let _guard = logging::init_file(&config.daemon.log_file_path())?;
            run_daemon(&config).await
        }
        command => {
            logging::init_stderr();
            match command {
                Command::Setup => setup(&config_path, &mut stdout),
                Command::Log(which) => {
                    let daemon = daemon_config(&config_path)?;
                    show_log(&daemon.log_file_path(), which, &mut stdout)
                }
                Command::Stop => {
                    let daemon = Daemon::from_config(&daemon_config(&config_path)?);
                    let pid = daemon.stop().await?;
                    writeln!(stdout, "Stopped kindling daemon (pid {pid}).")?;
                    Ok(())
                }
                Command::Start { .. } => {
                    // Load here so configuration errors show up on the terminal.
                    let config = Config::load(&config_path)?;
                    let mut probe = Session::from_config(&config)?;
                    plugins::install(&config, &PluginRegistry::builtin(), probe.dispatcher_mut())?;
                    probe.verify_accounts().await?;
                    let daemon = Daemon::from_config(&config.daemon);
                    let pid = daemon.spawn_detached(&absolute(&config_path)?).await?;
                    writeln!(
                        stdout,
                        "Started kindling daemon (pid {pid}); logging to {}.",
                        config.daemon.log_file_path().display()
                    )?;
                    Ok(())
                }
                command => {
                    let config = Config::load(&config_path)?;
                    let session = Session::from_config(&config)?;
                    execute(&command, &session, &mut SystemInput, &mut stdout).await
                }
            }
        }
    }
}

async fn run_daemon(config: &Config) -> Result<()> {
    let mut session = Session::from_config(config)?;
    plugins::install(config, &PluginRegistry::builtin(), session.dispatcher_mut())?;
    let stop = StopSignal::new();
    let trigger = stop.clone();
    ctrlc::set_handler(move || trigger.stop())
        .map_err(|e| Error::config(format!("installing signal handler: {e}")))?;
    let mut daemon = Daemon::from_config(&config.daemon);
    let result = daemon.run_foreground(&mut session, &stop).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "daemon failed");
    }
    result
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Account;
    use crate::testing::{Call, MockApi};
    use crate::types::RoomInfo;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoInput;

    impl PasteInput for NoInput {
        fn stdin_is_terminal(&self) -> bool {
            true
        }

        fn read_stdin(&mut self) -> Result<String> {
            Ok(String::new())
        }

        fn read_selection(&mut self, _: paste::Selection) -> Result<String> {
            Err(Error::validation("no clipboard", None))
        }
    }

    fn free(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    fn session() -> (Session, Arc<MockApi>) {
        let api = Arc::new(MockApi::new("acme").with_rooms(vec![
            RoomInfo {
                id: 1,
                name: "watercooler".to_string(),
                topic: Some("coffee".to_string()),
                membership_limit: None,
            },
            RoomInfo {
                id: 2,
                name: "archive".to_string(),
                topic: None,
                membership_limit: None,
            },
        ]));
        let mut session = Session::new();
        session
            .add_account(
                Account::new("acme", true, api.clone())
                    .with_room("watercooler", None)
                    .with_room("ops", None),
            )
            .unwrap();
        session.set_default_room("acme", "ops").unwrap();
        (session, api)
    }

    #[test]
    fn parse_say_with_selectors() {
        let command = Command::parse(
            &Args::default(),
            &free(&["say", "subdomain=acme", "room=watercooler", "hi", "there"]),
        )
        .unwrap();
        assert_eq!(
            command,
            Command::Say {
                target: Target {
                    subdomain: Some("acme".to_string()),
                    room: Some("watercooler".to_string()),
                },
                text: "hi there".to_string(),
            }
        );
    }

    #[test]
    fn selectors_only_lead() {
        let command =
            Command::parse(&Args::default(), &free(&["say", "set", "room=lobby"])).unwrap();
        assert_eq!(
            command,
            Command::Say {
                target: Target::default(),
                text: "set room=lobby".to_string(),
            }
        );
    }

    #[test]
    fn parse_paste_and_start_options() {
        let args = Args {
            from: Some("stdin".to_string()),
            detach: Some("false".to_string()),
            ..Args::default()
        };
        assert_eq!(
            Command::parse(&args, &free(&["paste", "room=ops"])).unwrap(),
            Command::Paste {
                target: Target {
                    subdomain: None,
                    room: Some("ops".to_string()),
                },
                source: PasteSource::Stdin,
                args: Vec::new(),
            }
        );
        assert_eq!(
            Command::parse(&args, &free(&["start"])).unwrap(),
            Command::Start { detach: false }
        );
        assert_eq!(
            Command::parse(&Args::default(), &free(&["start"])).unwrap(),
            Command::Start { detach: true }
        );
    }

    #[test]
    fn parse_other_commands() {
        let args = Args::default();
        assert_eq!(
            Command::parse(&args, &free(&["rooms", "acme"])).unwrap(),
            Command::Rooms {
                subdomain: Some("acme".to_string())
            }
        );
        assert_eq!(
            Command::parse(&args, &free(&["account", "list"])).unwrap(),
            Command::AccountList
        );
        assert_eq!(
            Command::parse(&args, &free(&["log", "tail"])).unwrap(),
            Command::Log(LogCommand::Tail)
        );
        assert_eq!(Command::parse(&args, &free(&["stop"])).unwrap(), Command::Stop);
        assert_eq!(Command::parse(&args, &free(&["setup"])).unwrap(), Command::Setup);
    }

    #[test]
    fn parse_errors() {
        let args = Args::default();
        assert!(Command::parse(&args, &[]).is_err());
        assert!(Command::parse(&args, &free(&["say"])).is_err());
        assert!(Command::parse(&args, &free(&["shout", "hi"])).is_err());
        assert!(Command::parse(&args, &free(&["log", "follow"])).is_err());
        assert!(Command::parse(&args, &free(&["stop", "now"])).is_err());
        let bad = Args {
            detach: Some("maybe".to_string()),
            ..Args::default()
        };
        assert!(Command::parse(&bad, &free(&["start"])).is_err());
        let bad = Args {
            from: Some("printer".to_string()),
            ..Args::default()
        };
        assert!(Command::parse(&bad, &free(&["paste", "x"])).is_err());
    }

    #[test]
    fn booleans() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(parse_bool("yes").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("").is_err());
    }

    #[tokio::test]
    async fn say_posts_once_to_selected_room() {
        let (session, api) = session();
        let command = Command::parse(
            &Args::default(),
            &free(&["say", "subdomain=acme", "room=watercooler", "hi"]),
        )
        .unwrap();
        let mut out = Vec::new();
        execute(&command, &session, &mut NoInput, &mut out)
            .await
            .unwrap();
        assert_eq!(
            api.calls(),
            vec![Call::PostMessage {
                room: "watercooler".to_string(),
                body: "hi".to_string()
            }]
        );
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn failed_say_reports_the_error() {
        let (session, api) = session();
        api.fail_posts(Error::server(502, "bad gateway"));
        let command = Command::parse(&Args::default(), &free(&["say", "hi"])).unwrap();
        let mut out = Vec::new();
        let err = execute(&command, &session, &mut NoInput, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Server { status_code: 502, .. }), "{err:?}");
        assert_eq!(api.calls().len(), 1);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn paste_args_go_to_default_room() {
        let (session, api) = session();
        let args = Args {
            from: Some("arg".to_string()),
            ..Args::default()
        };
        let command = Command::parse(&args, &free(&["paste", "fn", "main()"])).unwrap();
        execute(&command, &session, &mut NoInput, &mut Vec::new())
            .await
            .unwrap();
        assert_eq!(
            api.calls(),
            vec![Call::PostPaste {
                room: "ops".to_string(),
                body: "fn main()".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn unknown_room_posts_nothing() {
        let (session, api) = session();
        let command = Command::parse(
            &Args::default(),
            &free(&["say", "subdomain=acme", "room=attic", "hi"]),
        )
        .unwrap();
        let err = execute(&command, &session, &mut NoInput, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_invalid_room());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn rooms_marks_configured_rooms() {
        let (session, _) = session();
        let mut out = Vec::new();
        execute(&Command::Rooms { subdomain: None }, &session, &mut NoInput, &mut out)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "* acme/watercooler (1): coffee\n  acme/archive (2)\n"
        );
        let err = execute(
            &Command::Rooms {
                subdomain: Some("widgets".to_string()),
            },
            &session,
            &mut NoInput,
            &mut Vec::new(),
        )
        .await
        .unwrap_err();
        assert!(err.is_invalid_room());
    }

    #[tokio::test]
    async fn account_list_shows_rooms_and_default() {
        let (session, _) = session();
        let mut out = Vec::new();
        execute(&Command::AccountList, &session, &mut NoInput, &mut out)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "acme\thttps\tops, watercooler\ndefault\tacme/ops\n"
        );
    }

    #[tokio::test]
    async fn daemon_commands_need_run() {
        let (session, _) = session();
        let err = execute(&Command::Stop, &session, &mut NoInput, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[test]
    fn setup_writes_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut out = Vec::new();
        setup(&path, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("config.yaml"));
        assert!(Config::load(&path).is_ok());
        assert!(setup(&path, &mut Vec::new()).is_err());
    }

    #[test]
    fn log_view_and_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kindling.log");
        assert!(show_log(&path, LogCommand::View, &mut Vec::new())
            .unwrap_err()
            .is_not_found());

        let text = (1..=25).map(|n| format!("entry {n}\n")).collect::<String>();
        std::fs::write(&path, &text).unwrap();
        let mut out = Vec::new();
        show_log(&path, LogCommand::View, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), text);

        let mut out = Vec::new();
        show_log(&path, LogCommand::Tail, &mut out).unwrap();
        let tail = String::from_utf8(out).unwrap();
        assert_eq!(tail.lines().count(), 20);
        assert!(tail.starts_with("entry 6\n"));
        assert!(tail.ends_with("entry 25\n"));
    }

    #[test]
    fn daemon_settings_default_without_config() {
        let dir = TempDir::new().unwrap();
        let daemon = daemon_config(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(daemon, DaemonConfig::default());
    }
}
