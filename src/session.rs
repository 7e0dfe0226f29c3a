//! Accounts, rooms, and the event dispatcher for one invocation.
//!
//! A [`Session`] is assembled from a [`Config`] at startup. Every [`Room`]
//! belongs to exactly one [`Account`], and every post made through a
//! [`RoomRef`] goes through that account's client under that room's name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{Campfire, ChatApi};
use crate::config::{AccountConfig, Config};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::types::{Message, MessageId, RoomInfo};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A named room on one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    name: String,
    id: Option<u64>,
    subdomain: String,
}

impl Room {
    /// The room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured room id, if any.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Subdomain of the owning account.
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }
}

/// A configured chat identity and the rooms used with it.
pub struct Account {
    subdomain: String,
    ssl: bool,
    rooms: BTreeMap<String, Room>,
    client: Arc<dyn ChatApi>,
}

impl Account {
    /// Create an account that talks through `client`.
    pub fn new(subdomain: impl Into<String>, ssl: bool, client: Arc<dyn ChatApi>) -> Self {
        Self {
            subdomain: subdomain.into(),
            ssl,
            rooms: BTreeMap::new(),
            client,
        }
    }

    /// Add a room to this account.
    pub fn with_room(mut self, name: impl Into<String>, id: Option<u64>) -> Self {
        let name = name.into();
        self.rooms.insert(
            name.clone(),
            Room {
                name,
                id,
                subdomain: self.subdomain.clone(),
            },
        );
        self
    }

    /// The account subdomain.
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// Whether the account uses HTTPS.
    pub fn ssl(&self) -> bool {
        self.ssl
    }

    /// Configured rooms, ordered by name.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Look up a configured room.
    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    /// The client carrying this account's credentials.
    pub fn client(&self) -> &Arc<dyn ChatApi> {
        &self.client
    }

    /// List every room the token can see, configured or not.
    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        self.client.list_rooms().await
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("subdomain", &self.subdomain)
            .field("ssl", &self.ssl)
            .field("rooms", &self.rooms.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A room together with the account that owns it.
#[derive(Debug, Clone, Copy)]
pub struct RoomRef<'a> {
    account: &'a Account,
    room: &'a Room,
}

impl<'a> RoomRef<'a> {
    /// The owning account.
    pub fn account(&self) -> &'a Account {
        self.account
    }

    /// The room.
    pub fn room(&self) -> &'a Room {
        self.room
    }

    /// The room name.
    pub fn name(&self) -> &'a str {
        &self.room.name
    }

    /// `subdomain/room`.
    pub fn location(&self) -> String {
        format!("{}/{}", self.account.subdomain, self.room.name)
    }

    /// Post a plain text message.
    pub async fn send(&self, text: &str) -> Result<Message> {
        self.account.client.post_message(&self.room.name, text).await
    }

    /// Post a paste.
    pub async fn paste(&self, text: &str) -> Result<Message> {
        self.account.client.post_paste(&self.room.name, text).await
    }

    /// Fetch messages newer than `since`.
    pub async fn poll(&self, since: Option<MessageId>) -> Result<(Vec<Message>, Option<MessageId>)> {
        self.account.client.poll_events(&self.room.name, since).await
    }
}

/// What the daemon needs to poll one room without borrowing the session.
#[derive(Clone)]
pub struct PollTarget {
    /// Account subdomain.
    pub subdomain: String,
    /// Room name.
    pub room: String,
    /// Client of the owning account.
    pub client: Arc<dyn ChatApi>,
}

impl PollTarget {
    /// `subdomain/room`.
    pub fn location(&self) -> String {
        format!("{}/{}", self.subdomain, self.room)
    }
}

impl std::fmt::Debug for PollTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollTarget")
            .field("subdomain", &self.subdomain)
            .field("room", &self.room)
            .finish()
    }
}

/// Accounts, the default room, and the dispatcher for one invocation.
#[derive(Debug, Default)]
pub struct Session {
    accounts: BTreeMap<String, Account>,
    default: Option<(String, String)>,
    dispatcher: Dispatcher,
}

impl Session {
    /// An empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session whose accounts talk to Campfire over HTTP.
    pub fn from_config(config: &Config) -> Result<Self> {
        let max_retries = config.daemon.max_retries;
        Self::from_config_with(config, |account| {
            let mut client = Campfire::with_options(
                account.subdomain.clone(),
                &account.token,
                account.ssl,
                account.base_url.clone(),
                Some(COMMAND_TIMEOUT),
            )?
            .with_max_retries(max_retries);
            for room in &account.rooms {
                if let Some(id) = room.id() {
                    client = client.with_room_id(room.name(), id);
                }
            }
            Ok(Arc::new(client) as Arc<dyn ChatApi>)
        })
    }

    /// Build a session, creating each account's client with `make_client`.
    pub fn from_config_with<F>(config: &Config, mut make_client: F) -> Result<Self>
    where
        F: FnMut(&AccountConfig) -> Result<Arc<dyn ChatApi>>,
    {
        config.validate()?;
        let mut session = Session::new();
        for account_config in &config.accounts {
            let client = make_client(account_config)?;
            let mut account = Account::new(
                account_config.subdomain.clone(),
                account_config.ssl,
                client,
            );
            for room in &account_config.rooms {
                account = account.with_room(room.name(), room.id());
            }
            session.add_account(account)?;
        }
        if let Some(default) = config.default_room() {
            session.set_default_room(&default.subdomain, &default.room)?;
        }
        Ok(session)
    }

    /// Add an account; subdomains must be unique.
    pub fn add_account(&mut self, account: Account) -> Result<()> {
        if self.accounts.contains_key(&account.subdomain) {
            return Err(Error::config(format!(
                "account {} is configured twice",
                account.subdomain
            )));
        }
        self.accounts.insert(account.subdomain.clone(), account);
        Ok(())
    }

    /// Make `subdomain/room` the default room.
    pub fn set_default_room(&mut self, subdomain: &str, room: &str) -> Result<()> {
        self.find_room(subdomain, room)?;
        self.default = Some((subdomain.to_string(), room.to_string()));
        Ok(())
    }

    /// Look up an account.
    pub fn account(&self, subdomain: &str) -> Option<&Account> {
        self.accounts.get(subdomain)
    }

    /// All accounts, ordered by subdomain.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Every configured room across every account.
    pub fn rooms(&self) -> impl Iterator<Item = RoomRef<'_>> {
        self.accounts
            .values()
            .flat_map(|account| account.rooms.values().map(move |room| RoomRef { account, room }))
    }

    /// Ask each account's service who its token belongs to.
    ///
    /// A rejected token is an error. Other failures, such as the network
    /// being down, are logged and skipped so the daemon can retry later.
    pub async fn verify_accounts(&self) -> Result<()> {
        for account in self.accounts.values() {
            match account.client.me().await {
                Ok(user) => {
                    tracing::info!(subdomain = %account.subdomain, user = %user.name, "token accepted");
                }
                Err(err) if err.is_authentication() || err.is_permission() => {
                    return Err(Error::authentication(format!(
                        "token for {} was rejected: {err}",
                        account.subdomain
                    )));
                }
                Err(err) => {
                    tracing::warn!(subdomain = %account.subdomain, error = %err, "could not verify token");
                }
            }
        }
        Ok(())
    }

    /// The default room.
    pub fn default_room(&self) -> Result<RoomRef<'_>> {
        match &self.default {
            Some((subdomain, room)) => self.find_room(subdomain, room),
            None => Err(Error::invalid_room(None, None)),
        }
    }

    /// The room named by `subdomain` and `room` when both are given,
    /// otherwise the default room.
    pub fn selected_room(&self, subdomain: Option<&str>, room: Option<&str>) -> Result<RoomRef<'_>> {
        match (subdomain, room) {
            (Some(subdomain), Some(room)) => self.find_room(subdomain, room),
            _ => self.default_room(),
        }
    }

    /// Owned handles for every configured room, for the poll loop.
    pub fn poll_targets(&self) -> Vec<PollTarget> {
        self.rooms()
            .map(|room| PollTarget {
                subdomain: room.account.subdomain.clone(),
                room: room.room.name.clone(),
                client: Arc::clone(&room.account.client),
            })
            .collect()
    }

    /// The event dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The event dispatcher, for registering handlers.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    fn find_room(&self, subdomain: &str, room: &str) -> Result<RoomRef<'_>> {
        let account = self
            .accounts
            .get(subdomain)
            .ok_or_else(|| Error::invalid_room(Some(subdomain.to_string()), None))?;
        let room = account.rooms.get(room).ok_or_else(|| {
            Error::invalid_room(Some(subdomain.to_string()), Some(room.to_string()))
        })?;
        Ok(RoomRef { account, room })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockApi};

    fn two_account_session() -> (Session, Arc<MockApi>, Arc<MockApi>) {
        let acme = Arc::new(MockApi::new("acme"));
        let widgets = Arc::new(MockApi::new("widgets"));
        let mut session = Session::new();
        session
            .add_account(
                Account::new("acme", true, acme.clone())
                    .with_room("watercooler", None)
                    .with_room("ops", Some(42)),
            )
            .unwrap();
        session
            .add_account(Account::new("widgets", true, widgets.clone()).with_room("lobby", None))
            .unwrap();
        session.set_default_room("widgets", "lobby").unwrap();
        (session, acme, widgets)
    }

    #[test]
    fn selected_room_uses_pair_when_both_given() {
        let (session, _, _) = two_account_session();
        let room = session.selected_room(Some("acme"), Some("ops")).unwrap();
        assert_eq!(room.location(), "acme/ops");
        assert_eq!(room.room().id(), Some(42));
        assert_eq!(room.room().subdomain(), "acme");
    }

    #[test]
    fn selected_room_falls_back_to_default() {
        let (session, _, _) = two_account_session();
        for (subdomain, room) in [
            (None, None),
            (Some("acme"), None),
            (None, Some("watercooler")),
        ] {
            let selected = session.selected_room(subdomain, room).unwrap();
            assert_eq!(selected.location(), "widgets/lobby");
        }
    }

    #[test]
    fn selected_room_rejects_unknown_pair() {
        let (session, _, _) = two_account_session();
        let err = session
            .selected_room(Some("acme"), Some("attic"))
            .unwrap_err();
        assert!(err.is_invalid_room());
        let err = session
            .selected_room(Some("nobody"), Some("lobby"))
            .unwrap_err();
        assert!(err.is_invalid_room());
    }

    #[test]
    fn missing_default_is_invalid_room() {
        let session = Session::new();
        assert!(session.default_room().unwrap_err().is_invalid_room());
    }

    #[test]
    fn duplicate_account_rejected() {
        let (mut session, _, _) = two_account_session();
        let again = Account::new("acme", true, Arc::new(MockApi::new("acme")));
        assert!(session.add_account(again).is_err());
    }

    #[tokio::test]
    async fn posts_route_through_owning_account() {
        let (session, acme, widgets) = two_account_session();
        session
            .selected_room(Some("acme"), Some("watercooler"))
            .unwrap()
            .send("hi")
            .await
            .unwrap();
        session
            .selected_room(None, None)
            .unwrap()
            .paste("line one\nline two")
            .await
            .unwrap();

        assert_eq!(
            acme.calls(),
            vec![Call::PostMessage {
                room: "watercooler".to_string(),
                body: "hi".to_string()
            }]
        );
        assert_eq!(
            widgets.calls(),
            vec![Call::PostPaste {
                room: "lobby".to_string(),
                body: "line one\nline two".to_string()
            }]
        );
    }

    #[test]
    fn from_config_builds_accounts_and_default() {
        let config = Config::from_yaml(
            r#"
accounts:
  - subdomain: acme
    token: a
    rooms: [watercooler, {name: ops, id: 42}]
  - subdomain: widgets
    token: b
    rooms: [lobby]
"#,
        )
        .unwrap();
        let session =
            Session::from_config_with(&config, |a| Ok(Arc::new(MockApi::new(&a.subdomain)) as Arc<dyn ChatApi>))
                .unwrap();
        assert_eq!(session.accounts().count(), 2);
        assert_eq!(session.default_room().unwrap().location(), "acme/watercooler");
        let targets = session.poll_targets();
        let locations: Vec<String> = targets.iter().map(PollTarget::location).collect();
        assert_eq!(
            locations,
            vec!["acme/ops", "acme/watercooler", "widgets/lobby"]
        );
        assert_eq!(targets[2].client.subdomain(), "widgets");
    }

    #[test]
    fn from_config_uses_campfire_clients() {
        let config = Config::from_yaml(
            "accounts:\n  - {subdomain: acme, token: a, rooms: [watercooler]}\n",
        )
        .unwrap();
        let session = Session::from_config(&config).unwrap();
        let account = session.account("acme").unwrap();
        assert!(account.ssl());
        assert_eq!(account.client().subdomain(), "acme");
    }

    #[tokio::test]
    async fn verify_accounts_asks_every_account() {
        let (session, acme, widgets) = two_account_session();
        session.verify_accounts().await.unwrap();
        assert_eq!(acme.calls(), vec![Call::Me]);
        assert_eq!(widgets.calls(), vec![Call::Me]);
    }

    #[tokio::test]
    async fn verify_accounts_rejects_bad_token() {
        let (session, _, widgets) = two_account_session();
        widgets.fail_me(Error::authentication("bad token"));
        let err = session.verify_accounts().await.unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("widgets"), "{err}");
    }

    #[tokio::test]
    async fn verify_accounts_tolerates_unreachable_service() {
        let (session, acme, widgets) = two_account_session();
        acme.fail_me(Error::connection("refused", None));
        session.verify_accounts().await.unwrap();
        assert_eq!(widgets.calls(), vec![Call::Me]);
    }
}
