use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS,
    CLIENT_RETRY_BACKOFF,
};
use crate::types::{
    Message, MessageEnvelope, MessageId, MessageList, RoomInfo, RoomList, SpeakParams, User,
    UserEnvelope,
};

const DEFAULT_HOST: &str = "campfirenow.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// The operations kindling needs from a chat service.
///
/// Rooms are addressed by name; implementations resolve names to whatever
/// the service uses internally.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// The account subdomain this client speaks for.
    fn subdomain(&self) -> &str;

    /// Fetch the user that owns the token.
    async fn me(&self) -> Result<User>;

    /// List every room visible to the token.
    async fn list_rooms(&self) -> Result<Vec<RoomInfo>>;

    /// Post a plain text message to `room`.
    async fn post_message(&self, room: &str, text: &str) -> Result<Message>;

    /// Post a paste to `room`.
    async fn post_paste(&self, room: &str, text: &str) -> Result<Message>;

    /// Fetch messages newer than `since`.
    ///
    /// Returns the new messages in id order and the cursor for the next call.
    /// When nothing new arrived the returned cursor equals `since`.
    async fn poll_events(
        &self,
        room: &str,
        since: Option<MessageId>,
    ) -> Result<(Vec<Message>, Option<MessageId>)>;
}

/// Client for the Campfire HTTP API.
#[derive(Debug)]
pub struct Campfire {
    subdomain: String,
    client: ReqwestClient,
    headers: HeaderMap,
    base_url: Url,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    room_ids: Mutex<HashMap<String, u64>>,
}

impl Campfire {
    /// Create a new client for `subdomain` authenticated by `token`.
    pub fn new(subdomain: impl Into<String>, token: &str, ssl: bool) -> Result<Self> {
        Self::with_options(subdomain, token, ssl, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `base_url` overrides the `https://{subdomain}.campfirenow.com/` default.
    pub fn with_options(
        subdomain: impl Into<String>,
        token: &str,
        ssl: bool,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let subdomain = subdomain.into();
        if token.trim().is_empty() {
            return Err(Error::authentication(format!(
                "no API token configured for {subdomain}"
            )));
        }

        let base_url = match base_url {
            Some(url) => url,
            None => default_base_url(&subdomain, ssl),
        };
        let base_url = Url::parse(&ensure_trailing_slash(base_url))?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            headers: default_headers(token)?,
            subdomain,
            client,
            base_url,
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            room_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Set how many times a retryable failure is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial retry delay and its ceiling.
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap.max(base);
        self
    }

    /// Record a known room id so the first post does not need a room listing.
    pub fn with_room_id(self, room: impl Into<String>, id: u64) -> Self {
        self.room_ids_mut().insert(room.into(), id);
        self
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn room_ids_mut(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.room_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn room_id(&self, room: &str) -> Result<u64> {
        if let Some(id) = self.room_ids_mut().get(room).copied() {
            return Ok(id);
        }
        self.list_rooms().await?;
        self.room_ids_mut().get(room).copied().ok_or_else(|| {
            Error::invalid_room(Some(self.subdomain.clone()), Some(room.to_string()))
        })
    }

    /// Run a request, retrying retryable failures with exponential backoff.
    ///
    /// `build` is invoked once per attempt because a `RequestBuilder` cannot
    /// be replayed. `replay` limits which failures are retried.
    async fn execute<T, F>(&self, replay: Replay, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.execute_once(&build).await {
                Ok(value) => return Ok(value),
                Err(err) if replay.allows(&err) && attempt < self.max_retries => {
                    let delay = retry_delay(&err, attempt, self.backoff_base, self.backoff_cap);
                    tracing::debug!(
                        subdomain = %self.subdomain,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    CLIENT_REQUEST_RETRIES.click();
                    CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    CLIENT_REQUEST_ERRORS.click();
                    return Err(err);
                }
            }
        }
    }

    async fn execute_once<T, F>(&self, build: &F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        CLIENT_REQUESTS.click();
        let started = Instant::now();
        let response = build()
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.trim().parse::<u64>().ok());

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        error_for_status(status_code, &body, retry_after)
    }

    async fn speak(&self, room: &str, params: SpeakParams) -> Result<Message> {
        let id = self.room_id(room).await?;
        let url = self.endpoint(&format!("room/{id}/speak.json"))?;
        let envelope: MessageEnvelope = self
            .execute(Replay::Unsent, || {
                self.client.post(url.clone()).json(&params)
            })
            .await?;
        Ok(envelope.message)
    }
}

#[async_trait]
impl ChatApi for Campfire {
    fn subdomain(&self) -> &str {
        &self.subdomain
    }

    async fn me(&self) -> Result<User> {
        let url = self.endpoint("users/me.json")?;
        let envelope: UserEnvelope = self
            .execute(Replay::Idempotent, || self.client.get(url.clone()))
            .await?;
        Ok(envelope.user)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        let url = self.endpoint("rooms.json")?;
        let list: RoomList = self
            .execute(Replay::Idempotent, || self.client.get(url.clone()))
            .await?;
        let mut ids = self.room_ids_mut();
        for room in &list.rooms {
            ids.insert(room.name.clone(), room.id);
        }
        drop(ids);
        Ok(list.rooms)
    }

    async fn post_message(&self, room: &str, text: &str) -> Result<Message> {
        self.speak(room, SpeakParams::text(text)).await
    }

    async fn post_paste(&self, room: &str, text: &str) -> Result<Message> {
        self.speak(room, SpeakParams::paste(text)).await
    }

    async fn poll_events(
        &self,
        room: &str,
        since: Option<MessageId>,
    ) -> Result<(Vec<Message>, Option<MessageId>)> {
        let id = self.room_id(room).await?;
        let mut url = self.endpoint(&format!("room/{id}/recent.json"))?;
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since_message_id", &since.to_string());
        }
        let list: MessageList = self
            .execute(Replay::Idempotent, || self.client.get(url.clone()))
            .await?;
        Ok(advance_cursor(list.messages, since))
    }
}

/// Which failures a request may be sent again after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads: any retryable failure.
    Idempotent,
    /// Writes: only failures where the server cannot have stored anything.
    Unsent,
}

impl Replay {
    fn allows(self, err: &Error) -> bool {
        match self {
            Replay::Idempotent => err.is_retryable(),
            // A timeout or 5xx may arrive after the message was stored.
            Replay::Unsent => err.is_connection() || err.is_rate_limit(),
        }
    }
}

/// Drop messages at or before `since`, sort the rest, and compute the next cursor.
pub fn advance_cursor(
    mut messages: Vec<Message>,
    since: Option<MessageId>,
) -> (Vec<Message>, Option<MessageId>) {
    if let Some(since) = since {
        messages.retain(|m| m.id > since);
    }
    messages.sort_by_key(|m| m.id);
    let next = messages.last().map(|m| m.id).or(since);
    (messages, next)
}

/// Map a non-success status and body to the matching error variant.
pub fn error_for_status(status_code: u16, body: &str, retry_after: Option<u64>) -> Error {
    let message = error_message(status_code, body);
    match status_code {
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message, None, None),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        503 if retry_after.is_some() => Error::rate_limit(message, retry_after),
        500..=599 => Error::server(status_code, message),
        _ => Error::api(status_code, message),
    }
}

fn error_message(status_code: u16, body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        message: Option<String>,
    }

    let body = body.trim();
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message) {
            return message;
        }
    }
    if body.is_empty() {
        format!("HTTP {status_code}")
    } else {
        body.to_string()
    }
}

/// Delay before retry number `attempt` (zero-based).
///
/// A server-supplied `Retry-After` wins; otherwise the delay doubles from
/// `base` up to `cap`.
pub fn retry_delay(err: &Error, attempt: u32, base: Duration, cap: Duration) -> Duration {
    if let Error::RateLimit {
        retry_after: Some(secs),
        ..
    } = err
    {
        return Duration::from_secs(*secs).min(cap);
    }
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

fn default_base_url(subdomain: &str, ssl: bool) -> String {
    let scheme = if ssl { "https" } else { "http" };
    format!("{scheme}://{subdomain}.{DEFAULT_HOST}/")
}

fn ensure_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn default_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
        .map_err(|_| Error::authentication("API token contains invalid header characters"))?;
    auth.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, auth);
    Ok(headers)
}
