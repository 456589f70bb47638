//! Relay-backed bot sessions.
//!
//! Each login is served by a relay process that holds the actual game
//! coordinator connection and exposes it over HTTP:
//!
//! - `POST /login` with `{user, pass, auth}` starts the session
//! - `GET /status` answers `{"ready": bool, "logged_in"?: bool}`
//! - `GET /inspect?s=&a=&d=&m=[&price=]` answers `{"iteminfo": {...}, "delay": ms}`
//!
//! Requests go through the proxy assigned to the login, if any.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bot::{Bot, BotStatus, Session};
use crate::error::{Error, Result};
use crate::model::{Failure, InspectLink, Inspection};

/// Login material handed to the relay.
#[derive(Debug)]
pub struct Credentials {
    pub user: String,
    pub pass: SecretString,
    pub auth: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct RelayStatus {
    ready: bool,
    /// Relays that know their session dropped say so; older ones omit it.
    #[serde(default)]
    logged_in: Option<bool>,
}

/// What a relay reports about its game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// Logged in, session not established yet.
    Pending,
    LoggedOut,
}

impl From<RelayStatus> for SessionState {
    fn from(status: RelayStatus) -> Self {
        match (status.ready, status.logged_in) {
            (_, Some(false)) => SessionState::LoggedOut,
            (true, _) => SessionState::Ready,
            (false, _) => SessionState::Pending,
        }
    }
}

/// Consecutive not-ready polls after which a session counts as dropped.
pub const MAX_PENDING_POLLS: u32 = 6;

/// Turns status polls into bot statuses.
///
/// A relay that stays pending for `max_pending_polls` polls in a row, or
/// says it is logged out, puts the bot back offline so the lifecycle loop
/// logs in again. A failed poll does the same right away.
#[derive(Debug)]
pub struct LoginTracker {
    pending_polls: u32,
    max_pending_polls: u32,
}

impl Default for LoginTracker {
    fn default() -> Self {
        Self::new(MAX_PENDING_POLLS)
    }
}

impl LoginTracker {
    pub fn new(max_pending_polls: u32) -> Self {
        Self {
            pending_polls: 0,
            max_pending_polls: max_pending_polls.max(1),
        }
    }

    /// Status for the bot after a poll; `None` means the poll failed.
    pub fn observe(&mut self, polled: Option<SessionState>) -> BotStatus {
        match polled {
            Some(SessionState::Ready) => {
                self.pending_polls = 0;
                BotStatus::Ready
            }
            Some(SessionState::Pending) => {
                self.pending_polls += 1;
                if self.pending_polls >= self.max_pending_polls {
                    self.pending_polls = 0;
                    BotStatus::Offline
                } else {
                    BotStatus::Connecting
                }
            }
            Some(SessionState::LoggedOut) | None => {
                self.pending_polls = 0;
                BotStatus::Offline
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelayInspection {
    iteminfo: serde_json::Value,
    #[serde(default)]
    delay: Option<u64>,
}

pub struct RelaySession {
    client: reqwest::Client,
    endpoint: String,
    default_delay: Duration,
}

impl RelaySession {
    /// `request_ttl` bounds every relay call; lookups that exceed it fail
    /// with [`Failure::TtlExceeded`].
    pub fn new(
        endpoint: &str,
        proxy: Option<&str>,
        request_ttl: Duration,
        default_delay: Duration,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(request_ttl);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            default_delay,
        })
    }

    pub async fn log_in(&self, credentials: &Credentials) -> Result<()> {
        let body = json!({
            "user": credentials.user,
            "pass": credentials.pass.expose_secret(),
            "auth": credentials.auth.as_ref().map(|a| a.expose_secret().to_string()),
        });

        let response = self
            .client
            .post(format!("{}/login", self.endpoint))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "relay login for {} failed with status {}",
                credentials.user,
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<SessionState> {
        let status: RelayStatus = self
            .client
            .get(format!("{}/status", self.endpoint))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(status.into())
    }
}

#[async_trait]
impl Session for RelaySession {
    async fn inspect(
        &self,
        link: &InspectLink,
        price: Option<u64>,
    ) -> std::result::Result<Inspection, Failure> {
        let params = link.params().ok_or(Failure::InvalidInspect)?;
        let mut query = vec![("s", params.s), ("a", params.a), ("d", params.d), ("m", params.m)];
        if let Some(price) = price {
            query.push(("price", price.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/inspect", self.endpoint))
            .query(&query)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::SERVICE_UNAVAILABLE => return Err(Failure::SteamOffline),
            StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
                return Err(Failure::TtlExceeded);
            }
            status => {
                debug!(%status, "relay rejected lookup");
                return Err(Failure::GenericBad);
            }
        }

        let body: RelayInspection = response.json().await.map_err(|e| classify(&e))?;
        let delay = body
            .delay
            .map(Duration::from_millis)
            .unwrap_or(self.default_delay);
        Ok(Inspection::new(body.iteminfo).with_delay(delay))
    }
}

fn classify(err: &reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::TtlExceeded
    } else if err.is_connect() {
        Failure::SteamOffline
    } else {
        Failure::GenericBad
    }
}

/// Keep a relay-backed bot logged in and its status current.
///
/// Polls status every `poll_interval` for the lifetime of the task and logs
/// in again whenever [`LoginTracker`] puts the bot offline.
pub fn spawn_lifecycle(
    bot: Arc<Bot>,
    session: Arc<RelaySession>,
    credentials: Credentials,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = LoginTracker::default();
        loop {
            if bot.status() == BotStatus::Offline {
                info!(bot = bot.username(), "logging in");
                bot.set_status(BotStatus::Connecting);
                if let Err(e) = session.log_in(&credentials).await {
                    warn!(bot = bot.username(), error = %e, "relay login failed");
                    bot.set_status(BotStatus::Offline);
                }
            }

            let polled = match session.status().await {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(bot = bot.username(), error = %e, "relay status check failed");
                    None
                }
            };
            let status = tracker.observe(polled);
            if status == BotStatus::Offline && polled.is_some() {
                warn!(bot = bot.username(), ?polled, "relay session dropped");
            }
            bot.set_status(status);

            tokio::time::sleep(poll_interval).await;
        }
    })
}
