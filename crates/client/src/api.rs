//! HTTP client for the two Warzone endpoints the duplicator talks to.
//!
//! Neither call is retried. Transport failures, `error` fields and unexpected
//! bodies all come back as [`PipelineError`].

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, info};
use wzmap_engine::PipelineError;
use wzmap_protocol::{
    endpoints, Command, GameFeedResponse, SetMapDetailsRequest, SetMapDetailsResponse,
};

/// Email and API token sent with every request.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    api_token: String,
}

impl Credentials {
    pub fn new(email: Option<String>, api_token: Option<String>) -> Result<Self, PipelineError> {
        let email = email
            .filter(|s| !s.trim().is_empty())
            .ok_or(PipelineError::MissingField("email"))?;
        let api_token = api_token
            .filter(|s| !s.trim().is_empty())
            .ok_or(PipelineError::MissingField("api token"))?;
        Ok(Self { email, api_token })
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WarzoneClient {
    http: reqwest::Client,
    base_url: String,
}

impl WarzoneClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Downloads the raw `map` object of the game `game_id` was played on.
    pub async fn fetch_map(
        &self,
        game_id: u64,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, PipelineError> {
        let url = self.url(endpoints::GAME_FEED);
        let game_id_param = game_id.to_string();
        info!(game_id, "fetching game feed");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("GameID", game_id_param.as_str()),
                ("Email", credentials.email.as_str()),
                ("APIToken", credentials.api_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let (status, feed): (_, GameFeedResponse) =
            read_json(&url, response, "game feed response").await?;
        if let Some(message) = feed.error {
            return Err(PipelineError::Remote {
                api: "query game",
                message,
            });
        }
        check_status(&url, status)?;
        feed.map.ok_or_else(|| PipelineError::Malformed {
            what: "game feed response",
            message: "neither `error` nor `map` present".to_string(),
        })
    }

    /// Posts the whole command list to `map_id` in one request.
    pub async fn upload(
        &self,
        map_id: u64,
        credentials: &Credentials,
        commands: Vec<Command>,
    ) -> Result<(), PipelineError> {
        let url = self.url(endpoints::SET_MAP_DETAILS);
        let request = SetMapDetailsRequest {
            email: credentials.email.clone(),
            api_token: credentials.api_token.clone(),
            map_id,
            commands,
        };
        info!(map_id, commands = request.commands.len(), "uploading map details");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let (status, body): (_, SetMapDetailsResponse) =
            read_json(&url, response, "set map details response").await?;
        if let Some(message) = body.error {
            return Err(PipelineError::Remote {
                api: "set map details",
                message,
            });
        }
        check_status(&url, status)
    }
}

// The query string carries the token, so the URL is stripped from reqwest's message.
fn transport(url: &str, e: reqwest::Error) -> PipelineError {
    PipelineError::Transport {
        url: url.to_string(),
        message: e.without_url().to_string(),
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<(), PipelineError> {
    if status.is_success() {
        return Ok(());
    }
    Err(PipelineError::Transport {
        url: url.to_string(),
        message: format!("status {status}"),
    })
}

async fn read_json<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
    what: &'static str,
) -> Result<(StatusCode, T), PipelineError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| transport(url, e))?;
    debug!(%status, bytes = text.len(), "response received");

    match serde_json::from_str(&text) {
        Ok(v) => Ok((status, v)),
        Err(_) if !status.is_success() => Err(PipelineError::Transport {
            url: url.to_string(),
            message: format!("status {status}: {}", truncate(&text, 200)),
        }),
        Err(e) => Err(PipelineError::Malformed {
            what,
            message: e.to_string(),
        }),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
