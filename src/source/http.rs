//! HTTP Glucose Source
//!
//! REST client for a CGM follower API:
//! - password-grant token request (form POST)
//! - account id looked up from a JSON document via a JSON pointer
//! - readings fetched as a JSON array of `{"EventDate", "convertedValue"}` records

use super::*;
use chrono::{Duration, SecondsFormat};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::sync::RwLock;

/// Field holding the record timestamp in the readings payload
const TIMESTAMP_FIELD: &str = "EventDate";

/// Field holding the mmol/L value in the readings payload
const VALUE_FIELD: &str = "convertedValue";

/// Token lifetime assumed when the token endpoint does not report one
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the token actually expires
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Endpoints and client settings
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub token_url: String,
    pub account_url: String,
    pub readings_url: String,
    /// JSON pointer locating the account id in the `account_url` response
    pub account_id_pointer: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Live session
#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::minutes(EXPIRY_MARGIN_MINUTES)
    }
}

/// REST implementation of [`GlucoseSource`]
pub struct HttpSource {
    client: Client,
    config: HttpSourceConfig,
    credentials: Credentials,
    session: RwLock<Option<Session>>,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig, credentials: Credentials) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            credentials,
            session: RwLock::new(None),
        })
    }

    fn session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_session(&self, session: Option<Session>) {
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn access_token(&self) -> Result<String, SourceError> {
        self.session()
            .filter(|s| s.is_valid(Utc::now()))
            .map(|s| s.access_token)
            .ok_or(SourceError::NotAuthenticated)
    }

    /// Pass successful responses through; map the rest with [`Self::rejected`]
    async fn checked(&self, response: Response) -> Result<Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(self.rejected(status, message))
    }

    /// Map an error status; a 401 also drops the session so the poller logs in again
    fn rejected(&self, status: StatusCode, message: String) -> SourceError {
        if status == StatusCode::UNAUTHORIZED {
            self.set_session(None);
            return SourceError::AuthFailed("session rejected by server".into());
        }

        SourceError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Store the session from a token endpoint reply, or clear it on failure
    fn start_session(
        &self,
        status: StatusCode,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SourceError> {
        if !status.is_success() {
            self.set_session(None);
            return Err(SourceError::AuthFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let token: TokenResponse =
            serde_json::from_str(body).map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = Duration::try_seconds(lifetime)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| SourceError::InvalidResponse(format!("bad expires_in: {}", lifetime)))?;

        self.set_session(Some(Session {
            access_token: token.access_token,
            expires_at,
        }));

        tracing::info!(expires_in = lifetime, "Logged in to glucose API");
        Ok(())
    }
}

#[async_trait]
impl GlucoseSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn is_authenticated(&self) -> bool {
        self.access_token().is_ok()
    }

    async fn login(&self) -> Result<(), SourceError> {
        let mut form = vec![
            ("grant_type", "password"),
            ("username", self.credentials.username.trim()),
            ("password", self.credentials.password.as_str()),
        ];
        if let Some(client_id) = &self.config.client_id {
            form.push(("client_id", client_id.as_str()));
        }
        if let Some(client_secret) = &self.config.client_secret {
            form.push(("client_secret", client_secret.as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        self.start_session(status, &body, Utc::now())
    }

    async fn resolve_account_id(&self) -> Result<Option<String>, SourceError> {
        let token = self.access_token()?;

        let response = self
            .client
            .get(&self.config.account_url)
            .bearer_auth(&token)
            .send()
            .await?;
        let response = self.checked(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        Ok(body
            .pointer(&self.config.account_id_pointer)
            .and_then(json_to_id))
    }

    async fn fetch_readings(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let token = self.access_token()?;

        let start = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = to.to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .client
            .get(&self.config.readings_url)
            .bearer_auth(&token)
            .query(&[
                ("userId", account_id),
                ("startDate", start.as_str()),
                ("endDate", end.as_str()),
            ])
            .send()
            .await?;
        let response = self.checked(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        records_from_json(&body)
    }
}

/// Turn a readings payload into raw records; only the top-level shape is strict
fn records_from_json(body: &Value) -> Result<Vec<RawRecord>, SourceError> {
    let items = body
        .as_array()
        .ok_or_else(|| SourceError::InvalidResponse("expected a JSON array of readings".into()))?;

    Ok(items.iter().map(record_from_json).collect())
}

fn record_from_json(item: &Value) -> RawRecord {
    let timestamp = item
        .get(TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);

    let value = item.get(VALUE_FIELD).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    RawRecord { timestamp, value }
}

fn json_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
