use super::{StoreError, SubmissionStore};
use crate::model::{EmailAddress, SubmissionRecord, SurveyResponses};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Table holding waitlist rows.
pub const DEFAULT_TABLE: &str = "emails";

/// Default per-request timeout.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Connection settings for a PostgREST-compatible endpoint.
#[derive(Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Service key, sent as `apikey` and as a bearer token.
    pub api_key: String,
    /// Table name.
    pub table: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestConfig {
    /// Settings for `base_url` with the default table and timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl std::fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct RestErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Store backed by a hosted table over HTTP.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    endpoint: String,
}

impl RestStore {
    /// Builds the HTTP client for `config`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the key cannot be sent as a header or
    /// the client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, StoreError> {
        let invalid_key = |_| StoreError::Unavailable("api key is not a valid header value".into());

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key).map_err(invalid_key)?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static("apikey"), key);

        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(invalid_key)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let endpoint = format!(
            "{}/rest/v1/{}",
            config.base_url.trim_end_matches('/'),
            config.table
        );

        Ok(Self { client, endpoint })
    }

    /// Full URL of the table.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

async fn read_rows(response: Response) -> Result<Vec<SubmissionRecord>, StoreError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<Vec<SubmissionRecord>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()));
    }

    let body = response.text().await.map_err(transport_error)?;
    let parsed: RestErrorBody = serde_json::from_str(&body).unwrap_or_default();

    if status == StatusCode::CONFLICT || parsed.code.as_deref() == Some(UNIQUE_VIOLATION) {
        return Err(StoreError::Conflict);
    }

    debug!(status = status.as_u16(), body = %body, "Store rejected request");
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message: parsed.message.unwrap_or(body),
    })
}

#[async_trait]
impl SubmissionStore for RestStore {
    async fn insert_email(&self, email: &EmailAddress) -> Result<SubmissionRecord, StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Prefer", "return=representation")
            .json(&[json!({ "email": email.as_str() })])
            .send()
            .await
            .map_err(transport_error)?;

        read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".into()))
    }

    async fn complete_survey(
        &self,
        email: &EmailAddress,
        responses: &SurveyResponses,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let response = self
            .client
            .patch(&self.endpoint)
            .query(&[("email", format!("eq.{}", email.as_str()))])
            .header("Prefer", "return=representation")
            .json(&json!({
                "survey_completed": true,
                "survey_responses": responses,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        read_rows(response).await
    }

    async fn list_recent(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await
            .map_err(transport_error)?;

        read_rows(response).await
    }
}
