//! Signed HTTP delivery of a single job.

use async_trait::async_trait;
use chrono::Utc;
use courier_common::{AppError, AppResult, DeliveryConfig, sign_post};
use reqwest::{Client, StatusCode, redirect};
use tracing::debug;
use url::Url;

const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

/// Longest response body excerpt kept in a failure reason, in characters.
const MAX_REASON_BODY: usize = 256;

/// Most body bytes read to build the excerpt. Enough for
/// [`MAX_REASON_BODY`] characters of any UTF-8 text.
const MAX_REASON_BYTES: usize = MAX_REASON_BODY * 4;

/// Final result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The remote accepted the message (2xx or 3xx).
    Success { status: u16 },
    /// The remote rejected the message, or it could not be sent at all.
    /// Never retried.
    PermanentFailure { status: Option<u16>, reason: String },
    /// The remote was unavailable or did not answer. Retried.
    TransientFailure { status: Option<u16>, reason: String },
}

impl DeliveryOutcome {
    /// Classify a response status.
    ///
    /// 2xx and 3xx are success, 4xx is permanent, anything else is transient.
    #[must_use]
    pub fn from_status(status: u16, reason: impl Into<String>) -> Self {
        match status {
            200..=399 => Self::Success { status },
            400..=499 => Self::PermanentFailure {
                status: Some(status),
                reason: reason.into(),
            },
            _ => Self::TransientFailure {
                status: Some(status),
                reason: reason.into(),
            },
        }
    }

    /// No response was received.
    #[must_use]
    pub fn no_response(reason: impl Into<String>) -> Self {
        Self::TransientFailure {
            status: None,
            reason: reason.into(),
        }
    }

    /// Whether the job should go back on the queue.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }

    /// Response status, when one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status } => Some(*status),
            Self::PermanentFailure { status, .. } | Self::TransientFailure { status, .. } => {
                *status
            }
        }
    }
}

/// Sends one signed message to one inbox.
///
/// Implementations never fail: every problem is folded into the returned
/// [`DeliveryOutcome`].
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Deliver `body` to `address`, signed as `actor_id` with `signing_key`.
    async fn deliver(
        &self,
        actor_id: &str,
        body: &str,
        address: &str,
        signing_key: &str,
    ) -> DeliveryOutcome;
}

/// [`DeliveryTransport`] over `reqwest`.
#[derive(Clone)]
pub struct HttpDeliveryTransport {
    client: Client,
    user_agent: String,
    key_id_suffix: String,
}

impl HttpDeliveryTransport {
    /// Build a transport from delivery settings.
    ///
    /// Redirects are not followed: a 3xx answer already counts as delivered.
    pub fn new(config: &DeliveryConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            key_id_suffix: config.key_id_suffix.clone(),
        })
    }

    fn key_id(&self, actor_id: &str) -> String {
        format!("{actor_id}{}", self.key_id_suffix)
    }
}

#[async_trait]
impl DeliveryTransport for HttpDeliveryTransport {
    async fn deliver(
        &self,
        actor_id: &str,
        body: &str,
        address: &str,
        signing_key: &str,
    ) -> DeliveryOutcome {
        let target = match Url::parse(address) {
            Ok(url) => url,
            Err(e) => {
                return DeliveryOutcome::PermanentFailure {
                    status: None,
                    reason: format!("Invalid inbox URL: {e}"),
                };
            }
        };

        let signed = match sign_post(
            signing_key,
            &self.key_id(actor_id),
            &target,
            body.as_bytes(),
            Utc::now(),
        ) {
            Ok(signed) => signed,
            Err(e) => {
                return DeliveryOutcome::PermanentFailure {
                    status: None,
                    reason: e.to_string(),
                };
            }
        };

        let response = self
            .client
            .post(target)
            .header("Host", signed.host)
            .header("Date", signed.date)
            .header("Digest", signed.digest)
            .header("Signature", signed.signature)
            .header("Content-Type", ACTIVITY_CONTENT_TYPE)
            .header("Accept", ACTIVITY_CONTENT_TYPE)
            .header("User-Agent", &self.user_agent)
            .body(body.to_owned())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("Request timed out: {e}")
                } else {
                    format!("Request failed: {e}")
                };
                return DeliveryOutcome::no_response(reason);
            }
        };

        let status = response.status();
        debug!(address = %address, status = status.as_u16(), "Delivery response");

        if status.is_success() || status.is_redirection() {
            return DeliveryOutcome::Success {
                status: status.as_u16(),
            };
        }

        let text = read_excerpt(response).await;
        DeliveryOutcome::from_status(status.as_u16(), failure_reason(status, &text))
    }
}

/// Read at most [`MAX_REASON_BYTES`] of the body. The rest is left unread
/// and the connection is dropped with the response.
async fn read_excerpt(mut response: reqwest::Response) -> String {
    let mut bytes = Vec::new();
    while bytes.len() < MAX_REASON_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_REASON_BYTES - bytes.len());
                bytes.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed to read failure response body");
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn failure_reason(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    let excerpt: String = body.chars().take(MAX_REASON_BODY).collect();
    format!("{status}: {excerpt}")
}
