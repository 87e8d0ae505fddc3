//! HTTP adapter for the remote cart store.
//!
//! # Endpoints
//!
//! - `GET cart` → `[{ "id": "...", "modId": 42 }, ...]`
//! - `POST cart` with `{ "modId": 42 }`
//! - `DELETE cart/{modId}` (404 is treated as success)
//! - `DELETE cart`
//!
//! Every request carries `Authorization: Bearer <session credential>`.

use std::sync::Arc;

use async_trait::async_trait;
use modmarket_core::{CartEntryId, ModId};
use reqwest::{RequestBuilder, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{RemoteCartStore, RemoteEntry, StoreError};
use crate::config::CartConfig;
use crate::identity::Session;

/// Maximum number of response body characters kept in errors and logs.
const BODY_SNIPPET_LEN: usize = 200;

/// Client for the marketplace cart API.
#[derive(Clone)]
pub struct HttpCartStore {
    inner: Arc<HttpCartStoreInner>,
}

struct HttpCartStoreInner {
    client: reqwest::Client,
    cart_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartEntryWire {
    id: String,
    mod_id: ModId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddEntryBody {
    mod_id: ModId,
}

impl HttpCartStore {
    /// Create a new cart store client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the cart URL
    /// cannot be derived from the configured base URL.
    pub fn new(config: &CartConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .build()?;
        Self::with_client(client, &config.api_url)
    }

    /// Create a client around an existing `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` cannot be joined with `cart`.
    pub fn with_client(client: reqwest::Client, base_url: &Url) -> Result<Self, StoreError> {
        let cart_url = base_url
            .join("cart")
            .map_err(|e| StoreError::Unavailable(format!("invalid cart URL: {e}")))?;
        Ok(Self {
            inner: Arc::new(HttpCartStoreInner { client, cart_url }),
        })
    }

    fn entry_url(&self, mod_id: ModId) -> Result<Url, StoreError> {
        let mut url = self.inner.cart_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Unavailable("cart URL cannot be a base".to_string()))?
            .push(&mod_id.to_string());
        Ok(url)
    }

    /// Send a request and return the response body on success.
    ///
    /// `absent_ok` turns a 404 into success for idempotent deletes.
    async fn send(
        &self,
        request: RequestBuilder,
        session: &Session,
        absent_ok: bool,
    ) -> Result<String, StoreError> {
        let response = request
            .header(header::AUTHORIZATION, session.bearer())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let body = response.text().await?;

        if status.is_success() || (absent_ok && status == StatusCode::NOT_FOUND) {
            return Ok(body);
        }

        tracing::error!(
            status = %status,
            body = %snippet(&body),
            "Cart store returned non-success status"
        );
        Err(classify_status(status, &body, retry_after))
    }
}

#[async_trait]
impl RemoteCartStore for HttpCartStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    async fn fetch_all(&self, session: &Session) -> Result<Vec<RemoteEntry>, StoreError> {
        let request = self.inner.client.get(self.inner.cart_url.clone());
        let body = self.send(request, session, false).await?;
        let entries = parse_entries(&body)?;
        debug!(count = entries.len(), "Fetched cart entries");
        Ok(entries)
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id(), mod_id = %mod_id))]
    async fn add(&self, session: &Session, mod_id: ModId) -> Result<(), StoreError> {
        let request = self
            .inner
            .client
            .post(self.inner.cart_url.clone())
            .json(&AddEntryBody { mod_id });
        self.send(request, session, false).await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id(), mod_id = %mod_id))]
    async fn remove(&self, session: &Session, mod_id: ModId) -> Result<(), StoreError> {
        let request = self.inner.client.delete(self.entry_url(mod_id)?);
        self.send(request, session, true).await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    async fn clear(&self, session: &Session) -> Result<(), StoreError> {
        let request = self.inner.client.delete(self.inner.cart_url.clone());
        self.send(request, session, false).await?;
        Ok(())
    }
}

/// Parse the `GET cart` body.
fn parse_entries(body: &str) -> Result<Vec<RemoteEntry>, StoreError> {
    let wire: Vec<CartEntryWire> = serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %snippet(body),
            "Failed to parse cart response"
        );
        StoreError::Parse(e)
    })?;

    Ok(wire
        .into_iter()
        .map(|entry| RemoteEntry {
            entry_id: CartEntryId::new(entry.id),
            mod_id: entry.mod_id,
        })
        .collect())
}

/// Map a non-success status to a store error.
fn classify_status(status: StatusCode, body: &str, retry_after: Option<u64>) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unauthorized(format!("HTTP {status}"))
        }
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::NOT_FOUND => {
            StoreError::Conflict(snippet(body))
        }
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited(retry_after.unwrap_or(1)),
        _ => StoreError::Status {
            status: status.as_u16(),
            body: snippet(body),
        },
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}
