//! HTTP adapter for the mod catalog.
//!
//! Fetches `GET mods/{modId}` on every resolve, so a price change is visible
//! on the next cart refresh. The last snapshot seen for each mod is kept in a
//! `moka` cache and only stands in while the catalog is unreachable. A 404
//! evicts the entry.

use std::sync::Arc;

use async_trait::async_trait;
use modmarket_core::{CurrencyCode, ModId, ModSnapshot, Price};
use moka::future::Cache;
use reqwest::{StatusCode, header};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{instrument, warn};
use url::Url;

use super::{CatalogError, CatalogResolver};
use crate::config::{CartConfig, CatalogCacheConfig};

/// Client for the marketplace catalog API.
#[derive(Clone)]
pub struct HttpCatalog {
    inner: Arc<HttpCatalogInner>,
}

struct HttpCatalogInner {
    client: reqwest::Client,
    mods_url: Url,
    cache: Option<Cache<ModId, ModSnapshot>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModWire {
    title: String,
    price: Decimal,
    discount_price: Option<Decimal>,
    thumbnail_url: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    currency: CurrencyCode,
}

impl HttpCatalog {
    /// Create a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CartConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .build()?;
        Ok(Self::with_client(client, &config.api_url, config.catalog_cache))
    }

    /// Create a catalog client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: &Url,
        cache_config: CatalogCacheConfig,
    ) -> Self {
        let cache = (!cache_config.ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(cache_config.capacity)
                .time_to_live(cache_config.ttl)
                .build()
        });

        let mods_url = base_url.join("mods/").unwrap_or_else(|_| base_url.clone());

        Self {
            inner: Arc::new(HttpCatalogInner {
                client,
                mods_url,
                cache,
            }),
        }
    }

    async fn fetch(&self, mod_id: ModId) -> Result<Option<ModSnapshot>, CatalogError> {
        let url = self
            .inner
            .mods_url
            .join(&mod_id.to_string())
            .map_err(|e| CatalogError::Invalid {
                mod_id,
                reason: format!("invalid URL: {e}"),
            })?;

        let response = self
            .inner
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(mod_id = %mod_id, "Mod no longer exists in catalog");
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let wire: ModWire = serde_json::from_str(&body)?;
        into_snapshot(mod_id, wire).map(Some)
    }
}

#[async_trait]
impl CatalogResolver for HttpCatalog {
    #[instrument(skip(self), fields(mod_id = %mod_id))]
    async fn resolve(&self, mod_id: ModId) -> Result<Option<ModSnapshot>, CatalogError> {
        let Some(cache) = &self.inner.cache else {
            return self.fetch(mod_id).await;
        };

        match self.fetch(mod_id).await {
            Ok(Some(snapshot)) => {
                cache.insert(mod_id, snapshot.clone()).await;
                Ok(Some(snapshot))
            }
            Ok(None) => {
                cache.invalidate(&mod_id).await;
                Ok(None)
            }
            Err(e) if e.is_unavailable() => match cache.get(&mod_id).await {
                Some(snapshot) => {
                    warn!(error = %e, "Catalog unavailable; using last known snapshot");
                    Ok(Some(snapshot))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

/// Validate and convert a catalog payload.
fn into_snapshot(mod_id: ModId, wire: ModWire) -> Result<ModSnapshot, CatalogError> {
    let invalid = |e: modmarket_core::PriceError| CatalogError::Invalid {
        mod_id,
        reason: e.to_string(),
    };

    let price = Price::try_new(wire.price, wire.currency).map_err(invalid)?;
    let discount_price = wire
        .discount_price
        .map(|amount| Price::try_new(amount, wire.currency))
        .transpose()
        .map_err(invalid)?;

    Ok(ModSnapshot {
        title: wire.title,
        price,
        discount_price,
        thumbnail_url: wire.thumbnail_url,
        category: wire.category,
    })
}
