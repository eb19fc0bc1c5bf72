/// OAuth access tokens for the BigQuery API
///
/// Either a fixed token from configuration or tokens fetched from the GCE/Cloud Run
/// metadata server, cached until shortly before they expire.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::WarehouseError;

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub enum TokenSource {
    Static(String),
    Metadata(MetadataTokens),
}

impl TokenSource {
    /// Metadata server tokens for the instance's default service account
    pub fn metadata(host: &str) -> Self {
        TokenSource::Metadata(MetadataTokens::new(host))
    }

    /// Current bearer token
    pub async fn token(&self, http: &reqwest::Client) -> Result<String, WarehouseError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata(tokens) => tokens.token(http).await,
        }
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct MetadataTokens {
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokens {
    pub fn new(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}{}", host, TOKEN_PATH)
        } else {
            format!("http://{}{}", host, TOKEN_PATH)
        };

        Self {
            url,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self, http: &reqwest::Client) -> Result<String, WarehouseError> {
        // Held across the fetch so concurrent requests share one refresh
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fetched = self.fetch(http).await?;
        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!("Fetched metadata access token, valid for {}s", fetched.expires_in);

        *cached = Some(CachedToken {
            value: fetched.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(fetched.access_token)
    }

    async fn fetch(&self, http: &reqwest::Client) -> Result<TokenResponse, WarehouseError> {
        let response = http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| WarehouseError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WarehouseError::Auth(format!(
                "metadata server returned {}",
                status.as_u16()
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| WarehouseError::Auth(e.to_string()))
    }
}
