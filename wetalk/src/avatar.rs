//! Random avatar lookup.
//!
//! Asks a public avatar service for a random image URL once at join time.
//! The lookup is best-effort: any failure yields the configured placeholder
//! so joining never blocks on it.

use std::time::Duration;

use serde::Deserialize;

/// Default avatar service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://v2.xxapi.cn/api/head";

/// Avatar used whenever the lookup is disabled or fails.
pub const DEFAULT_PLACEHOLDER: &str = "https://via.placeholder.com/32?text=%F0%9F%91%A4";

/// Success code reported by the avatar service.
const SERVICE_OK: i64 = 200;

/// Avatar lookup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarConfig {
    /// Whether to contact the avatar service at all.
    pub enabled: bool,
    /// JSON endpoint returning `{ "code": 200, "data": "<url>" }`.
    pub endpoint: String,
    /// Fallback avatar.
    pub placeholder: String,
    /// Overall request timeout.
    pub timeout: Duration,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum AvatarError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned code {0}")]
    Service(i64),

    #[error("service returned no avatar")]
    Missing,
}

#[derive(Debug, Deserialize)]
struct AvatarResponse {
    code: i64,
    #[serde(default)]
    data: Option<String>,
}

impl AvatarResponse {
    fn into_avatar(self) -> Result<String, AvatarError> {
        if self.code != SERVICE_OK {
            return Err(AvatarError::Service(self.code));
        }
        self.data
            .filter(|url| !url.trim().is_empty())
            .ok_or(AvatarError::Missing)
    }
}

/// Fetches a random avatar URL, falling back to the placeholder.
pub async fn fetch_random_avatar(config: &AvatarConfig) -> String {
    if !config.enabled {
        return config.placeholder.clone();
    }
    match try_fetch(config).await {
        Ok(url) => {
            tracing::debug!(avatar = %url, "random avatar fetched");
            url
        }
        Err(e) => {
            tracing::warn!(error = %e, endpoint = %config.endpoint, "avatar lookup failed, using placeholder");
            config.placeholder.clone()
        }
    }
}

async fn try_fetch(config: &AvatarConfig) -> Result<String, AvatarError> {
    let client = reqwest::Client::builder().timeout(config.timeout).build()?;
    let response = client
        .get(&config.endpoint)
        .send()
        .await?
        .error_for_status()?
        .json::<AvatarResponse>()
        .await?;
    response.into_avatar()
}
