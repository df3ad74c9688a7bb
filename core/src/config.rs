//! Client configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ApiError;
use crate::pacing::PacingProfile;

pub const DEFAULT_BASE_URL: &str = "https://habitica.com/api/v3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_CEILING: u32 = 3;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Identity presented to the service on every request.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub user_id: String,
    pub api_key: String,
    #[serde(default)]
    pub client_id: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Credentials {
    pub fn new(base_url: &str, user_id: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            user_id: user_id.to_string(),
            api_key: api_key.to_string(),
            client_id: String::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    /// Read `HABITICA_USER_ID` and `HABITICA_API_KEY`, plus the optional
    /// `HABITICA_URL` and `HABITICA_CLIENT`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let required = |name: &str| lookup(name).ok_or_else(|| ApiError::ConfigError(format!("{name} is not set")));
        let base_url = lookup("HABITICA_URL").unwrap_or_else(default_base_url);
        let credentials = Self::new(&base_url, &required("HABITICA_USER_ID")?, &required("HABITICA_API_KEY")?);
        Ok(match lookup("HABITICA_CLIENT") {
            Some(client_id) => credentials.with_client_id(&client_id),
            None => credentials,
        })
    }

    /// Value of the `x-client` header. Falls back to `<user_id>-habitica-core`.
    pub fn client_header(&self) -> String {
        if self.client_id.is_empty() {
            format!("{}-habitica-core", self.user_id)
        } else {
            self.client_id.clone()
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("api_key", &"<redacted>")
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Retry of reset connections beneath a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl ConnectRetry {
    pub fn disabled() -> Self {
        Self {
            attempts: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before low-level retry `attempt` (0-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << attempt.min(16))
    }
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Everything fixed at client construction besides credentials.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Absolute timeout per dispatch attempt.
    pub timeout: Duration,
    /// Additional attempts allowed after a transient failure.
    pub retry_ceiling: u32,
    pub pacing: PacingProfile,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub connect_retry: ConnectRetry,
}

impl ClientConfig {
    /// Conservative pacing for unattended runs.
    pub fn batch() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            pacing: PacingProfile::batch(),
            cache_dir: default_cache_dir(),
            cache_ttl: DEFAULT_CACHE_TTL,
            connect_retry: ConnectRetry::default(),
        }
    }

    /// Fast pacing for a user at the keyboard.
    pub fn interactive() -> Self {
        Self {
            pacing: PacingProfile::interactive(),
            ..Self::batch()
        }
    }

    pub fn for_mode(batch: bool) -> Self {
        if batch {
            Self::batch()
        } else {
            Self::interactive()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::batch()
    }
}

/// Platform cache directory for this crate.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("habitica-core")
}
