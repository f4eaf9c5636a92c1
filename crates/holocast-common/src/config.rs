use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::helpers::normalize_server_url;
use crate::{Error, Result};

pub const DEFAULT_SERVER_URL: &str = "https://api.heygen.com";
pub const DEFAULT_AVATAR_ID: &str = "c928ca11c4c54082a66f6693ec4b1b09";
/// Pure green, matching the compositor's default key.
pub const DEFAULT_BACKGROUND: &str = "#00FF00";

/// Stream quality requested from the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::config(format!("unknown quality `{other}`"))),
        }
    }
}

/// Everything needed to ask the avatar provider for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub server_url: String,
    pub avatar_id: String,
    pub voice_id: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub quality: Quality,
    pub background: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            avatar_id: DEFAULT_AVATAR_ID.to_string(),
            voice_id: None,
            knowledge_base_id: None,
            quality: Quality::default(),
            background: Some(DEFAULT_BACKGROUND.to_string()),
        }
    }
}

impl ProviderConfig {
    /// Normalise the server URL and reject configurations the provider can never accept.
    pub fn validate(mut self) -> Result<Self> {
        self.server_url = normalize_server_url(&self.server_url);
        let url = url::Url::parse(&self.server_url)
            .map_err(|e| Error::config(format!("invalid server url `{}`: {e}", self.server_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "server url must be http(s), got `{}`",
                url.scheme()
            )));
        }

        self.avatar_id = self.avatar_id.trim().to_string();
        if self.avatar_id.is_empty() {
            return Err(Error::config("avatar id must not be empty"));
        }

        self.voice_id = non_blank("voice_id", self.voice_id);
        self.knowledge_base_id = non_blank("knowledge_base_id", self.knowledge_base_id);
        self.background = non_blank("background", self.background);
        debug!(
            "provider config: server={} avatar={} quality={}",
            self.server_url,
            self.avatar_id,
            self.quality.as_str()
        );
        Ok(self)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.server_url, path.trim_start_matches('/'))
    }
}

fn non_blank(field: &str, value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        debug!("ignoring blank {}", field);
        return None;
    }
    Some(trimmed.to_string())
}
