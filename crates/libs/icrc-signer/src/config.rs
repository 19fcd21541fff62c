use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use icrc_agent::polling::millis;
use icrc_agent::{Agent, AgentConfig, AgentError, HttpTransport, Identity, RootKey};
use serde::Deserialize;

use crate::builders::BuilderStrings;
use crate::sessions::DEFAULT_SESSION_VALIDITY;

pub const DEFAULT_HOST: &str = "https://icp-api.io";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Replica endpoint the agent's [`HttpTransport`] talks to.
    pub host: String,
    #[serde(with = "millis")]
    pub session_validity: Duration,
    /// Language requested for ICRC-21 consent messages.
    pub language: String,
    pub agent: AgentConfig,
    pub strings: BuilderStrings,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            session_validity: DEFAULT_SESSION_VALIDITY,
            language: "en".to_string(),
            agent: AgentConfig::default(),
            strings: BuilderStrings::default(),
        }
    }
}

impl SignerConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    /// Builds the signing agent for `host` with the configured expiry, skew
    /// and polling. A local replica's root key is fetched when none is
    /// pinned; any other host needs `root_key`.
    pub async fn build_agent(
        &self,
        identity: Arc<dyn Identity>,
        root_key: Option<RootKey>,
    ) -> Result<Agent, AgentError> {
        let transport = HttpTransport::new(&self.host)?;
        let root_key = match root_key {
            Some(root_key) => root_key,
            None if transport.is_local() => {
                log::debug!("signer(config): fetching root key from {}", transport.base_url());
                transport.fetch_root_key().await?
            }
            None => return Err(AgentError::MissingRootKey),
        };
        Ok(Agent::builder(Arc::new(transport), identity)
            .root_key(root_key)
            .config(self.agent.clone())
            .build())
    }
}
