use std::fmt;

use anyhow::Result;
use serde::Deserialize;

use crate::channel::ChannelConfig;

/// API credential for the recognition service.
///
/// Resolved once at startup and injected into the session controller; the
/// pipeline never looks it up ad hoc. Debug output is redacted so the key
/// cannot leak into logs.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw key, for building the connection request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(****)")
    }
}

fn default_endpoint() -> String {
    ChannelConfig::default().endpoint
}

fn default_model() -> String {
    ChannelConfig::default().model
}

fn default_language() -> String {
    ChannelConfig::default().language
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Recognition service API key
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Default directory for exported transcripts
    #[serde(default)]
    pub export_dir: Option<String>,
}

impl Config {
    /// Load configuration from an optional TOML file layered under process
    /// environment variables (`LIVESCRIBE_*`, e.g. `LIVESCRIBE_API_KEY`),
    /// with `DEEPGRAM_API_KEY` accepted as a fallback for the credential.
    ///
    /// A missing credential is not an error here: the session surfaces it at
    /// `start()` with a setup prompt instead of failing silently at load.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("config/livescribe").required(false)),
        };

        builder = builder.add_source(config::Environment::with_prefix("LIVESCRIBE"));

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        if cfg.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            cfg.api_key = std::env::var("DEEPGRAM_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        Ok(cfg)
    }

    /// The resolved credential, if one is configured.
    pub fn credential(&self) -> Option<Credential> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(Credential::new)
    }

    /// Channel parameters with any configured overrides applied.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            language: self.language.clone(),
            ..ChannelConfig::default()
        }
    }
}
