//! Layered configuration.
//!
//! Figment merges `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_EMBEDDING__API_KEY`). Typed sections
//! are validated up front so a bad setting is reported once, at construction.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::catalog::SourceCatalog;
use crate::error::{Error, Result};
use crate::types::DEFAULT_TOP_K;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self::load_for_env(&env_name))
    }

    pub fn load_for_env(env_name: &str) -> Self {
        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        debug!(env = env_name, "configuration sources merged");
        Self { figment }
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Config(format!("failed to read '{key}': {e}")))
    }

    fn get_or_default<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        if self.figment.contains(key) { self.get(key) } else { Ok(T::default()) }
    }

    /// Extract and validate every section the query service needs.
    pub fn service_config(&self) -> Result<ServiceConfig> {
        if !self.figment.contains("index") {
            return Err(Error::Config("missing required section 'index'".to_string()));
        }
        let config = ServiceConfig {
            embedding: self.get_or_default("embedding")?,
            index: self.get("index")?,
            query: self.get_or_default("query")?,
            sources: self.get_or_default("sources")?,
            logging: self.get_or_default("logging")?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Typed view of everything a query service is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub embedding: EmbeddingSettings,
    pub index: IndexLocator,
    pub query: QuerySettings,
    pub sources: SourceCatalog,
    pub logging: LoggingSettings,
}

impl ServiceConfig {
    pub fn new(embedding: EmbeddingSettings, index: IndexLocator) -> Self {
        Self {
            embedding,
            index,
            query: QuerySettings::default(),
            sources: SourceCatalog::default(),
            logging: LoggingSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        self.index.validate()?;
        self.query.validate()?;
        self.sources.validate()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Fake,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub dimensions: Option<usize>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingSettings {
    pub fn fake(dimensions: usize) -> Self {
        Self { provider: EmbeddingProviderKind::Fake, dimensions: Some(dimensions), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider == EmbeddingProviderKind::OpenAi {
            if self.api_key.trim().is_empty() {
                return Err(Error::Config("missing required setting embedding.api_key".to_string()));
            }
            if self.api_base.trim().is_empty() {
                return Err(Error::Config("missing required setting embedding.api_base".to_string()));
            }
        }
        if self.dimensions == Some(0) {
            return Err(Error::Config("embedding.dimensions must be positive".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for EmbeddingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingSettings")
            .field("provider", &self.provider)
            .field("api_key", &redacted(&self.api_key))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("max_retries", &self.max_retries)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Where the persisted index artifacts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum IndexLocator {
    Local {
        #[serde(default)]
        dir: String,
    },
    Remote(RemoteLocator),
}

impl IndexLocator {
    pub fn local(dir: impl Into<String>) -> Self { IndexLocator::Local { dir: dir.into() } }

    pub fn validate(&self) -> Result<()> {
        match self {
            IndexLocator::Local { dir } if dir.trim().is_empty() => {
                Err(Error::Config("missing required setting index.dir".to_string()))
            }
            IndexLocator::Local { .. } => Ok(()),
            IndexLocator::Remote(remote) => remote.validate(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            IndexLocator::Local { dir } => format!("local:{}", expand_path(dir).display()),
            IndexLocator::Remote(remote) => format!("remote:{}/{}", remote.bucket, remote.prefix),
        }
    }
}

/// Bucket on an S3-compatible object store (Cloudflare R2 by default).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLocator {
    pub bucket: String,
    pub account_id: Option<String>,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub prefix: String,
}

impl Default for RemoteLocator {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            account_id: None,
            endpoint: None,
            region: "auto".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            prefix: String::new(),
        }
    }
}

impl RemoteLocator {
    pub fn validate(&self) -> Result<()> {
        let blank = |s: &str| s.trim().is_empty();
        let mut missing = Vec::new();
        if blank(&self.bucket) { missing.push("index.bucket"); }
        if self.account_id.as_deref().map_or(true, blank) && self.endpoint.as_deref().map_or(true, blank) {
            missing.push("index.account_id (or index.endpoint)");
        }
        if blank(&self.access_key_id) { missing.push("index.access_key_id"); }
        if blank(&self.secret_access_key) { missing.push("index.secret_access_key"); }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing required settings: {}", missing.join(", "))))
        }
    }

    /// Explicit endpoint if set, otherwise the R2 endpoint for `account_id`.
    pub fn endpoint_url(&self) -> Result<String> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            return Ok(endpoint.trim().trim_end_matches('/').to_string());
        }
        match self.account_id.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(account) => Ok(format!("https://{}.r2.cloudflarestorage.com", account.trim())),
            None => Err(Error::Config("missing required settings: index.account_id (or index.endpoint)".to_string())),
        }
    }

    /// Object key for an artifact file name, honoring `prefix`.
    pub fn key_for(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() { file_name.to_string() } else { format!("{prefix}/{file_name}") }
    }
}

impl fmt::Debug for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLocator")
            .field("bucket", &self.bucket)
            .field("account_id", &self.account_id)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub top_k: usize,
    pub overfetch_factor: usize,
    pub diversity_quota: usize,
    pub max_question_chars: usize,
    pub max_context_chars: usize,
    pub preview_chars: usize,
    pub answer_excerpt_chars: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            overfetch_factor: 4,
            diversity_quota: 2,
            max_question_chars: 100,
            max_context_chars: 50,
            preview_chars: 200,
            answer_excerpt_chars: 300,
        }
    }
}

impl QuerySettings {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("query.top_k", self.top_k),
            ("query.overfetch_factor", self.overfetch_factor),
            ("query.diversity_quota", self.diversity_quota),
            ("query.max_question_chars", self.max_question_chars),
            ("query.preview_chars", self.preview_chars),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(Error::Config(format!("{key} must be positive")));
            }
        }
        Ok(())
    }

    /// Candidates to retrieve before diversification for a final `top_k`.
    pub fn breadth_for(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.overfetch_factor.max(1)).max(top_k)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self { Self { level: "info".to_string() } }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "<redacted>" }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
