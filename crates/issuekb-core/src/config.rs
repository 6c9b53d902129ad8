use issuekb_api::StateFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Where `Config::load` looks when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "configs/settings.toml";

/// Main configuration structure
///
/// Loaded once from a TOML file at startup and never mutated afterwards.
/// The access token may be overridden from the environment or CLI before
/// the value is handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub github: GitHubConfig,
    pub model: ModelConfig,
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Load config from a TOML file. Missing required keys are a config error.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::Error::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the access token, e.g. from `GITHUB_TOKEN`
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.github.access_token = Some(token);
        }
        self
    }

    fn validate(&self) -> crate::Result<()> {
        let repo = self.github.repo.trim();
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(crate::Error::ConfigError(format!(
                "github.repo must look like owner/name, got '{}'",
                self.github.repo
            )));
        }

        if self.model.name.trim().is_empty() {
            return Err(crate::Error::ConfigError("model.name is empty".into()));
        }

        if self.model.embedding_dim == 0 {
            return Err(crate::Error::ConfigError(
                "model.embedding_dim must be positive".into(),
            ));
        }

        if self.cluster.method == ClusterMethod::Partition && self.cluster.n_clusters == 0 {
            return Err(crate::Error::ConfigError(
                "cluster.n_clusters must be positive for the partition method".into(),
            ));
        }

        if self.crawler.per_page == 0 || self.crawler.per_page > 100 {
            return Err(crate::Error::ConfigError(format!(
                "crawler.per_page must be between 1 and 100, got {}",
                self.crawler.per_page
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Repository to crawl, as `owner/name`
    pub repo: String,

    /// GitHub personal access token
    #[serde(default)]
    pub access_token: Option<String>,

    /// API URL (for GitHub Enterprise)
    #[serde(default = "default_github_url")]
    pub api_url: String,
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Embedding model name, e.g. `sentence-transformers/all-MiniLM-L6-v2`
    pub name: String,

    pub embedding_dim: usize,
}

/// Clustering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClusterMethod {
    /// Centroid based, fixed number of clusters (k-means)
    Partition,
    /// Density based, variable number of clusters plus noise (DBSCAN)
    Density,
}

impl ClusterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMethod::Partition => "partition",
            ClusterMethod::Density => "density",
        }
    }
}

impl FromStr for ClusterMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "partition" | "kmeans" | "k-means" => Ok(ClusterMethod::Partition),
            "density" | "dbscan" => Ok(ClusterMethod::Density),
            other => Err(crate::Error::ConfigError(format!(
                "Unsupported clustering method: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ClusterMethod {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<ClusterMethod> for String {
    fn from(method: ClusterMethod) -> Self {
        method.as_str().to_string()
    }
}

impl std::fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub method: ClusterMethod,

    /// Only used by the partition method
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,

    /// Neighbourhood radius for the density method
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// Neighbours (self included) needed for a core point
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_n_clusters() -> usize {
    10
}

fn default_eps() -> f32 {
    0.5
}

fn default_min_samples() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub state: StateFilter,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Pause between page requests, keeps us under the rate limit
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_per_page() -> u32 {
    100 // GitHub's maximum
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            state: StateFilter::default(),
            per_page: default_per_page(),
            page_delay_ms: default_page_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON dump of the crawled issues
    pub raw_data: PathBuf,
    /// Cleaned issue table
    pub processed_data: PathBuf,
    /// Embedding matrix
    pub embeddings: PathBuf,
}
