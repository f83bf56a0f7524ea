use crate::error::IngestError;
use crate::governor::RateBudget;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub subreddit: Option<String>, // normalized lowercase, no "r/"
    pub post_limit: usize,
    pub ledger_path: PathBuf,
    pub output_dir: PathBuf,
    pub rate_budget: RateBudget,
    pub page_size: usize,
    pub interval: Duration, // scheduler cadence between runs
    pub progress: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            subreddit: None,
            post_limit: 100,
            ledger_path: PathBuf::from("processed_ids.json"),
            output_dir: PathBuf::from("."),
            rate_budget: RateBudget::default(),
            page_size: crate::walker::MAX_PAGE_SIZE,
            interval: Duration::from_secs(60),
            progress: false,
        }
    }
}

impl IngestOptions {
    pub fn with_subreddit(mut self, sub: impl AsRef<str>) -> Self {
        let s = sub.as_ref().trim().to_lowercase();
        let s = s.strip_prefix("r/").map(str::to_string).unwrap_or(s);
        self.subreddit = Some(s);
        self
    }
    pub fn with_post_limit(mut self, n: usize) -> Self {
        self.post_limit = n;
        self
    }
    pub fn with_ledger_path(mut self, path: impl AsRef<Path>) -> Self {
        self.ledger_path = path.as_ref().to_path_buf();
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_rate_budget(mut self, budget: RateBudget) -> Self {
        self.rate_budget = budget;
        self
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.clamp(1, crate::walker::MAX_PAGE_SIZE);
        self
    }
    pub fn with_interval(mut self, every: Duration) -> Self {
        self.interval = every;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    /// Subreddit and limit are required to start a run.
    pub fn validate(&self) -> Result<&str, IngestError> {
        let sub = self
            .subreddit
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IngestError::Configuration("subreddit name is required".into()))?;
        if self.post_limit == 0 {
            return Err(IngestError::Configuration("post limit must be a positive integer".into()));
        }
        Ok(sub)
    }

    /// Overlay values present in a parsed config file.
    pub fn merge_file(mut self, file: &FileConfig) -> Self {
        let ingest = &file.ingest;
        self = self.with_subreddit(&ingest.subreddit_name).with_post_limit(ingest.num_posts);
        if let Some(p) = &ingest.ledger_path {
            self = self.with_ledger_path(p);
        }
        if let Some(d) = &ingest.output_dir {
            self = self.with_output_dir(d);
        }
        if let Some(secs) = ingest.interval_secs {
            self = self.with_interval(Duration::from_secs(secs));
        }
        if let Some(rate) = &file.rate_limit {
            self = self.with_rate_budget(RateBudget::new(rate.max_calls, Duration::from_secs(rate.window_secs)));
        }
        self
    }
}

/// TOML-backed configuration. Credentials stay in the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub ingest: IngestSection,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestSection {
    pub subreddit_name: String,
    pub num_posts: usize,
    pub ledger_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    pub max_calls: u32,
    pub window_secs: u64,
}

pub fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parse config file {}", path.display()))
}

/// API credentials supplied by the environment (a `.env` file is honored).
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, IngestError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; every value must be present and non-blank.
    pub fn from_lookup(mut get: impl FnMut(&str) -> Option<String>) -> Result<Self, IngestError> {
        let mut missing = Vec::new();
        let mut take = |key: &'static str| match get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            Some(v) => v,
            None => {
                missing.push(key);
                String::new()
            }
        };
        let creds = Self { client_id: take("CLIENT_ID"), client_secret: take("CLIENT_SECRET"), user_agent: take("USER_AGENT") };
        if !missing.is_empty() {
            return Err(IngestError::Configuration(format!("environment variables {} must be set", missing.join(", "))));
        }
        Ok(creds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subreddit_is_normalized() {
        let o = IngestOptions::default().with_subreddit("  r/Rust ");
        assert_eq!(o.subreddit.as_deref(), Some("rust"));
    }

    #[test]
    fn validate_rejects_missing_subreddit_and_zero_limit() {
        assert!(matches!(IngestOptions::default().validate(), Err(IngestError::Configuration(_))));
        let zero = IngestOptions::default().with_subreddit("rust").with_post_limit(0);
        assert!(matches!(zero.validate(), Err(IngestError::Configuration(_))));
        let ok = IngestOptions::default().with_subreddit("rust");
        assert_eq!(ok.validate().unwrap(), "rust");
    }

    #[test]
    fn file_config_overlays_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            [ingest]
            subreddit_name = "programming"
            num_posts = 25
            output_dir = "data"

            [rate_limit]
            max_calls = 30
            window_secs = 60
            "#,
        )
        .unwrap();
        let o = IngestOptions::default().merge_file(&file);
        assert_eq!(o.subreddit.as_deref(), Some("programming"));
        assert_eq!(o.post_limit, 25);
        assert_eq!(o.output_dir, PathBuf::from("data"));
        assert_eq!(o.ledger_path, PathBuf::from("processed_ids.json"));
        assert_eq!(o.rate_budget.max_calls, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<FileConfig, _> = toml::from_str("[ingest]\nsubreddit_name = \"x\"\nnum_posts = 1\nbogus = 2\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn credentials_report_every_missing_key() {
        let err = Credentials::from_lookup(|k| (k == "CLIENT_ID").then(|| "id".to_string())).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("CLIENT_SECRET") && msg.contains("USER_AGENT"), "{msg}");
        assert!(!msg.contains("CLIENT_ID,"));
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let err = Credentials::from_lookup(|_| Some("  ".into())).unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }
}
