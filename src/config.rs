//! Environment-driven configuration.
//!
//! Defaults mirror what the CI publishing workflow exports, so running
//! inside an action needs no extra setup.

#[derive(Debug, Clone)]
pub struct Config {
    /// Repository owner, from the `owner/repo` pair in `GITHUB_REPOSITORY`.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to read the submission tree from.
    pub branch: String,
    /// Optional bearer token, passed through verbatim.
    pub token: Option<String>,
    pub api_base: String,
    /// Root directory of the submission tree, `submission/<user>/<run_id>/`.
    pub submission_root: String,
    /// Where the aggregated snapshot document is written / read.
    pub snapshot_path: String,
    /// Parallel in-flight run loads during a live crawl.
    pub fetch_concurrency: usize,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let repository = std::env::var("GITHUB_REPOSITORY").unwrap_or_default();
        let owner = repository.split('/').next().unwrap_or("").to_string();
        let repo = repository.split('/').last().unwrap_or("").to_string();
        Self {
            owner,
            repo,
            branch: std::env::var("GITHUB_REF_NAME").unwrap_or_else(|_| "main".to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            submission_root: std::env::var("SUBMISSION_ROOT")
                .unwrap_or_else(|_| "submission".to_string()),
            snapshot_path: std::env::var("SNAPSHOT_PATH")
                .unwrap_or_else(|_| "docs/leaderboard.json".to_string()),
            fetch_concurrency: std::env::var("FETCH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or_else(default_concurrency),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

// Capped so a wide machine does not burn through the API rate limit.
fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, 8)
}
