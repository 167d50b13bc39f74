//! Submission-tree access: list directories, read files.
//!
//! The engine only ever needs these two verbs. The hosted backend speaks
//! the GitHub contents API; the local backend walks the same
//! `submission/<user>/<run_id>/` layout on disk. Errors are typed so the
//! index builder can tell "this run is gone" from "the service is down".

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("unexpected status {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("malformed payload at {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("transport failure for {path}: {reason}")]
    Transport { path: String, reason: String },
}

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One directory-listing entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Direct fetch location when the backend provides one.
    pub download_url: Option<String>,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// The two verbs the index builder consumes.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    async fn list(&self, path: &str) -> SourceResult<Vec<DirEntry>>;
    async fn read(&self, path: &str) -> SourceResult<Vec<u8>>;
    /// Short human-readable identity for logs.
    fn describe(&self) -> String;
}

/// Backend selector, env-driven.
#[derive(Debug, Clone, Copy)]
pub enum SourceKind {
    Github,
    Local,
}

impl SourceKind {
    pub fn from_env() -> Self {
        match std::env::var("SUBMISSION_SOURCE")
            .unwrap_or_else(|_| "github".to_string())
            .as_str()
        {
            "local" => SourceKind::Local,
            _ => SourceKind::Github,
        }
    }

    pub fn build(self, cfg: &Config) -> SourceResult<Box<dyn SubmissionSource>> {
        match self {
            SourceKind::Github => Ok(Box::new(GithubSource::new(cfg)?)),
            SourceKind::Local => {
                let root = std::env::var("SUBMISSION_DIR").unwrap_or_else(|_| ".".to_string());
                Ok(Box::new(LocalDirSource::new(root)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GitHub contents API backend
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ContentsEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct ContentsFile {
    content: Option<String>,
    encoding: Option<String>,
    download_url: Option<String>,
}

pub struct GithubSource {
    client: Client,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    api_base: String,
}

impl GithubSource {
    pub fn new(cfg: &Config) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(|e| SourceError::Transport {
                path: cfg.api_base.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            owner: cfg.owner.clone(),
            repo: cfg.repo.clone(),
            branch: cfg.branch.clone(),
            token: cfg.token.clone(),
            api_base: cfg.api_base.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> SourceResult<Url> {
        let raw = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            path
        );
        let mut url = Url::parse(&raw).map_err(|e| SourceError::Malformed {
            path: path.to_string(),
            reason: format!("bad contents url: {}", e),
        })?;
        url.query_pairs_mut().append_pair("ref", &self.branch);
        Ok(url)
    }

    async fn contents(&self, path: &str) -> SourceResult<serde_json::Value> {
        let url = self.contents_url(path)?;
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "wattboard");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let resp = req.send().await.map_err(|e| SourceError::Transport {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        match resp.status().as_u16() {
            404 => return Err(SourceError::NotFound(path.to_string())),
            401 | 403 => return Err(SourceError::Forbidden(path.to_string())),
            s if !resp.status().is_success() => {
                return Err(SourceError::Status {
                    path: path.to_string(),
                    status: s,
                })
            }
            _ => {}
        }

        resp.json().await.map_err(|e| SourceError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_raw(&self, path: &str, url: &str) -> SourceResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", "wattboard")
            .send()
            .await
            .map_err(|e| SourceError::Transport {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                path: path.to_string(),
                status: resp.status().as_u16(),
            });
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SourceError::Transport {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl SubmissionSource for GithubSource {
    async fn list(&self, path: &str) -> SourceResult<Vec<DirEntry>> {
        let value = self.contents(path).await?;
        let entries: Vec<ContentsEntry> =
            serde_json::from_value(value).map_err(|_| SourceError::Malformed {
                path: path.to_string(),
                reason: "expected a directory listing".to_string(),
            })?;
        Ok(entries
            .into_iter()
            .map(|e| DirEntry {
                kind: if e.kind == "dir" {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                },
                name: e.name,
                download_url: e.download_url,
            })
            .collect())
    }

    async fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
        let value = self.contents(path).await?;
        let file: ContentsFile =
            serde_json::from_value(value).map_err(|_| SourceError::Malformed {
                path: path.to_string(),
                reason: "expected a file object".to_string(),
            })?;

        // Inline payload first; the API base64-encodes file bodies.
        if let (Some(content), Some("base64")) = (&file.content, file.encoding.as_deref()) {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            return base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| SourceError::Malformed {
                    path: path.to_string(),
                    reason: format!("bad base64 payload: {}", e),
                });
        }

        // Large files come without inline content; follow the raw URL.
        match &file.download_url {
            Some(url) => self.fetch_raw(path, url).await,
            None => Err(SourceError::Malformed {
                path: path.to_string(),
                reason: "no content and no download url".to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("github:{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

// ---------------------------------------------------------------------------
// Local directory backend
// ---------------------------------------------------------------------------

pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != "..") {
            full.push(part);
        }
        full
    }

    fn map_io(path: &str, err: std::io::Error) -> SourceError {
        match err.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => SourceError::Forbidden(path.to_string()),
            _ => SourceError::Transport {
                path: path.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl SubmissionSource for LocalDirSource {
    async fn list(&self, path: &str) -> SourceResult<Vec<DirEntry>> {
        let full = self.resolve(path);
        let mut dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| Self::map_io(path, e))?;
        let mut out = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| Self::map_io(path, e))? {
            let file_type = entry.file_type().await.map_err(|e| Self::map_io(path, e))?;
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind: if file_type.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                },
                download_url: None,
            });
        }
        // read_dir order is platform-dependent; make listings stable
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| Self::map_io(path, e))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_url_shape() {
        let cfg = Config {
            owner: "acme".to_string(),
            repo: "energy".to_string(),
            branch: "main".to_string(),
            token: None,
            api_base: "https://api.github.com".to_string(),
            submission_root: "submission".to_string(),
            snapshot_path: "docs/leaderboard.json".to_string(),
            fetch_concurrency: 4,
            http_timeout_secs: 5,
        };
        let src = GithubSource::new(&cfg).unwrap();
        let url = src.contents_url("submission/alice/run-1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/energy/contents/submission/alice/run-1?ref=main"
        );
    }

    #[test]
    fn test_local_resolve_ignores_traversal() {
        let src = LocalDirSource::new("/srv/sub");
        let resolved = src.resolve("alice/../../etc/passwd");
        assert_eq!(resolved, PathBuf::from("/srv/sub/alice/etc/passwd"));
    }

    #[tokio::test]
    async fn test_local_list_and_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alice")).unwrap();
        std::fs::write(dir.path().join("alice/manifest.json"), b"{}").unwrap();

        let src = LocalDirSource::new(dir.path());
        let top = src.list("").await.unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].is_dir());
        assert_eq!(top[0].name, "alice");

        let inner = src.list("alice").await.unwrap();
        assert_eq!(inner.len(), 1);
        assert!(inner[0].is_file());

        let bytes = src.read("alice/manifest.json").await.unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_local_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let src = LocalDirSource::new(dir.path());
        match src.list("nope").await {
            Err(SourceError::NotFound(p)) => assert_eq!(p, "nope"),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
        match src.read("nope/manifest.json").await {
            Err(SourceError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }
}
