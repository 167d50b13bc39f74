//! IndexBuilder: populate the in-memory `Run` collection.
//!
//! Two paths. The fast path parses a pre-aggregated snapshot document.
//! The live path crawls `root/<user>/<run_id>/` with bounded parallelism,
//! reading and normalizing each run independently: one broken run is
//! skipped and logged, never aborting the build. Nothing is cached across
//! refreshes; each refresh re-derives truth from source.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::manifest::{parse_supplementary_metrics, RawManifest};
use crate::model::Run;
use crate::normalize::{normalize, ImageSet};
use crate::retry::{retry_source, RetryConfig};
use crate::source::{SourceError, SourceResult, SubmissionSource};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ENERGY_DIR: &str = "energy";
pub const SUPPLEMENTARY_METRICS: &str = "metrics.json";

/// Outcome summary of one refresh, for logs only — never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub rows: usize,
    /// Runs whose manifest could not be read or parsed.
    pub skipped: usize,
    /// SHA-256 over the serialized collection, for provenance in logs.
    pub digest: String,
    pub elapsed_ms: u64,
}

/// Parse a snapshot document, re-establishing row invariants.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<Run>, serde_json::Error> {
    let doc: crate::model::SnapshotDoc = serde_json::from_slice(bytes)?;
    let mut runs = doc.runs;
    for run in &mut runs {
        run.enforce_image_slots();
    }
    Ok(runs)
}

/// Deterministic content digest of a collection.
pub fn snapshot_digest(runs: &[Run]) -> String {
    let bytes = serde_json::to_vec(runs).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Fast path: fetch and parse the aggregated snapshot. This is the one
/// read that retries; its failure is fatal for the refresh.
pub async fn fetch_snapshot(
    source: &dyn SubmissionSource,
    path: &str,
    retry: &RetryConfig,
) -> SourceResult<Vec<Run>> {
    let bytes = retry_source(retry, "snapshot_fetch", || source.read(path)).await?;
    parse_snapshot(&bytes).map_err(|e| SourceError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

struct RunRef {
    user: String,
    run: String,
    path: String,
}

/// Load one run end to end. `None` means the run is excluded from this
/// refresh; the reason is already logged.
async fn load_run(source: &dyn SubmissionSource, run: &RunRef) -> Option<Run> {
    let manifest_path = format!("{}/{}", run.path, MANIFEST_FILE);
    let bytes = match source.read(&manifest_path).await {
        Ok(b) => b,
        Err(e) => {
            log(
                Level::Warn,
                Domain::Index,
                "run_skipped",
                obj(&[
                    ("path", v_str(&manifest_path)),
                    ("error", v_str(&e.to_string())),
                ]),
            );
            return None;
        }
    };
    let raw = match RawManifest::parse(&bytes) {
        Ok(r) => r,
        Err(e) => {
            log(
                Level::Warn,
                Domain::Index,
                "run_skipped",
                obj(&[
                    ("path", v_str(&manifest_path)),
                    ("error", v_str(&format!("unreadable manifest: {}", e))),
                ]),
            );
            return None;
        }
    };

    // Optional, fails soft: absent or unreadable falls back to the
    // manifest's embedded metrics.
    let supplementary_path = format!("{}/{}/{}", run.path, ENERGY_DIR, SUPPLEMENTARY_METRICS);
    let override_metrics = match source.read(&supplementary_path).await {
        Ok(b) => parse_supplementary_metrics(&b),
        Err(_) => None,
    };

    let energy_path = format!("{}/{}", run.path, ENERGY_DIR);
    let images = match source.list(&energy_path).await {
        Ok(entries) => {
            let pairs: Vec<(String, String)> = entries
                .iter()
                .filter(|e| e.is_file() && e.name.to_lowercase().ends_with(".png"))
                .map(|e| {
                    let location = e
                        .download_url
                        .clone()
                        .unwrap_or_else(|| format!("{}/{}", energy_path, e.name));
                    (e.name.clone(), location)
                })
                .collect();
            ImageSet::from_listing(pairs.iter().map(|(n, l)| (n.as_str(), l.as_str())))
        }
        Err(_) => ImageSet::empty(),
    };

    Some(normalize(&raw, &run.user, &run.run, override_metrics, images))
}

/// Live path: two-level fan-out (users, then runs per user) with bounded
/// parallelism. Only the top-level listing is fatal. Returned order is
/// crawl insertion order; the query engine owns user-visible ordering.
pub async fn crawl(
    source: &dyn SubmissionSource,
    root: &str,
    concurrency: usize,
) -> SourceResult<(Vec<Run>, RefreshReport)> {
    let started = Instant::now();
    let width = concurrency.max(1);

    let users: Vec<String> = source
        .list(root)
        .await?
        .into_iter()
        .filter(|e| e.is_dir())
        .map(|e| e.name)
        .collect();

    let run_refs: Vec<RunRef> = stream::iter(users)
        .map(|user| {
            let user_path = format!("{}/{}", root, user);
            async move {
                match source.list(&user_path).await {
                    Ok(entries) => entries
                        .into_iter()
                        .filter(|e| e.is_dir())
                        .map(|e| RunRef {
                            path: format!("{}/{}", user_path, e.name),
                            run: e.name,
                            user: user.clone(),
                        })
                        .collect::<Vec<_>>(),
                    Err(e) => {
                        log(
                            Level::Warn,
                            Domain::Index,
                            "user_listing_failed",
                            obj(&[
                                ("path", v_str(&user_path)),
                                ("error", v_str(&e.to_string())),
                            ]),
                        );
                        Vec::new()
                    }
                }
            }
        })
        .buffered(width)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flatten()
        .collect();

    let total = run_refs.len();
    let rows: Vec<Run> = stream::iter(run_refs.iter())
        .map(|r| load_run(source, r))
        .buffered(width)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flatten()
        .collect();

    let report = RefreshReport {
        rows: rows.len(),
        skipped: total - rows.len(),
        digest: snapshot_digest(&rows),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    log(
        Level::Info,
        Domain::Index,
        "refresh_complete",
        obj(&[
            ("source", v_str(&source.describe())),
            ("rows", serde_json::json!(report.rows)),
            ("skipped", serde_json::json!(report.skipped)),
            ("digest", v_str(&report.digest)),
            ("elapsed_ms", serde_json::json!(report.elapsed_ms)),
        ]),
    );
    Ok((rows, report))
}
