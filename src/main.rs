//! Build the aggregated leaderboard snapshot from the submission tree.
//!
//! Crawls `submission/<user>/<run_id>/` through the configured source and
//! writes `docs/leaderboard.json` for the leaderboard page to load as its
//! fast path.

use anyhow::{Context, Result};
use std::path::Path;

use wattboard::config::Config;
use wattboard::index;
use wattboard::logging::{log, obj, v_str, Domain, Level};
use wattboard::model::SnapshotDoc;
use wattboard::source::SourceKind;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let source = SourceKind::from_env()
        .build(&cfg)
        .context("building submission source")?;

    log(
        Level::Info,
        Domain::System,
        "build_start",
        obj(&[
            ("source", v_str(&source.describe())),
            ("root", v_str(&cfg.submission_root)),
            ("concurrency", serde_json::json!(cfg.fetch_concurrency)),
        ]),
    );

    let (runs, report) = index::crawl(source.as_ref(), &cfg.submission_root, cfg.fetch_concurrency)
        .await
        .with_context(|| format!("crawling {}", cfg.submission_root))?;

    let doc = SnapshotDoc { runs };
    let out_path = Path::new(&cfg.snapshot_path);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(&doc).context("serializing snapshot")?;
    std::fs::write(out_path, payload)
        .with_context(|| format!("writing {}", out_path.display()))?;

    println!(
        "wrote {} with {} runs ({} skipped, digest {})",
        out_path.display(),
        report.rows,
        report.skipped,
        &report.digest[..12.min(report.digest.len())]
    );
    Ok(())
}
