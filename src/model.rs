//! Canonical row types the query engine operates on.
//!
//! A `Run` is built once per refresh from a raw manifest, held immutably
//! for the lifetime of that refresh, and replaced wholesale by the next
//! one. Every field a submitter can omit is representable as absent here;
//! absence renders as "unknown", never as zero.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed plot slots, in semantic order: power over time, total energy per
/// node, current over time, smoothed voltage. Matching against submitted
/// filenames is case-insensitive.
pub const CANONICAL_IMAGES: [&str; 4] = [
    "power-over-time.png",
    "total-energy-per-node.png",
    "current-over-time.png",
    "smoothed-voltage.png",
];

/// One physical processor package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSocket {
    pub slot: String,
    pub vendor: String,
    pub model: String,
    pub cores: Option<u32>,
    pub threads: Option<u32>,
    pub architecture: String,
    /// Unrecognized manifest fields, carried opaquely.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Energy metrics for one run. Peak below average is tolerated, not
/// rejected; the manifest is the submitter's ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub avg_power_w: Option<f64>,
    pub peak_power_w: Option<f64>,
    pub energy_wh: Option<f64>,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        self.avg_power_w.is_none() && self.peak_power_w.is_none() && self.energy_wh.is_none()
    }
}

/// One normalized leaderboard row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Run {
    /// Render key; unique within one refresh cycle.
    pub id: String,
    /// Stable handle.
    pub user: String,
    /// Human-readable name; falls back to the handle.
    pub user_display: String,
    pub affiliation_name: String,
    pub affiliation_ror: String,
    /// "vendor model" of the first socket, or "unknown".
    pub cpu_label: String,
    /// Totals across sockets; a socket with no count contributes 0.
    pub cores: u32,
    pub threads: u32,
    pub sockets: usize,
    /// Per-socket breakdown, populated only for multi-socket runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub socket_details: Vec<ProcessorSocket>,
    /// Absent is distinct from an explicit "off".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threading_enabled: Option<bool>,
    pub avg_power_w: Option<f64>,
    pub peak_power_w: Option<f64>,
    pub energy_wh: Option<f64>,
    /// ISO-8601 timestamp string, or empty.
    pub created: String,
    /// Publication record link, or empty.
    pub zenodo: String,
    pub node: String,
    /// Always exactly four entries; a missing plot is an empty string in
    /// its fixed slot so the renderer keeps a stable grid.
    pub images: Vec<String>,
}

impl Run {
    /// Re-establish the four-slot image invariant after deserializing a
    /// snapshot that may predate it or have been hand-edited.
    pub fn enforce_image_slots(&mut self) {
        self.images.resize(CANONICAL_IMAGES.len(), String::new());
    }
}

/// The aggregated collection, as written to and read from
/// `docs/leaderboard.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotDoc {
    pub runs: Vec<Run>,
}

/// Inclusive min/max over the rows where a metric is present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

/// Aggregates over one filtered-and-sorted view, not the full collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub users: usize,
    pub cpus: usize,
    pub nodes: usize,
    pub avg_power_w: Option<MetricRange>,
    pub peak_power_w: Option<MetricRange>,
    pub energy_wh: Option<MetricRange>,
}
