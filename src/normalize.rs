//! RowNormalizer: raw manifest → canonical `Run`.
//!
//! Pure and infallible. Every "optional field / legacy name / missing
//! data" edge case in the submission format is isolated here, so the
//! query engine only ever sees the canonical shape.

use crate::manifest::{RawManifest, RawSocket};
use crate::model::{Metrics, ProcessorSocket, Run, CANONICAL_IMAGES};

/// The four plot locations for one run, in canonical slot order. Missing
/// plots stay as empty strings in their slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSet {
    slots: [String; 4],
}

impl ImageSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a directory listing of `(file name, location)` pairs.
    /// Matching is an exact case-insensitive comparison against the
    /// canonical filenames; anything else in the directory is ignored.
    pub fn from_listing<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut set = Self::default();
        for (name, location) in entries {
            let lower = name.to_lowercase();
            if let Some(slot) = CANONICAL_IMAGES.iter().position(|want| *want == lower) {
                set.slots[slot] = location.to_string();
            }
        }
        set
    }

    pub fn into_slots(self) -> Vec<String> {
        self.slots.into()
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Display-name resolution chain. Adding a new legacy alias means
/// appending one step, nothing else.
fn resolve_display_name(raw: &RawManifest, fallback_user: &str) -> String {
    let author = raw.author.as_ref();
    author
        .and_then(|a| non_empty(&a.display_name))
        .or_else(|| author.and_then(|a| non_empty(&a.name)))
        .or_else(|| author.and_then(|a| non_empty(&a.alternate_name)))
        .or_else(|| non_empty(&raw.username))
        .or_else(|| Some(fallback_user.trim()).filter(|s| !s.is_empty()))
        .unwrap_or("unknown")
        .to_string()
}

/// Handle resolution chain, same construction.
fn resolve_handle(raw: &RawManifest, fallback_user: &str) -> String {
    let author = raw.author.as_ref();
    author
        .and_then(|a| non_empty(&a.handle))
        .or_else(|| author.and_then(|a| non_empty(&a.alternate_name)))
        .or_else(|| non_empty(&raw.username))
        .or_else(|| Some(fallback_user.trim()).filter(|s| !s.is_empty()))
        .unwrap_or("unknown")
        .to_string()
}

/// "vendor model" of the first socket. Sockets past index 0 never
/// contribute to the label, only to the totals.
fn cpu_label(sockets: &[RawSocket]) -> String {
    let Some(first) = sockets.first() else {
        return "unknown".to_string();
    };
    let vendor = non_empty(&first.vendor).unwrap_or("");
    let model = non_empty(&first.model).unwrap_or("");
    let label = format!("{} {}", vendor, model);
    let label = label.trim();
    if label.is_empty() {
        "unknown".to_string()
    } else {
        label.to_string()
    }
}

fn canonical_socket(raw: &RawSocket) -> ProcessorSocket {
    ProcessorSocket {
        slot: raw.slot.clone().unwrap_or_default(),
        vendor: raw.vendor.clone().unwrap_or_default(),
        model: raw.model.clone().unwrap_or_default(),
        cores: raw.cores,
        threads: raw.threads,
        architecture: raw.architecture.clone().unwrap_or_default(),
        extra: raw.extra.clone(),
    }
}

/// Map one raw manifest (plus optional supplementary metrics and the
/// run's plot listing) into a canonical `Run`. Never fails; every
/// missing or malformed field degrades to its documented default.
///
/// `fallback_user` and `fallback_run` are the directory names the crawl
/// found the manifest under; they back the identity fields when the
/// manifest omits them.
///
/// When `override_metrics` is present it replaces the embedded metrics
/// object wholesale — the visualization step may have computed more
/// precise numbers after the manifest was written, and a per-field merge
/// would mix generations.
pub fn normalize(
    raw: &RawManifest,
    fallback_user: &str,
    fallback_run: &str,
    override_metrics: Option<Metrics>,
    images: ImageSet,
) -> Run {
    let sockets = raw.processor.as_deref().unwrap_or(&[]);

    // Totals sum every socket's own counts, absent counting as 0. This
    // under-counts capacity when a socket omits data; the manifest is the
    // ground truth the submitter controls, so it is not corrected.
    let cores: u32 = sockets.iter().map(|s| s.cores.unwrap_or(0)).sum();
    let threads: u32 = sockets.iter().map(|s| s.threads.unwrap_or(0)).sum();

    let socket_details = if sockets.len() > 1 {
        sockets.iter().map(canonical_socket).collect()
    } else {
        Vec::new()
    };

    let metrics = override_metrics
        .unwrap_or_else(|| raw.metrics.as_ref().map(|m| m.to_metrics()).unwrap_or_default());

    let author = raw.author.as_ref();
    Run {
        id: non_empty(&raw.run_id).unwrap_or(fallback_run).to_string(),
        user: resolve_handle(raw, fallback_user),
        user_display: resolve_display_name(raw, fallback_user),
        affiliation_name: author
            .and_then(|a| non_empty(&a.affiliation_name))
            .unwrap_or("")
            .to_string(),
        affiliation_ror: author
            .and_then(|a| non_empty(&a.affiliation_ror))
            .unwrap_or("")
            .to_string(),
        cpu_label: cpu_label(sockets),
        cores,
        threads,
        sockets: sockets.len(),
        socket_details,
        threading_enabled: raw.threading_enabled,
        avg_power_w: metrics.avg_power_w,
        peak_power_w: metrics.peak_power_w,
        energy_wh: metrics.energy_wh,
        created: non_empty(&raw.created).unwrap_or("").to_string(),
        zenodo: non_empty(&raw.zenodo_html).unwrap_or("").to_string(),
        node: non_empty(&raw.node).unwrap_or("").to_string(),
        images: images.into_slots(),
    }
}
