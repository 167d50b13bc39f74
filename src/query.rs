//! QueryEngine: filter, sort, group, aggregate.
//!
//! Pure functions over one immutable snapshot. Everything here is
//! synchronous and cheap enough to re-run on every keystroke.

use chrono::DateTime;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::model::{MetricRange, Run, Stats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Created,
    User,
    AvgPowerW,
    PeakPowerW,
    EnergyWh,
    Cores,
    Threads,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(SortKey::Created),
            "user" => Some(SortKey::User),
            "avg_power_w" => Some(SortKey::AvgPowerW),
            "peak_power_w" => Some(SortKey::PeakPowerW),
            "energy_wh" => Some(SortKey::EnergyWh),
            "cores" => Some(SortKey::Cores),
            "threads" => Some(SortKey::Threads),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct QueryParams {
    pub cpu_filter: String,
    pub user_filter: String,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            cpu_filter: String::new(),
            user_filter: String::new(),
            sort_key: SortKey::Created,
            sort_dir: SortDir::Desc,
        }
    }
}

impl QueryParams {
    /// Grouping is coupled to chronological sort: ungrouped date ordering
    /// under any other key would be visually meaningless.
    pub fn group_by_date(&self) -> bool {
        self.sort_key == SortKey::Created
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<Run>,
    /// Present exactly when sorting by creation date: day-keyed groups in
    /// the same order as `rows`.
    pub groups: Option<Vec<(String, Vec<Run>)>>,
    pub stats: Stats,
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Shared match rule for both the CPU and the user filter: empty matches
/// everything; otherwise case-folded exact match wins, then substring
/// containment, then every whitespace token must appear somewhere in the
/// haystack — "AMD 7950" matches "AMD Ryzen 9 7950X" without word order.
pub fn matches_filter(query: &str, haystack: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    let h = haystack.to_lowercase();
    if h == q {
        return true;
    }
    if h.contains(&q) {
        return true;
    }
    q.split_whitespace().all(|token| h.contains(token))
}

/// The user filter matches on either the display name or the handle.
pub fn user_matches(query: &str, run: &Run) -> bool {
    matches_filter(query, &run.user_display) || matches_filter(query, &run.user)
}

fn row_matches(run: &Run, params: &QueryParams) -> bool {
    matches_filter(&params.cpu_filter, &run.cpu_label) && user_matches(&params.user_filter, run)
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn created_ts(run: &Run) -> i64 {
    // missing or unparseable timestamps sort as epoch zero
    DateTime::parse_from_rfc3339(&run.created)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

fn user_sort_label(run: &Run) -> String {
    let label = if run.user_display.is_empty() {
        &run.user
    } else {
        &run.user_display
    };
    label.to_lowercase()
}

fn numeric_value(run: &Run, key: SortKey) -> Option<f64> {
    match key {
        SortKey::AvgPowerW => run.avg_power_w,
        SortKey::PeakPowerW => run.peak_power_w,
        SortKey::EnergyWh => run.energy_wh,
        SortKey::Cores => Some(f64::from(run.cores)),
        SortKey::Threads => Some(f64::from(run.threads)),
        SortKey::Created | SortKey::User => None,
    }
}

fn directional(ordering: Ordering, dir: SortDir) -> Ordering {
    match dir {
        SortDir::Asc => ordering,
        SortDir::Desc => ordering.reverse(),
    }
}

fn compare(a: &Run, b: &Run, key: SortKey, dir: SortDir) -> Ordering {
    match key {
        SortKey::Created => directional(created_ts(a).cmp(&created_ts(b)), dir),
        SortKey::User => directional(user_sort_label(a).cmp(&user_sort_label(b)), dir),
        _ => {
            // Absent numeric values go to the tail regardless of
            // direction: a row with no power reading must never pose as
            // the lowest-power run.
            match (numeric_value(a, key), numeric_value(b, key)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    directional(x.partial_cmp(&y).unwrap_or(Ordering::Equal), dir)
                }
            }
        }
    }
}

/// Stable sort; ties keep their prior relative order.
pub fn sort_runs(rows: &mut [Run], key: SortKey, dir: SortDir) {
    rows.sort_by(|a, b| compare(a, b, key, dir));
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Calendar-day label of a creation timestamp.
pub fn day_label(created: &str) -> String {
    DateTime::parse_from_rfc3339(created)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| "Unknown date".to_string())
}

/// Partition already-sorted rows by calendar day, preserving both group
/// order and row order within each group. Call only on rows sorted by
/// `created`, where same-day rows are adjacent.
pub fn group_by_day(rows: &[Run]) -> Vec<(String, Vec<Run>)> {
    let mut groups: Vec<(String, Vec<Run>)> = Vec::new();
    for run in rows {
        let label = day_label(&run.created);
        match groups.last_mut() {
            Some((last, members)) if *last == label => members.push(run.clone()),
            _ => groups.push((label, vec![run.clone()])),
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

fn metric_range<F>(rows: &[Run], get: F) -> Option<MetricRange>
where
    F: Fn(&Run) -> Option<f64>,
{
    let mut range: Option<MetricRange> = None;
    for v in rows.iter().filter_map(get) {
        range = Some(match range {
            None => MetricRange { min: v, max: v },
            Some(r) => MetricRange {
                min: r.min.min(v),
                max: r.max.max(v),
            },
        });
    }
    range
}

/// Aggregates over the filtered view. Empty input yields zero counts and
/// absent ranges, never an error.
pub fn stats(rows: &[Run]) -> Stats {
    let mut users: HashSet<&str> = HashSet::new();
    let mut cpus: HashSet<&str> = HashSet::new();
    let mut nodes: HashSet<&str> = HashSet::new();
    for run in rows {
        users.insert(run.user.as_str());
        cpus.insert(run.cpu_label.as_str());
        if !run.node.is_empty() {
            nodes.insert(run.node.as_str());
        }
    }
    Stats {
        users: users.len(),
        cpus: cpus.len(),
        nodes: nodes.len(),
        avg_power_w: metric_range(rows, |r| r.avg_power_w),
        peak_power_w: metric_range(rows, |r| r.peak_power_w),
        energy_wh: metric_range(rows, |r| r.energy_wh),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one query against a snapshot: filter, sort, optionally group,
/// aggregate. Synchronous and side-effect free.
pub fn query(rows: &[Run], params: &QueryParams) -> QueryResult {
    let mut out: Vec<Run> = rows
        .iter()
        .filter(|r| row_matches(r, params))
        .cloned()
        .collect();
    sort_runs(&mut out, params.sort_key, params.sort_dir);
    let stats = stats(&out);
    let groups = params.group_by_date().then(|| group_by_day(&out));
    QueryResult {
        rows: out,
        groups,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str) -> Run {
        Run {
            id: id.to_string(),
            user: id.to_string(),
            user_display: id.to_string(),
            cpu_label: "unknown".to_string(),
            images: vec![String::new(); 4],
            ..Run::default()
        }
    }

    // ==========================================================================
    // Filter rule
    // ==========================================================================

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches_filter("", "anything"));
        assert!(matches_filter("   ", "anything"));
        assert!(matches_filter("", ""));
    }

    #[test]
    fn test_exact_and_substring_matches() {
        assert!(matches_filter("AMD EPYC 7543", "amd epyc 7543"));
        assert!(matches_filter("epyc", "AMD EPYC 7543"));
        assert!(!matches_filter("xeon", "AMD EPYC 7543"));
    }

    #[test]
    fn test_token_match_is_conjunctive_and_order_free() {
        assert!(matches_filter("7950 amd", "AMD Ryzen 9 7950X"));
        assert!(matches_filter("amd 7950", "AMD Ryzen 9 7950X"));
        assert!(!matches_filter("amd 7950", "Intel Xeon 7950"));
        assert!(!matches_filter("amd 7950", "AMD Ryzen 9 5950X"));
    }

    #[test]
    fn test_user_filter_checks_display_and_handle() {
        let mut r = run("r1");
        r.user = "agreen".to_string();
        r.user_display = "Alice Green".to_string();
        assert!(user_matches("alice", &r));
        assert!(user_matches("agreen", &r));
        assert!(!user_matches("bob", &r));
    }

    // ==========================================================================
    // Sort rule
    // ==========================================================================

    #[test]
    fn test_created_missing_sorts_as_epoch_zero() {
        let mut rows = vec![run("undated"), run("dated")];
        rows[1].created = "2025-09-08T10:00:00Z".to_string();
        sort_runs(&mut rows, SortKey::Created, SortDir::Asc);
        assert_eq!(rows[0].id, "undated");
        sort_runs(&mut rows, SortKey::Created, SortDir::Desc);
        assert_eq!(rows[0].id, "dated");
    }

    #[test]
    fn test_user_sort_case_folded() {
        let mut rows = vec![run("b"), run("a"), run("c")];
        rows[0].user_display = "bob".to_string();
        rows[1].user_display = "Alice".to_string();
        rows[2].user_display = "CARL".to_string();
        sort_runs(&mut rows, SortKey::User, SortDir::Asc);
        let order: Vec<&str> = rows.iter().map(|r| r.user_display.as_str()).collect();
        assert_eq!(order, vec!["Alice", "bob", "CARL"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut rows = vec![run("first"), run("second"), run("third")];
        for r in rows.iter_mut() {
            r.energy_wh = Some(5.0);
        }
        sort_runs(&mut rows, SortKey::EnergyWh, SortDir::Desc);
        let order: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    // ==========================================================================
    // Grouping
    // ==========================================================================

    #[test]
    fn test_day_label() {
        assert_eq!(day_label("2025-09-08T23:59:59Z"), "2025-09-08");
        assert_eq!(day_label(""), "Unknown date");
        assert_eq!(day_label("yesterday"), "Unknown date");
    }

    #[test]
    fn test_grouping_only_with_created_sort() {
        let rows = vec![run("r1")];
        let grouped = query(
            &rows,
            &QueryParams {
                sort_key: SortKey::Created,
                ..QueryParams::default()
            },
        );
        assert!(grouped.groups.is_some());

        let flat = query(
            &rows,
            &QueryParams {
                sort_key: SortKey::EnergyWh,
                ..QueryParams::default()
            },
        );
        assert!(flat.groups.is_none());
    }

    // ==========================================================================
    // Stats
    // ==========================================================================

    #[test]
    fn test_stats_counts_distinct_values() {
        let mut rows = vec![run("r1"), run("r2"), run("r3")];
        rows[0].user = "alice".to_string();
        rows[1].user = "alice".to_string();
        rows[2].user = "bob".to_string();
        rows[0].cpu_label = "AMD EPYC 7543".to_string();
        rows[1].cpu_label = "AMD EPYC 7543".to_string();
        rows[2].cpu_label = "Intel Xeon 8380".to_string();
        rows[0].node = "loadgen1".to_string();
        // rows[1] and rows[2] leave node empty; empty is not a node
        let s = stats(&rows);
        assert_eq!(s.users, 2);
        assert_eq!(s.cpus, 2);
        assert_eq!(s.nodes, 1);
    }

    #[test]
    fn test_stats_ranges_ignore_absent() {
        let mut rows = vec![run("r1"), run("r2"), run("r3")];
        rows[0].avg_power_w = Some(100.0);
        rows[2].avg_power_w = Some(250.0);
        let s = stats(&rows);
        assert_eq!(
            s.avg_power_w,
            Some(MetricRange {
                min: 100.0,
                max: 250.0
            })
        );
        assert_eq!(s.peak_power_w, None);
    }
}
