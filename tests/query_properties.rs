//! Query-engine contract tests: the properties a presenter may rely on.

use std::collections::HashSet;

use wattboard::autocomplete::{Key, SuggestField, SuggestPanel};
use wattboard::model::Run;
use wattboard::query::{query, sort_runs, QueryParams, SortDir, SortKey};

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

fn sample_rows() -> Vec<Run> {
    let mut rows = Vec::new();

    let mut r = run("run-1");
    r.user = "agreen".to_string();
    r.user_display = "Alice Green".to_string();
    r.cpu_label = "AMD Ryzen 9 7950X".to_string();
    r.energy_wh = Some(5.0);
    r.avg_power_w = Some(120.0);
    r.node = "loadgen1".to_string();
    r.created = "2025-09-08T10:00:00Z".to_string();
    rows.push(r);

    let mut r = run("run-2");
    r.user = "bblue".to_string();
    r.user_display = "Bob Blue".to_string();
    r.cpu_label = "Intel Xeon 7950".to_string();
    r.energy_wh = None;
    r.node = "loadgen2".to_string();
    r.created = "2025-09-08T23:00:00Z".to_string();
    rows.push(r);

    let mut r = run("run-3");
    r.user = "agreen".to_string();
    r.user_display = "Alice Green".to_string();
    r.cpu_label = "AMD Ryzen 9 5950X".to_string();
    r.energy_wh = Some(1.0);
    r.avg_power_w = Some(95.0);
    r.node = "loadgen1".to_string();
    r.created = "2025-09-09T01:00:00Z".to_string();
    rows.push(r);

    rows
}

// ---------------------------------------------------------------------------
// P1: the result is always a subset, never an invention
// ---------------------------------------------------------------------------
#[test]
fn p1_result_is_subset() {
    let rows = sample_rows();
    let params = QueryParams {
        cpu_filter: "amd".to_string(),
        ..QueryParams::default()
    };
    let result = query(&rows, &params);
    assert!(result.rows.len() <= rows.len());
    let ids: HashSet<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    for r in &result.rows {
        assert!(ids.contains(r.id.as_str()), "{} not in input", r.id);
    }
}

// ---------------------------------------------------------------------------
// P2: filtering an already-filtered view by the same string is idempotent
// ---------------------------------------------------------------------------
#[test]
fn p2_filter_idempotent() {
    let rows = sample_rows();
    let params = QueryParams {
        cpu_filter: "amd".to_string(),
        user_filter: "alice".to_string(),
        ..QueryParams::default()
    };
    let once = query(&rows, &params);
    let twice = query(&once.rows, &params);
    let ids_once: Vec<&str> = once.rows.iter().map(|r| r.id.as_str()).collect();
    let ids_twice: Vec<&str> = twice.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids_once, ids_twice);
}

// ---------------------------------------------------------------------------
// P3: absent numeric values sort to the tail in both directions
// ---------------------------------------------------------------------------
#[test]
fn p3_absent_numeric_values_at_tail() {
    let mut rows = vec![run("five"), run("absent"), run("one")];
    rows[0].energy_wh = Some(5.0);
    rows[1].energy_wh = None;
    rows[2].energy_wh = Some(1.0);

    let mut desc = rows.clone();
    sort_runs(&mut desc, SortKey::EnergyWh, SortDir::Desc);
    let order: Vec<&str> = desc.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(order, vec!["five", "one", "absent"]);

    let mut asc = rows.clone();
    sort_runs(&mut asc, SortKey::EnergyWh, SortDir::Asc);
    let order: Vec<&str> = asc.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(order, vec!["one", "five", "absent"]);
}

// ---------------------------------------------------------------------------
// P4: conjunctive token filter on the CPU label
// ---------------------------------------------------------------------------
#[test]
fn p4_cpu_token_filter() {
    let rows = sample_rows();
    let params = QueryParams {
        cpu_filter: "amd 7950".to_string(),
        ..QueryParams::default()
    };
    let result = query(&rows, &params);
    let ids: Vec<&str> = result.rows.iter().map(|r| r.id.as_str()).collect();
    // matches "AMD Ryzen 9 7950X"; rejects the Xeon 7950 (no "amd") and
    // the Ryzen 5950X (no "7950")
    assert_eq!(ids, vec!["run-1"]);
}

// ---------------------------------------------------------------------------
// P5: date grouping, descending: two groups in order, newest first
// ---------------------------------------------------------------------------
#[test]
fn p5_date_grouping_descending() {
    let rows = sample_rows();
    let params = QueryParams {
        sort_key: SortKey::Created,
        sort_dir: SortDir::Desc,
        ..QueryParams::default()
    };
    let result = query(&rows, &params);
    let groups = result.groups.expect("created sort must group");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].0, "2025-09-09");
    assert_eq!(groups[0].1.len(), 1);
    assert_eq!(groups[1].0, "2025-09-08");
    assert_eq!(groups[1].1.len(), 2);
    // within-group order follows the overall sort
    assert_eq!(groups[1].1[0].id, "run-2");
    assert_eq!(groups[1].1[1].id, "run-1");
}

// ---------------------------------------------------------------------------
// P6: stats over an empty filtered view
// ---------------------------------------------------------------------------
#[test]
fn p6_stats_empty_view() {
    let rows = sample_rows();
    let params = QueryParams {
        cpu_filter: "sparc".to_string(),
        ..QueryParams::default()
    };
    let result = query(&rows, &params);
    assert!(result.rows.is_empty());
    let s = result.stats;
    assert_eq!(s.users, 0);
    assert_eq!(s.cpus, 0);
    assert_eq!(s.nodes, 0);
    assert!(s.avg_power_w.is_none());
    assert!(s.peak_power_w.is_none());
    assert!(s.energy_wh.is_none());
}

// ---------------------------------------------------------------------------
// P7: autocomplete highlight stays within bounds
// ---------------------------------------------------------------------------
#[test]
fn p7_autocomplete_highlight_bounds() {
    for field in [SuggestField::Cpu, SuggestField::User] {
        let mut panel = SuggestPanel::new(field);
        panel.on_focus(&sample_rows(), "");
        assert_eq!(panel.highlight(), Some(0));

        // pressing up at the top leaves the highlight at the top
        panel.on_key(Key::Up);
        assert_eq!(panel.highlight(), Some(0));

        let last = panel.candidates().len() - 1;
        for _ in 0..panel.candidates().len() * 2 {
            panel.on_key(Key::Down);
        }
        assert_eq!(panel.highlight(), Some(last));
    }
}

// ---------------------------------------------------------------------------
// P8: stats cover exactly the filtered view, not the full collection
// ---------------------------------------------------------------------------
#[test]
fn p8_stats_follow_filter() {
    let rows = sample_rows();
    let params = QueryParams {
        user_filter: "alice".to_string(),
        ..QueryParams::default()
    };
    let result = query(&rows, &params);
    assert_eq!(result.rows.len(), 2);
    let s = result.stats;
    assert_eq!(s.users, 1);
    assert_eq!(s.cpus, 2);
    assert_eq!(s.nodes, 1);
    let avg = s.avg_power_w.expect("both alice runs carry avg power");
    assert_eq!(avg.min, 95.0);
    assert_eq!(avg.max, 120.0);
}

// ---------------------------------------------------------------------------
// P9: unknown-date rows form their own group, placed by the epoch-zero rule
// ---------------------------------------------------------------------------
#[test]
fn p9_unknown_date_group() {
    let mut rows = sample_rows();
    rows.push(run("undated"));
    let params = QueryParams {
        sort_key: SortKey::Created,
        sort_dir: SortDir::Desc,
        ..QueryParams::default()
    };
    let result = query(&rows, &params);
    let groups = result.groups.expect("grouped");
    let last = groups.last().expect("non-empty");
    // epoch zero sorts oldest, so descending puts the unknown group last
    assert_eq!(last.0, "Unknown date");
    assert_eq!(last.1.len(), 1);
    assert_eq!(last.1[0].id, "undated");

    let asc = query(
        &rows,
        &QueryParams {
            sort_key: SortKey::Created,
            sort_dir: SortDir::Asc,
            ..QueryParams::default()
        },
    );
    let groups = asc.groups.expect("grouped");
    assert_eq!(groups.first().expect("non-empty").0, "Unknown date");
}
