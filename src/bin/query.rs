//! Run one leaderboard query against a snapshot document.
//!
//! Usage: query [CPU_FILTER] [USER_FILTER] [SORT_KEY] [asc|desc]
//! The snapshot location comes from SNAPSHOT_PATH (default
//! docs/leaderboard.json).

use std::env;

use wattboard::index::parse_snapshot;
use wattboard::query::{query, QueryParams, SortDir, SortKey};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let cpu_filter = args.first().cloned().unwrap_or_default();
    let user_filter = args.get(1).cloned().unwrap_or_default();
    let sort_key = match args.get(2) {
        Some(s) => match SortKey::parse(s) {
            Some(k) => k,
            None => {
                eprintln!(
                    "unknown sort key '{}'; expected one of created, user, \
                     avg_power_w, peak_power_w, energy_wh, cores, threads",
                    s
                );
                std::process::exit(2);
            }
        },
        None => SortKey::Created,
    };
    let sort_dir = match args.get(3).map(String::as_str) {
        Some("asc") => SortDir::Asc,
        _ => SortDir::Desc,
    };

    let snapshot_path =
        env::var("SNAPSHOT_PATH").unwrap_or_else(|_| "docs/leaderboard.json".to_string());
    let bytes = match std::fs::read(&snapshot_path) {
        Ok(b) => b,
        Err(err) => {
            eprintln!("cannot read {}: {}", snapshot_path, err);
            std::process::exit(1);
        }
    };
    let rows = match parse_snapshot(&bytes) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("{} is not a snapshot document: {}", snapshot_path, err);
            std::process::exit(1);
        }
    };

    let params = QueryParams {
        cpu_filter,
        user_filter,
        sort_key,
        sort_dir,
    };
    let result = query(&rows, &params);

    fn print_run(run: &wattboard::model::Run) {
        let fmt = |v: Option<f64>| v.map_or("unknown".to_string(), |x| format!("{:.1}", x));
        println!(
            "  {:<24} {:<16} {:<28} avg {:>8} W  peak {:>8} W  {:>8} Wh",
            run.id,
            run.user,
            run.cpu_label,
            fmt(run.avg_power_w),
            fmt(run.peak_power_w),
            fmt(run.energy_wh),
        );
    }

    match &result.groups {
        Some(groups) => {
            for (day, members) in groups {
                println!("{} ({} runs)", day, members.len());
                for run in members {
                    print_run(run);
                }
            }
        }
        None => {
            for run in &result.rows {
                print_run(run);
            }
        }
    }

    let stats = &result.stats;
    let range = |r: Option<wattboard::model::MetricRange>| {
        r.map_or("[unknown, unknown]".to_string(), |r| {
            format!("[{:.1}, {:.1}]", r.min, r.max)
        })
    };
    println!(
        "{} rows | users {} | cpus {} | nodes {} | avg W {} | peak W {} | Wh {}",
        result.rows.len(),
        stats.users,
        stats.cpus,
        stats.nodes,
        range(stats.avg_power_w),
        range(stats.peak_power_w),
        range(stats.energy_wh),
    );
}
