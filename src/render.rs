use comfy_table::{ContentArrangement, Table};
use std::sync::OnceLock;

use crate::reconcile::{LookupMode, Reconciliation};
use crate::table::RawTable;
use crate::trend::{statuses_seen, TrendBatch, TrendSummary, DEFINED_STATUSES};

pub static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout { Lines, Table }

pub fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

pub fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn status_code(status: &str) -> &'static str { match status { "Matching" => "32", "Missing" => "31", "Update needed" => "33", _ => "37" } }

fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

pub fn render_match(left: &RawTable, right: &RawTable, rec: &Reconciliation, layout: Layout, info_width: usize, no_header: bool) {
    if !no_header {
        println!("{}", paint(&format!("Loaded: {} rows (Left) vs {} rows (Right)", left.len(), right.len()), "1;36"));
        let mode = if rec.composite { "lot ID + chart" } else { "lot ID" };
        println!("{} {}", paint("Key:", "1"), mode);
        println!("{}", paint(&format!("Matching: {}  Missing: {}", rec.matched(), rec.missing()), if rec.missing() == 0 { "1;32" } else { "1;33" }));
        if rec.fallback_candidates > 0 { println!("Dotted IDs scanned in Eventlist: {} ({} found)", rec.fallback_candidates, rec.fallback_hits); }
        if left.skipped_rows + right.skipped_rows > 0 { println!("Skipped lines: {} (Left) / {} (Right)", left.skipped_rows, right.skipped_rows); }
    }
    match layout {
        Layout::Lines => {
            if !no_header { println!("{}", paint(&format!("{:<9} {:<20} {:<16} {:<18} {}", "Status", "ID", "Time", "Strategy", "Info"), "1")); }
            for r in &rec.records {
                let info = truncate(left.value_or_na(r.row, "Info"), info_width);
                println!("{} {:<20} {:<16} {:<18} {}", paint(&format!("{:<9}", r.status()), status_code(r.status())), left.value_or_na(r.row, "ID"), left.value_or_na(r.row, "Time"), r.strategy.as_str(), info);
            }
        }
        Layout::Table => {
            let mut table = new_table(vec!["MatchFound".into(), "ID".into(), "Lothold Time".into(), "Strategy".into(), "Info".into()]);
            for r in &rec.records {
                table.add_row(vec![if r.found_in_right { "yes" } else { "no" }.to_string(), left.value_or_na(r.row, "ID").to_string(), left.value_or_na(r.row, "Time").to_string(), r.strategy.as_str().to_string(), truncate(left.value_or_na(r.row, "Info"), info_width)]);
            }
            println!("{}", table);
        }
    }
}

pub fn render_lookup(id: &str, right: &RawTable, mode: LookupMode, rows: &[usize], layout: Layout) {
    println!("{}", paint(&format!("Searching Process Data for: {}", id), "1;36"));
    if rows.is_empty() {
        println!("{}", paint("No record found in Right file.", "1;33"));
        return;
    }
    let mut cols: Vec<&str> = ["ID", "Chart", "Time", "Equipment"].into_iter().filter(|c| right.has_column(c)).collect();
    if mode == LookupMode::Eventlist { cols.push("Eventlist"); }
    match layout {
        Layout::Lines => {
            for r in rows {
                let parts: Vec<String> = cols.iter().map(|c| format!("{}={}", c, right.value_or_na(*r, c))).collect();
                println!("{}", parts.join("  "));
            }
        }
        Layout::Table => {
            let mut table = new_table(cols.iter().map(|c| c.to_string()).collect());
            for r in rows { table.add_row(cols.iter().map(|c| right.value_or_na(*r, c).to_string()).collect::<Vec<_>>()); }
            println!("{}", table);
        }
    }
}

pub fn render_trend(batch: &TrendBatch, summary: &TrendSummary, layout: Layout, no_header: bool) {
    if !summary.skipped_files.is_empty() {
        println!("{}", paint("The following files were skipped:", "1;33"));
        for s in &summary.skipped_files { println!("- {}: {}", s.file, s.reason); }
    }
    if !no_header {
        println!("{}", paint(&format!("Trend {}: {} rows from {} files ({} rows without a usable time)", summary.suffix, summary.rows, summary.files_accepted, summary.dropped_rows), "1;36"));
    }
    if summary.daily_status.is_empty() { println!("{}", paint("No dated rows to aggregate.", "2")); return; }
    let seen = statuses_seen(&batch.records);
    let extra: Vec<&String> = seen.iter().filter(|s| !DEFINED_STATUSES.contains(&s.as_str())).collect();
    println!("{}", paint("Daily Matching vs Missing (%)", "1"));
    match layout {
        Layout::Lines => {
            for d in &summary.daily_status {
                let pcts: Vec<String> = DEFINED_STATUSES.iter().map(|s| format!("{} {:.1}%", s, d.percentages.get(*s).copied().unwrap_or(0.0))).collect();
                let others: Vec<String> = extra.iter().map(|s| format!("{} {}", s, d.counts.get(*s).copied().unwrap_or(0))).collect();
                let tail = if others.is_empty() { String::new() } else { format!("  (other: {})", others.join(", ")) };
                println!("{}  {}{}", d.date_label, pcts.join("  "), tail);
            }
        }
        Layout::Table => {
            let mut header = vec!["Date".to_string()];
            header.extend(DEFINED_STATUSES.iter().map(|s| format!("{} %", s)));
            header.extend(extra.iter().map(|s| s.to_string()));
            let mut table = new_table(header);
            for d in &summary.daily_status {
                let mut row = vec![d.date_label.clone()];
                row.extend(DEFINED_STATUSES.iter().map(|s| format!("{:.1}", d.percentages.get(*s).copied().unwrap_or(0.0))));
                row.extend(extra.iter().map(|s| d.counts.get(*s).copied().unwrap_or(0).to_string()));
                table.add_row(row);
            }
            println!("{}", table);
        }
    }
    if !summary.reasons.is_empty() {
        println!("{}", paint("Missing Reasons", "1"));
        match layout {
            Layout::Lines => { for r in &summary.reasons { println!("{}  {} ({})", r.date_label, r.reason, r.count); } }
            Layout::Table => {
                let mut table = new_table(vec!["Date".into(), "Reason".into(), "Count".into()]);
                for r in &summary.reasons { table.add_row(vec![r.date_label.clone(), r.reason.clone(), r.count.to_string()]); }
                println!("{}", table);
            }
        }
    }
    if !summary.apc_performance.is_empty() {
        println!("{}", paint("APC Time Accuracy", "1"));
        match layout {
            Layout::Lines => { for p in &summary.apc_performance { println!("{}  {}/{} ({:.1}%)", p.date_label, p.accurate_time_count, p.total_matching, p.performance_pct); } }
            Layout::Table => {
                let mut table = new_table(vec!["Date".into(), "Matching".into(), "Accurate".into(), "Performance %".into()]);
                for p in &summary.apc_performance { table.add_row(vec![p.date_label.clone(), p.total_matching.to_string(), p.accurate_time_count.to_string(), format!("{:.1}", p.performance_pct)]); }
                println!("{}", table);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_handles_multibyte() {
        let t = truncate("你好世界", 2);
        assert!(t.starts_with("你好"));
        assert!(t.ends_with("..."));
    }

    #[test]
    fn truncate_ascii() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abcdef", 6), "abcdef");
    }

    #[test]
    fn paint_is_plain_without_color() {
        // ENABLE_COLOR is never set in tests.
        assert_eq!(paint("x", "1"), "x");
    }
}
