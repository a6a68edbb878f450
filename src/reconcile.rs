use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::table::RawTable;

static CHART_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"SMCchart\s+(.+?)\s+-\s+Lot").ok());

pub const STATUS_MATCHING: &str = "Matching";
pub const STATUS_MISSING: &str = "Missing";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    ExactKey,
    CompositeKey,
    SubstringFallback,
    #[serde(rename = "none")]
    Unmatched,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self { MatchStrategy::ExactKey => "exact-key", MatchStrategy::CompositeKey => "composite-key", MatchStrategy::SubstringFallback => "substring-fallback", MatchStrategy::Unmatched => "none" }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReconciledRecord {
    pub row: usize,
    pub key: String,
    pub composite_key: Option<String>,
    pub found_in_right: bool,
    pub strategy: MatchStrategy,
}

impl ReconciledRecord {
    pub fn status(&self) -> &'static str { if self.found_in_right { STATUS_MATCHING } else { STATUS_MISSING } }
}

#[derive(Clone, Debug, Serialize)]
pub struct Reconciliation {
    pub records: Vec<ReconciledRecord>,
    pub composite: bool,
    pub fallback_candidates: usize,
    pub fallback_hits: usize,
}

impl Reconciliation {
    pub fn matched(&self) -> usize { self.records.iter().filter(|r| r.found_in_right).count() }
    pub fn missing(&self) -> usize { self.records.len() - self.matched() }
}

pub fn normalize_key(id: &str) -> String { id.trim().to_uppercase() }

/// Chart name embedded in a hold comment as "SMCchart <token> - Lot".
pub fn extract_chart_token(info: &str) -> Option<String> {
    CHART_TOKEN.as_ref()?.captures(info).and_then(|c| c.get(1)).map(|m| m.as_str().trim().to_string())
}

pub fn normalize_chart(chart: &str) -> String {
    let c = chart.trim();
    if c == "nan" { String::new() } else { c.to_uppercase() }
}

fn composite(key: &str, chart: &str) -> String { format!("{}|{}", key, chart) }

/// Annotates every left row with whether the right table holds it.
///
/// Keys are upper-cased trimmed IDs. When the left table has an `Info` column and the right one a
/// `Chart` column, the key is extended with the chart name (extracted from the left comment), so a lot
/// only matches on the same chart. Left IDs containing "." that are still unmatched are then searched
/// for inside the right `Eventlist` text; `observer` receives the number of such IDs before the scan.
/// The scan only ever turns a miss into a match.
pub fn reconcile(left: &RawTable, right: &RawTable, observer: Option<&dyn Fn(usize)>) -> Reconciliation {
    let use_composite = left.has_column("Info") && right.has_column("Chart");
    let left_ids = left.column("ID");
    let left_info = left.column("Info");
    let right_ids = right.column("ID");
    let right_charts = right.column("Chart");

    let right_keys: HashSet<String> = right_ids.iter().enumerate().map(|(i, id)| {
        let key = normalize_key(id);
        if use_composite { composite(&key, &normalize_chart(right_charts[i])) } else { key }
    }).collect();

    let mut records: Vec<ReconciledRecord> = left_ids.iter().enumerate().map(|(i, id)| {
        let key = normalize_key(id);
        let composite_key = if use_composite {
            let chart = extract_chart_token(left_info[i]).map(|c| c.to_uppercase()).unwrap_or_default();
            Some(composite(&key, &chart))
        } else { None };
        let found = right_keys.contains(composite_key.as_ref().unwrap_or(&key));
        let strategy = match (found, use_composite) { (false, _) => MatchStrategy::Unmatched, (true, true) => MatchStrategy::CompositeKey, (true, false) => MatchStrategy::ExactKey };
        ReconciledRecord { row: i, key, composite_key, found_in_right: found, strategy }
    }).collect();

    let candidates: Vec<usize> = records.iter().filter(|r| !r.found_in_right && left_ids[r.row].contains('.')).map(|r| r.row).collect();
    let mut hits = 0usize;
    if !candidates.is_empty() && right.has_column("Eventlist") {
        if let Some(notify) = observer { notify(candidates.len()); }
        log::debug!("scanning right Eventlist for {} dotted IDs", candidates.len());
        let events: Vec<String> = right.column("Eventlist").iter().map(|e| e.to_lowercase()).collect();
        for row in &candidates {
            let needle = left_ids[*row].to_lowercase();
            if events.iter().any(|e| e.contains(&needle)) {
                records[*row].found_in_right = true;
                records[*row].strategy = MatchStrategy::SubstringFallback;
                hits += 1;
            }
        }
    }
    let rec = Reconciliation { records, composite: use_composite, fallback_candidates: candidates.len(), fallback_hits: hits };
    log::info!("reconciled {} left rows: {} matching, {} missing ({} via eventlist)", rec.records.len(), rec.matched(), rec.missing(), hits);
    rec
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LookupMode { Key, Eventlist }

/// Right rows that back a left ID: Eventlist substring search for dotted IDs, exact key otherwise.
pub fn lookup_right(id: &str, right: &RawTable) -> (LookupMode, Vec<usize>) {
    if id.contains('.') && right.has_column("Eventlist") {
        let needle = id.to_lowercase();
        let rows = right.column("Eventlist").iter().enumerate().filter(|(_, e)| e.to_lowercase().contains(&needle)).map(|(i, _)| i).collect();
        return (LookupMode::Eventlist, rows);
    }
    let key = normalize_key(id);
    let rows = right.column("ID").iter().enumerate().filter(|(_, r)| normalize_key(r) == key).map(|(i, _)| i).collect();
    (LookupMode::Key, rows)
}
