use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::dates::{business_date_of, date_label};
use crate::error::{LotMatchError, Result};

pub const COL_STATUS: &str = "Match_Status";
pub const COL_TIME: &str = "Time";
pub const COL_REASON: &str = "Reason";
pub const DEFINED_STATUSES: [&str; 3] = ["Matching", "Missing", "Update needed"];
pub const UNKNOWN: &str = "Unknown";
const ACCURATE_PHRASE: &str = "time is more accurate in apc";
const SNIFF_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 10;

/// Parsed report with canonical header names.
#[derive(Clone, Debug)]
pub struct ReportFrame {
    pub file: String,
    pub delimiter: u8,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportFrame {
    pub fn column_index(&self, name: &str) -> Option<usize> { self.headers.iter().position(|h| h == name) }

    fn missing_required(&self) -> Vec<&'static str> {
        [COL_STATUS, COL_TIME].into_iter().filter(|c| self.column_index(c).is_none()).collect()
    }

    fn cell(&self, row: usize, col: usize) -> &str { self.rows[row].get(col).map(|s| s.as_str()).unwrap_or("") }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TrendRecord {
    pub file: String,
    pub status: String,
    pub reason: Option<String>,
    pub time: String,
    pub business_date: NaiveDate,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Default)]
pub struct TrendBatch {
    pub records: Vec<TrendRecord>,
    pub failed: Vec<SkippedFile>,
    pub dropped_rows: usize,
    pub has_reason: bool,
}

/// Maps the header spellings seen in older exports onto the canonical column names.
pub fn canonical_header(raw: &str) -> String {
    let h = raw.trim();
    match h.to_uppercase().as_str() {
        "NEW COMMENT" | "NEW COMMENTS" | "NEW_COMMENT" | "NEW_COMMENTS" | "REASON" => COL_REASON.to_string(),
        "COMMENT" | "COMMENTS" | "MATCH_STATUS" => COL_STATUS.to_string(),
        "LOT_HOLD_TIME" | "TIME" => COL_TIME.to_string(),
        _ => h.to_string(),
    }
}

/// Picks the candidate delimiter whose per-line count is non-zero on the first line and stays
/// the same on the most following lines.
pub fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).take(SNIFF_LINES).collect();
    let Some(first) = lines.first() else { return b',' };
    let mut best: Option<(u8, usize)> = None;
    for d in SNIFF_CANDIDATES {
        let want = first.bytes().filter(|b| *b == d).count();
        if want == 0 { continue; }
        let score = lines.iter().filter(|l| l.bytes().filter(|b| *b == d).count() == want).count();
        if best.map(|(_, s)| score > s).unwrap_or(true) { best = Some((d, score)); }
    }
    best.map(|(d, _)| d).unwrap_or(b',')
}

fn parse_frame(file: &str, text: &str, delimiter: u8) -> Result<ReportFrame> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(delimiter).flexible(true).has_headers(true).from_reader(text.as_bytes());
    let fail = |e: csv::Error| LotMatchError::FileParseFailed { file: file.to_string(), reason: e.to_string() };
    let headers: Vec<String> = rdr.headers().map_err(fail)?.iter().map(canonical_header).collect();
    let mut rows = vec![];
    for rec in rdr.records() { rows.push(rec.map_err(fail)?.iter().map(|s| s.to_string()).collect()); }
    Ok(ReportFrame { file: file.to_string(), delimiter, headers, rows })
}

/// Reads one exported report. Falls back to ';' when the sniffed delimiter does not expose
/// the required columns; a file still missing them is rejected with the missing names.
pub fn load_report(file: &str, bytes: &[u8]) -> Result<ReportFrame> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    let sniffed = sniff_delimiter(&text);
    let first = parse_frame(file, &text, sniffed);
    if matches!(&first, Ok(f) if f.missing_required().is_empty()) { return first; }
    if sniffed != b';' {
        log::debug!("{}: retrying with ';' delimiter", file);
        if let Ok(f) = parse_frame(file, &text, b';') && f.missing_required().is_empty() { return Ok(f); }
    }
    let f = first?;
    Err(LotMatchError::FileParseFailed { file: file.to_string(), reason: format!("Missing required columns: {}", f.missing_required().join(", ")) })
}

/// Python-style title case: the first letter of every alphabetic run is upper-cased, the rest lowered.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word { out.extend(c.to_lowercase()); } else { out.extend(c.to_uppercase()); }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

pub fn normalize_status(raw: &str) -> String {
    let s = title_case(raw).trim().to_string();
    match s.as_str() {
        "Update Needed" => "Update needed".to_string(),
        _ => s,
    }
}

pub fn normalize_reason(raw: Option<&str>) -> String {
    let Some(r) = raw else { return UNKNOWN.to_string() };
    let c = capitalize(r.trim());
    match c.as_str() { "Nan" | "None" | "" => UNKNOWN.to_string(), _ => c }
}

/// Rows of one frame with a parseable time; returns the records and how many rows were dropped.
pub fn frame_records(frame: &ReportFrame) -> (Vec<TrendRecord>, usize) {
    let (Some(si), Some(ti)) = (frame.column_index(COL_STATUS), frame.column_index(COL_TIME)) else { return (vec![], frame.rows.len()) };
    let ri = frame.column_index(COL_REASON);
    let mut out = vec![];
    let mut dropped = 0usize;
    for row in 0..frame.rows.len() {
        let time = frame.cell(row, ti).trim().to_string();
        let Some(business_date) = business_date_of(&time) else { dropped += 1; continue };
        out.push(TrendRecord {
            file: frame.file.clone(),
            status: normalize_status(frame.cell(row, si)),
            reason: ri.map(|i| frame.cell(row, i).to_string()),
            time,
            business_date,
        });
    }
    (out, dropped)
}

/// Loads every report; bad files land in `failed` and the rest are aggregated.
pub fn process_trend_reports(inputs: &[(String, Vec<u8>)], progress: Option<&dyn Fn(&str)>) -> TrendBatch {
    let mut batch = TrendBatch::default();
    for (name, bytes) in inputs {
        if let Some(p) = progress { p(name); }
        match load_report(name, bytes) {
            Ok(frame) => {
                batch.has_reason |= frame.column_index(COL_REASON).is_some();
                let (recs, dropped) = frame_records(&frame);
                if dropped > 0 { log::debug!("{}: {} rows with unparseable time dropped", name, dropped); }
                log::info!("{}: {} trend rows", name, recs.len());
                batch.records.extend(recs);
                batch.dropped_rows += dropped;
            }
            Err(e) => {
                log::warn!("Skipping trend file: {}", e);
                let reason = match e { LotMatchError::FileParseFailed { reason, .. } => reason, other => other.to_string() };
                batch.failed.push(SkippedFile { file: name.clone(), reason });
            }
        }
    }
    batch
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DailyStatus {
    pub business_date: NaiveDate,
    pub date_label: String,
    pub counts: BTreeMap<String, usize>,
    pub percentages: BTreeMap<String, f64>,
}

/// Per-day status counts; percentages cover the defined statuses and sum to 100 when any are present.
pub fn daily_status(records: &[TrendRecord]) -> Vec<DailyStatus> {
    let mut by_day: BTreeMap<NaiveDate, BTreeMap<String, usize>> = BTreeMap::new();
    for r in records { *by_day.entry(r.business_date).or_default().entry(r.status.clone()).or_insert(0) += 1; }
    by_day.into_iter().map(|(day, counts)| {
        let total: usize = DEFINED_STATUSES.iter().map(|s| counts.get(*s).copied().unwrap_or(0)).sum();
        let percentages = DEFINED_STATUSES.iter().map(|s| {
            let c = counts.get(*s).copied().unwrap_or(0);
            let pct = if total == 0 { 0.0 } else { c as f64 * 100.0 / total as f64 };
            (s.to_string(), pct)
        }).collect();
        DailyStatus { business_date: day, date_label: date_label(day), counts, percentages }
    }).collect()
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReasonCount {
    pub business_date: NaiveDate,
    pub date_label: String,
    pub reason: String,
    pub count: usize,
}

/// Reason counts for Missing / Update needed rows. Empty when no accepted file had a Reason column.
pub fn reason_breakdown(batch: &TrendBatch) -> Vec<ReasonCount> {
    if !batch.has_reason { return vec![]; }
    let mut acc: BTreeMap<(NaiveDate, String), usize> = BTreeMap::new();
    for r in batch.records.iter().filter(|r| r.status == "Missing" || r.status == "Update needed") {
        *acc.entry((r.business_date, normalize_reason(r.reason.as_deref()))).or_insert(0) += 1;
    }
    acc.into_iter().map(|((d, reason), count)| ReasonCount { business_date: d, date_label: date_label(d), reason, count }).collect()
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ApcPerformance {
    pub business_date: NaiveDate,
    pub date_label: String,
    pub total_matching: usize,
    pub accurate_time_count: usize,
    pub performance_pct: f64,
}

pub fn is_accurate_time(reason: Option<&str>) -> bool {
    reason.map(|r| r.to_lowercase().contains(ACCURATE_PHRASE)).unwrap_or(false)
}

pub fn apc_performance(records: &[TrendRecord]) -> Vec<ApcPerformance> {
    let mut acc: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.status == "Matching") {
        let e = acc.entry(r.business_date).or_insert((0, 0));
        e.0 += 1;
        if is_accurate_time(r.reason.as_deref()) { e.1 += 1; }
    }
    acc.into_iter().map(|(d, (total, accurate))| ApcPerformance {
        business_date: d,
        date_label: date_label(d),
        total_matching: total,
        accurate_time_count: accurate,
        performance_pct: accurate as f64 * 100.0 / total as f64,
    }).collect()
}

pub fn statuses_seen(records: &[TrendRecord]) -> Vec<String> {
    let mut set: BTreeSet<String> = records.iter().map(|r| r.status.clone()).collect();
    let mut out: Vec<String> = DEFINED_STATUSES.iter().filter(|s| set.remove(**s)).map(|s| s.to_string()).collect();
    out.extend(set);
    out
}

/// "MMDD_to_MMDD" over the business dates, "history" when there are none.
pub fn trend_suffix(records: &[TrendRecord]) -> String {
    let min = records.iter().map(|r| r.business_date).min();
    let max = records.iter().map(|r| r.business_date).max();
    match (min, max) {
        (Some(a), Some(b)) => format!("{}_to_{}", a.format("%m%d"), b.format("%m%d")),
        _ => "history".to_string(),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TrendSummary {
    pub suffix: String,
    pub files_accepted: usize,
    pub rows: usize,
    pub dropped_rows: usize,
    pub daily_status: Vec<DailyStatus>,
    pub reasons: Vec<ReasonCount>,
    pub apc_performance: Vec<ApcPerformance>,
    pub skipped_files: Vec<SkippedFile>,
}

pub fn summarize(batch: &TrendBatch, files_total: usize) -> TrendSummary {
    TrendSummary {
        suffix: trend_suffix(&batch.records),
        files_accepted: files_total.saturating_sub(batch.failed.len()),
        rows: batch.records.len(),
        dropped_rows: batch.dropped_rows,
        daily_status: daily_status(&batch.records),
        reasons: reason_breakdown(batch),
        apc_performance: apc_performance(&batch.records),
        skipped_files: batch.failed.clone(),
    }
}
