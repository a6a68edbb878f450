use std::io::Write;
use std::path::Path;

use crate::dates::report_filename;
use crate::reconcile::Reconciliation;
use crate::table::RawTable;
use crate::trend::{statuses_seen, TrendBatch, TrendSummary, DEFINED_STATUSES};

pub const REPORT_COLUMNS: [&str; 5] = ["Match_Status", "ID", "Time", "Info", "Match_Strategy"];

/// One output row per left record, in left order.
pub fn report_rows(left: &RawTable, rec: &Reconciliation) -> Vec<[String; 5]> {
    rec.records.iter().map(|r| [
        r.status().to_string(),
        left.value_or_na(r.row, "ID").to_string(),
        left.value_or_na(r.row, "Time").to_string(),
        left.value_or_na(r.row, "Info").to_string(),
        r.strategy.as_str().to_string(),
    ]).collect()
}

/// Export name derived from the left table's times: `matching_report_MMDD.csv`.
pub fn report_name(left: &RawTable) -> String { report_filename(left.column("Time")) }

pub fn write_report<W: Write>(w: W, left: &RawTable, rec: &Reconciliation) -> Result<(), std::io::Error> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(REPORT_COLUMNS)?;
    for row in report_rows(left, rec) { wtr.write_record(&row)?; }
    wtr.flush()?;
    Ok(())
}

pub fn write_report_file(path: &Path, left: &RawTable, rec: &Reconciliation) -> Result<(), std::io::Error> {
    write_report(std::fs::File::create(path)?, left, rec)
}

pub fn write_daily_status<W: Write>(w: W, batch: &TrendBatch, summary: &TrendSummary) -> Result<(), std::io::Error> {
    let seen = statuses_seen(&batch.records);
    let mut wtr = csv::Writer::from_writer(w);
    let mut header: Vec<String> = vec!["Business_Date".to_string(), "Date_Label".to_string()];
    header.extend(DEFINED_STATUSES.iter().map(|s| format!("{} %", s)));
    header.extend(seen.iter().map(|s| format!("{} count", s)));
    wtr.write_record(&header)?;
    for day in &summary.daily_status {
        let mut row = vec![day.business_date.format("%Y-%m-%d").to_string(), day.date_label.clone()];
        row.extend(DEFINED_STATUSES.iter().map(|s| format!("{:.1}", day.percentages.get(*s).copied().unwrap_or(0.0))));
        row.extend(seen.iter().map(|s| day.counts.get(s).copied().unwrap_or(0).to_string()));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_reasons<W: Write>(w: W, summary: &TrendSummary) -> Result<(), std::io::Error> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(["Business_Date", "Date_Label", "Reason", "Count"])?;
    for r in &summary.reasons {
        wtr.write_record([r.business_date.format("%Y-%m-%d").to_string(), r.date_label.clone(), r.reason.clone(), r.count.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_apc_performance<W: Write>(w: W, summary: &TrendSummary) -> Result<(), std::io::Error> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(["Business_Date", "Date_Label", "Total_Matching", "Accurate_Time_Count", "Performance %"])?;
    for p in &summary.apc_performance {
        wtr.write_record([p.business_date.format("%Y-%m-%d").to_string(), p.date_label.clone(), p.total_matching.to_string(), p.accurate_time_count.to_string(), format!("{:.1}", p.performance_pct)])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the three trend tables into `dir`; returns the paths written.
pub fn write_trend_tables(dir: &Path, batch: &TrendBatch, summary: &TrendSummary) -> Result<Vec<std::path::PathBuf>, std::io::Error> {
    std::fs::create_dir_all(dir)?;
    let status_path = dir.join(format!("Trend_{}.csv", summary.suffix));
    write_daily_status(std::fs::File::create(&status_path)?, batch, summary)?;
    let mut written = vec![status_path];
    if !summary.reasons.is_empty() {
        let p = dir.join(format!("MissingReasons_trend_{}.csv", summary.suffix));
        write_reasons(std::fs::File::create(&p)?, summary)?;
        written.push(p);
    }
    if !summary.apc_performance.is_empty() {
        let p = dir.join(format!("ApcPerformance_{}.csv", summary.suffix));
        write_apc_performance(std::fs::File::create(&p)?, summary)?;
        written.push(p);
    }
    Ok(written)
}
