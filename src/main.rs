use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use is_terminal::IsTerminal;
mod columns;
mod dates;
mod decode;
mod error;
mod export;
mod file_scan;
mod reconcile;
mod render;
mod scan;
mod table;
mod trend;

use crate::columns::{default_left_spec, default_right_spec, load_column_specs, ColumnSpec};
use crate::reconcile::{lookup_right, reconcile, LookupMode, Reconciliation};
use crate::render::{paint, Layout, ENABLE_COLOR};
use crate::table::RawTable;
use crate::trend::{process_trend_reports, summarize, SkippedFile, TrendSummary};

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum OutputFmt { Text, Json }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum TextFormat { Lines, Table }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "LotMatch",
    about = "Reconciles hold logs against APC process logs and trends past reports",
    long_about = "Reconciles a hold log (left) against one or more APC/process logs (right) exported as loosely structured CSV, explains which lots match and by which key, and consolidates previously exported matching reports into daily trends.",
    after_long_help = "Examples:\n  LotMatch --left hold.csv --right apc.csv\n  LotMatch -l hold.csv -r apc1.csv,apc2.csv --export-dir out\n  LotMatch -l hold.csv -r apc.csv --lookup A123.4 --text-format table\n  LotMatch --trend-dir reports --trend-glob 'matching_report_*.csv' --output json",
    color = ColorChoice::Auto
)]
struct Args {
    /// Hold log (left side)
    #[arg(long, short = 'l')]
    left: Option<String>,
    /// One or more process/APC logs (right side)
    #[arg(long, short = 'r', num_args = 0.., value_delimiter = ',')]
    right: Vec<String>,
    /// Previously exported matching reports to consolidate
    #[arg(long, short = 't', num_args = 0.., value_delimiter = ',')]
    trend: Vec<String>,
    #[arg(long)]
    trend_dir: Option<String>,
    #[arg(long)]
    trend_glob: Option<String>,
    #[arg(long, default_value_t = false)]
    trend_recursive: bool,
    /// Path to JSON column registry (default: built-in aliases, or $LOTMATCH_COLUMNS_PATH)
    #[arg(long)]
    columns: Option<String>,
    /// Show the right-side records behind a left lot ID
    #[arg(long)]
    lookup: Option<String>,
    #[arg(long)]
    report_path: Option<String>,
    #[arg(long, short = 'd')]
    export_dir: Option<String>,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
    #[arg(long, value_enum, default_value = "lines")]
    text_format: TextFormat,
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    #[arg(long, default_value_t = 60)]
    info_width: usize,
    #[arg(long, default_value_t = false)]
    no_header: bool,
    #[arg(long, default_value_t = false, help = "Exit with status 1 when any left lot is missing")]
    fail_on_missing: bool,
    #[arg(long, default_value_t = false)]
    progress: bool,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
    #[arg(long)]
    config: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            left: None,
            right: vec![],
            trend: vec![],
            trend_dir: None,
            trend_glob: None,
            trend_recursive: false,
            columns: None,
            lookup: None,
            report_path: None,
            export_dir: None,
            output: OutputFmt::Text,
            text_format: TextFormat::Lines,
            json_path: None,
            info_width: 60,
            no_header: false,
            fail_on_missing: false,
            progress: false,
            no_color: false,
            force_color: false,
            log_level: None,
            log_format: None,
            log_path: None,
            verbose: 0,
            quiet: false,
            completions: None,
            completions_out: None,
            config: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct AppConfig {
    left: Option<String>,
    right: Option<Vec<String>>,
    trend_dir: Option<String>,
    trend_glob: Option<String>,
    trend_recursive: Option<bool>,
    columns: Option<String>,
    export_dir: Option<String>,
    output: Option<OutputFmt>,
    text_format: Option<TextFormat>,
    info_width: Option<usize>,
    progress: Option<bool>,
    force_color: Option<bool>,
    fail_on_missing: Option<bool>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
}

#[derive(Serialize)]
struct MatchRow { status: &'static str, id: String, time: String, info: String, strategy: &'static str }

#[derive(Serialize)]
struct MatchOutput {
    left: String,
    right: String,
    left_rows: usize,
    right_rows: usize,
    skipped_lines: usize,
    composite_key: bool,
    matching: usize,
    missing: usize,
    eventlist_scanned: usize,
    eventlist_found: usize,
    report_name: String,
    right_failures: Vec<String>,
    rows: Vec<MatchRow>,
}

#[derive(Serialize)]
struct LookupOutput { id: String, mode: LookupMode, records: Vec<serde_json::Map<String, serde_json::Value>> }

#[derive(Serialize, Default)]
struct RunOutput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matching: Option<MatchOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lookup: Option<LookupOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trend: Option<TrendSummary>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "LotMatch", &mut f); } else { clap_complete::generate(sh, &mut cmd, "LotMatch", &mut std::io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "LotMatch", &mut std::io::stdout());
        }
        return;
    }
    let cfg_path = args.config.clone().unwrap_or_else(|| "LotMatch.toml".to_string());
    if let Ok(s) = std::fs::read_to_string(&cfg_path) {
        match toml::from_str::<AppConfig>(&s) {
            Ok(cfg) => apply_config(&mut args, cfg),
            Err(e) => eprintln!("Ignoring config {}: {}", cfg_path, e),
        }
    }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let enable_color = if args.force_color { true } else { color_default && !args.no_color };
    let _ = ENABLE_COLOR.set(enable_color);
    if args.left.is_none() && args.trend.is_empty() && args.trend_dir.is_none() {
        eprintln!("Nothing to do: pass --left/--right to reconcile or --trend/--trend-dir to consolidate reports (see --help).");
        std::process::exit(2);
    }
    match run(&args) {
        Ok(missing) => { if args.fail_on_missing && missing > 0 { std::process::exit(1); } }
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{}", paint(&format!("Error: {:#}", e), "1;31"));
            std::process::exit(2);
        }
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().to_rfc3339();
                    let obj = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.left.is_none() && let Some(v) = cfg.left { args.left = Some(v); }
    if args.right.is_empty() && let Some(v) = cfg.right { args.right = v; }
    if args.trend_dir.is_none() && let Some(v) = cfg.trend_dir { args.trend_dir = Some(v); }
    if args.trend_glob.is_none() && let Some(v) = cfg.trend_glob { args.trend_glob = Some(v); }
    if let Some(v) = cfg.trend_recursive { args.trend_recursive = args.trend_recursive || v; }
    if args.columns.is_none() && let Some(v) = cfg.columns { args.columns = Some(v); }
    if args.export_dir.is_none() && let Some(v) = cfg.export_dir { args.export_dir = Some(v); }
    if args.output == OutputFmt::Text && let Some(v) = cfg.output { args.output = v; }
    if args.text_format == TextFormat::Lines && let Some(v) = cfg.text_format { args.text_format = v; }
    if args.info_width == 60 && let Some(v) = cfg.info_width { args.info_width = v; }
    if let Some(v) = cfg.progress { args.progress = args.progress || v; }
    if let Some(v) = cfg.force_color { args.force_color = args.force_color || v; }
    if let Some(v) = cfg.fail_on_missing { args.fail_on_missing = args.fail_on_missing || v; }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path { args.log_path = Some(v); }
}

fn column_specs(args: &Args) -> (ColumnSpec, ColumnSpec) {
    let cfg = load_column_specs(args.columns.as_deref()).unwrap_or_default();
    (cfg.left.unwrap_or_else(default_left_spec), cfg.right.unwrap_or_else(default_right_spec))
}

fn layout(args: &Args) -> Layout { match args.text_format { TextFormat::Lines => Layout::Lines, TextFormat::Table => Layout::Table } }

fn read_input(path: &str) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path))?;
    Ok((file_label(path), bytes))
}

fn file_label(path: &str) -> String {
    Path::new(path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string())
}

/// Returns the number of missing left lots.
fn run(args: &Args) -> Result<usize> {
    let mut out = RunOutput::default();
    let text = args.output == OutputFmt::Text;
    let mut missing = 0usize;
    if let Some(left_path) = args.left.as_ref() {
        let (left_spec, right_spec) = column_specs(args);
        if args.right.is_empty() { anyhow::bail!("--left needs at least one --right file"); }
        let mut right_inputs = vec![];
        for p in &args.right {
            match read_input(p) {
                Ok(input) => right_inputs.push(input),
                Err(e) => report_error(&mut out, text, &format!("Right File Error: {:#}", e)),
            }
        }
        let left = match scan::scan_file(Path::new(left_path), &file_label(left_path), &left_spec) {
            Ok(t) => Some(t),
            Err(e) => { report_error(&mut out, text, &format!("Left File Error: {}", e)); None }
        };
        let (right, failures) = scan::scan_many(&right_inputs, &right_spec);
        for f in &failures { report_error(&mut out, text, &format!("Right File Error: {}", f)); }
        if let (Some(left), Some(right)) = (left, right) {
            let notify = |n: usize| log::info!("detected {} complex IDs with dots. Scanning Eventlists...", n);
            let rec = reconcile(&left, &right, Some(&notify));
            missing = rec.missing();
            if text { render::render_match(&left, &right, &rec, layout(args), args.info_width, args.no_header); }
            export_report(args, &left, &rec, text)?;
            if let Some(id) = args.lookup.as_ref() {
                let (mode, rows) = lookup_right(id, &right);
                if text { render::render_lookup(id, &right, mode, &rows, layout(args)); }
                out.lookup = Some(lookup_output(id, &right, mode, &rows));
            }
            out.matching = Some(match_output(&left, &right, &rec, failures.iter().map(|f| f.to_string()).collect()));
        }
    }
    if !args.trend.is_empty() || args.trend_dir.is_some() {
        let summary = run_trend(args, text)?;
        out.trend = Some(summary);
    }
    if !text || args.json_path.is_some() {
        let json = serde_json::to_string_pretty(&out)?;
        if let Some(p) = args.json_path.as_ref() {
            std::fs::write(p, &json).with_context(|| format!("JSON write failed for {}", p))?;
            if !args.quiet { println!("{}", paint(&format!("JSON written: {}", p), "1;36")); }
        } else {
            println!("{}", json);
        }
    }
    Ok(missing)
}

fn report_error(out: &mut RunOutput, text: bool, msg: &str) {
    log::error!("{}", msg);
    if text { eprintln!("{}", paint(msg, "1;31")); }
    out.errors.push(msg.to_string());
}

fn export_report(args: &Args, left: &RawTable, rec: &Reconciliation, text: bool) -> Result<()> {
    let path = match (args.report_path.as_ref(), args.export_dir.as_ref()) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(dir)) => {
            std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir))?;
            PathBuf::from(dir).join(export::report_name(left))
        }
        (None, None) => return Ok(()),
    };
    export::write_report_file(&path, left, rec).with_context(|| format!("CSV write failed for {}", path.to_string_lossy()))?;
    if text && !args.quiet { println!("{}", paint(&format!("Report written: {}", path.to_string_lossy()), "1;36")); }
    Ok(())
}

fn match_output(left: &RawTable, right: &RawTable, rec: &Reconciliation, right_failures: Vec<String>) -> MatchOutput {
    let rows = rec.records.iter().map(|r| MatchRow {
        status: r.status(),
        id: left.value_or_na(r.row, "ID").to_string(),
        time: left.value_or_na(r.row, "Time").to_string(),
        info: left.value_or_na(r.row, "Info").to_string(),
        strategy: r.strategy.as_str(),
    }).collect();
    MatchOutput {
        left: left.label.clone(),
        right: right.label.clone(),
        left_rows: left.len(),
        right_rows: right.len(),
        skipped_lines: left.skipped_rows + right.skipped_rows,
        composite_key: rec.composite,
        matching: rec.matched(),
        missing: rec.missing(),
        eventlist_scanned: rec.fallback_candidates,
        eventlist_found: rec.fallback_hits,
        report_name: export::report_name(left),
        right_failures,
        rows,
    }
}

fn lookup_output(id: &str, right: &RawTable, mode: LookupMode, rows: &[usize]) -> LookupOutput {
    let records = rows.iter().map(|r| {
        right.fields.iter().enumerate().filter(|(i, _)| right.mapped[*i]).map(|(i, f)| (f.clone(), serde_json::Value::String(right.rows[*r][i].clone()))).collect()
    }).collect();
    LookupOutput { id: id.to_string(), mode, records }
}

fn run_trend(args: &Args, text: bool) -> Result<TrendSummary> {
    let mut paths: Vec<PathBuf> = args.trend.iter().map(PathBuf::from).collect();
    if let Some(dir) = args.trend_dir.as_ref() {
        paths.extend(file_scan::collect_report_files(Path::new(dir), args.trend_glob.as_deref(), args.trend_recursive)?);
    }
    let (inputs, unreadable) = file_scan::read_all(&paths);
    let pb = if args.progress { Some(indicatif::ProgressBar::new_spinner()) } else { None };
    let tick = |name: &str| if let Some(ref pb) = pb { pb.tick(); pb.set_message(format!("Processing {}", name)); };
    let mut batch = process_trend_reports(&inputs, Some(&tick));
    if let Some(pb) = pb.as_ref() { pb.finish_and_clear(); }
    batch.failed.extend(unreadable.into_iter().map(|(file, reason)| SkippedFile { file, reason }));
    let summary = summarize(&batch, paths.len());
    if text { render::render_trend(&batch, &summary, layout(args), args.no_header); }
    if let Some(dir) = args.export_dir.as_ref() {
        let written = export::write_trend_tables(Path::new(dir), &batch, &summary).with_context(|| format!("trend export failed for {}", dir))?;
        if text && !args.quiet { for p in written { println!("{}", paint(&format!("Trend table written: {}", p.to_string_lossy()), "1;36")); } }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tmp(name: &str, body: &str) -> String {
        let p = std::env::temp_dir().join(name);
        std::fs::write(&p, body).unwrap();
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn config_fills_only_unset_values() {
        let mut a = Args { left: Some("cli.csv".to_string()), ..Default::default() };
        let cfg: AppConfig = toml::from_str("left = \"cfg.csv\"\nright = [\"r1.csv\", \"r2.csv\"]\noutput = \"json\"\ninfo_width = 30\n").unwrap();
        apply_config(&mut a, cfg);
        assert_eq!(a.left.as_deref(), Some("cli.csv"));
        assert_eq!(a.right, vec!["r1.csv".to_string(), "r2.csv".to_string()]);
        assert_eq!(a.output, OutputFmt::Json);
        assert_eq!(a.info_width, 30);
    }

    #[test]
    fn config_accepts_cli_value_spellings() {
        let cfg: AppConfig = toml::from_str("output = \"json\"\ntext_format = \"table\"\nlog_format = \"json\"\nleft = \"hold.csv\"\n").unwrap();
        let mut a = Args::default();
        apply_config(&mut a, cfg);
        assert_eq!(a.output, OutputFmt::Json);
        assert_eq!(a.text_format, TextFormat::Table);
        assert!(matches!(a.log_format, Some(LogFormat::Json)));
        assert_eq!(a.left.as_deref(), Some("hold.csv"));
    }

    #[test]
    fn run_reconciles_and_exports() {
        let left = write_tmp("lotmatch_main_left.csv", "Hold export\nLOT_ID,LOT_HOLD_TIME,LOT_HOLD_COMMENT\nA1,20240301 080000,x\nB2.1,20240301 090000,y\nC3,20240301 100000,z\n");
        let right = write_tmp("lotmatch_main_right.csv", "LOTID;DATETIME;EVENTLIST\nA1;20240301 090000;\nP;20240301 090000;merge B2.1\n");
        let dir = std::env::temp_dir().join("lotmatch_main_export");
        let _ = std::fs::remove_dir_all(&dir);
        let a = Args { left: Some(left.clone()), right: vec![right.clone()], export_dir: Some(dir.to_string_lossy().into_owned()), output: OutputFmt::Json, ..Default::default() };
        let missing = run(&a).unwrap();
        assert_eq!(missing, 1);
        let report = std::fs::read_to_string(dir.join("matching_report_0301.csv")).unwrap();
        assert!(report.contains("Matching,B2.1,20240301 090000,y,substring-fallback"));
        assert!(report.contains("Missing,C3,"));
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(&left);
        let _ = std::fs::remove_file(&right);
    }

    #[test]
    fn run_requires_a_right_file() {
        let a = Args { left: Some("whatever.csv".to_string()), ..Default::default() };
        assert!(run(&a).is_err());
    }

    #[test]
    fn unreadable_right_file_is_reported_not_fatal() {
        let left = write_tmp("lotmatch_main_left_only.csv", "LOT_ID,LOT_HOLD_TIME\nA1,20240301 080000\n");
        let a = Args { left: Some(left.clone()), right: vec!["/nonexistent/lotmatch_right.csv".to_string()], output: OutputFmt::Json, ..Default::default() };
        assert_eq!(run(&a).unwrap(), 0);
        let _ = std::fs::remove_file(&left);
    }

    #[test]
    fn lookup_output_lists_mapped_fields_only() {
        let right = scan::scan_bytes(b"LOTID,CHART,TIME\nA1,C1,t\n", "Right", &default_right_spec()).unwrap();
        let (mode, rows) = lookup_right("a1", &right);
        let out = lookup_output("a1", &right, mode, &rows);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("Chart").and_then(|v| v.as_str()), Some("C1"));
        assert!(out.records[0].get("Eventlist").is_none());
    }

    #[test]
    fn trend_run_collects_directory_and_skips_bad_files() {
        let dir = std::env::temp_dir().join("lotmatch_main_trend");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("matching_report_0101.csv"), "Match_Status,ID,Time,Info\nMatching,A1,20240101 080000,x\nMissing,B2,20240101 090000,y\n").unwrap();
        std::fs::write(dir.join("broken.csv"), "ID,Whatever\nA1,x\n").unwrap();
        let a = Args { trend_dir: Some(dir.to_string_lossy().into_owned()), output: OutputFmt::Json, ..Default::default() };
        let summary = run_trend(&a, false).unwrap();
        assert_eq!(summary.files_accepted, 1);
        assert_eq!(summary.skipped_files.len(), 1);
        assert_eq!(summary.skipped_files[0].file, "broken.csv");
        assert_eq!(summary.daily_status[0].percentages["Matching"], 50.0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
