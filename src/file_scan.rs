use globset::{GlobBuilder, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{LotMatchError, Result};

pub const DEFAULT_REPORT_GLOB: &str = "*.csv";

/// Report files under `root` whose file name matches `file_glob` (case-insensitive), sorted by path.
pub fn collect_report_files(root: &Path, file_glob: Option<&str>, recursive: bool) -> Result<Vec<PathBuf>> {
    let pattern = file_glob.unwrap_or(DEFAULT_REPORT_GLOB);
    let glob = GlobBuilder::new(pattern).case_insensitive(true).literal_separator(false).build().map_err(|e| LotMatchError::Config(format!("bad glob {}: {}", pattern, e)))?;
    let mut gs = GlobSetBuilder::new();
    gs.add(glob);
    let set = gs.build().map_err(|e| LotMatchError::Config(format!("bad glob {}: {}", pattern, e)))?;
    let wd = if recursive { WalkDir::new(root) } else { WalkDir::new(root).max_depth(1) };
    let mut out: Vec<PathBuf> = vec![];
    for de in wd.follow_links(false).into_iter().filter_map(|r| r.map_err(|e| log::warn!("walk error: {}", e)).ok()) {
        let p = de.path();
        if !p.is_file() { continue; }
        let name = match p.file_name() { Some(n) => n, None => continue };
        if set.is_match(name) { out.push(p.to_path_buf()); }
    }
    out.sort();
    log::debug!("found {} report files under {}", out.len(), root.to_string_lossy());
    Ok(out)
}

/// Reads each path fully; unreadable files are returned separately so the batch can carry on.
pub fn read_all(paths: &[PathBuf]) -> (Vec<(String, Vec<u8>)>, Vec<(String, String)>) {
    let mut ok = vec![];
    let mut failed = vec![];
    for p in paths {
        let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| p.to_string_lossy().into_owned());
        match std::fs::read(p) {
            Ok(b) => ok.push((name, b)),
            Err(e) => { log::warn!("Failed to read {}: {}", p.to_string_lossy(), e); failed.push((name, e.to_string())); }
        }
    }
    (ok, failed)
}
