use crate::columns::{map_columns, ColumnMap, ColumnSpec};
use crate::decode::decode_lines;
use crate::error::{LotMatchError, Result};
use crate::table::{RawTable, NOT_AVAILABLE};

pub const HEADER_SCAN_LINES: usize = 50;
const ID_FIELD: &str = "ID";

#[derive(Clone, Debug, PartialEq)]
pub struct HeaderLocation {
    pub index: usize,
    pub delimiter: char,
    pub fields: Vec<String>,
}

fn split_upper(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter).map(|p| p.trim().to_uppercase()).collect()
}

fn validates(parts: &[String], id_aliases: &[String]) -> bool {
    parts.len() > 1 && parts.iter().any(|p| id_aliases.iter().any(|a| p.contains(a.as_str())))
}

/// First line among the first 50 whose comma or semicolon split yields an ID alias.
/// Semicolon wins when both delimiters validate on the same line.
pub fn locate_header(lines: &[String], id_aliases: &[String], label: &str) -> Result<HeaderLocation> {
    for (i, line) in lines.iter().take(HEADER_SCAN_LINES).enumerate() {
        let clean = line.trim();
        if clean.is_empty() { continue; }
        let semi = split_upper(clean, ';');
        if validates(&semi, id_aliases) {
            log::debug!("{}: header at line {} (delimiter ';')", label, i);
            return Ok(HeaderLocation { index: i, delimiter: ';', fields: semi });
        }
        let comma = split_upper(clean, ',');
        if validates(&comma, id_aliases) {
            log::debug!("{}: header at line {} (delimiter ',')", label, i);
            return Ok(HeaderLocation { index: i, delimiter: ',', fields: comma });
        }
    }
    Err(LotMatchError::HeaderNotFound { label: label.to_string() })
}

/// Trims, then drops one surrounding quote character on either end.
pub fn clean_value(raw: &str) -> String {
    let v = raw.trim();
    let v = v.strip_prefix(['"', '\'']).unwrap_or(v);
    let v = v.strip_suffix(['"', '\'']).unwrap_or(v);
    v.to_string()
}

/// Parses every line after the header. Lines too short to cover every mapped column are dropped and counted.
pub fn extract_rows(lines: &[String], header: &HeaderLocation, map: &ColumnMap, spec: &ColumnSpec, label: &str) -> RawTable {
    let mapped: Vec<bool> = map.indices.iter().map(|i| i.is_some()).collect();
    let mut table = RawTable::new(label, spec.names(), mapped);
    let max_needed = map.max_index();
    for line in lines.iter().skip(header.index + 1) {
        let parts: Vec<&str> = line.split(header.delimiter).collect();
        let too_short = match max_needed { Some(m) => parts.len() <= m, None => false };
        if parts.len() < 2 || too_short {
            table.skipped_rows += 1;
            continue;
        }
        let row = map.indices.iter().map(|idx| match idx { Some(i) => clean_value(parts[*i]), None => NOT_AVAILABLE.to_string() }).collect();
        table.rows.push(row);
    }
    if table.skipped_rows > 0 { log::debug!("{}: skipped {} short or malformed lines", label, table.skipped_rows); }
    table
}

pub fn scan_lines(lines: &[String], label: &str, spec: &ColumnSpec) -> Result<RawTable> {
    let header = locate_header(lines, spec.aliases_for(ID_FIELD), label)?;
    let map = map_columns(&header.fields, spec);
    let table = extract_rows(lines, &header, &map, spec, label);
    log::info!("{}: {} rows parsed (header line {}, delimiter '{}')", label, table.len(), header.index, header.delimiter);
    Ok(table)
}

pub fn scan_bytes(bytes: &[u8], label: &str, spec: &ColumnSpec) -> Result<RawTable> {
    scan_lines(&decode_lines(bytes), label, spec)
}

pub fn scan_file(path: &std::path::Path, label: &str, spec: &ColumnSpec) -> Result<RawTable> {
    let bytes = std::fs::read(path).map_err(|e| LotMatchError::Io { path: path.to_string_lossy().into_owned(), source: e })?;
    scan_bytes(&bytes, label, spec)
}

/// Scans each input independently; successful tables are concatenated in input order.
pub fn scan_many(inputs: &[(String, Vec<u8>)], spec: &ColumnSpec) -> (Option<RawTable>, Vec<LotMatchError>) {
    let mut merged: Option<RawTable> = None;
    let mut failures = vec![];
    for (label, bytes) in inputs {
        match scan_bytes(bytes, label, spec) {
            Ok(t) => match merged.as_mut() { Some(m) => m.append(t), None => merged = Some(t) },
            Err(e) => { log::warn!("{}", e); failures.push(e); }
        }
    }
    (merged, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{default_left_spec, default_right_spec};
    use crate::decode::split_lines;

    fn ids() -> Vec<String> { vec!["LOT_ID".to_string(), "LOTID".to_string()] }

    #[test]
    fn header_after_preamble() {
        let lines = split_lines("Report generated 2024\n\nsomething,else\nLOT_ID,TIME\nA1,1\n");
        let h = locate_header(&lines, &ids(), "Left").unwrap();
        assert_eq!(h.index, 3);
        assert_eq!(h.delimiter, ',');
        assert_eq!(h.fields, vec!["LOT_ID".to_string(), "TIME".to_string()]);
    }

    #[test]
    fn semicolon_beats_comma_on_same_line() {
        let lines = split_lines("LOT_ID;TIME,ZONE;COMMENT\n");
        let h = locate_header(&lines, &ids(), "Left").unwrap();
        assert_eq!(h.delimiter, ';');
        assert_eq!(h.fields.len(), 3);
    }

    #[test]
    fn single_field_line_never_validates() {
        let lines = split_lines("LOT_ID\nlotid;x\n");
        let h = locate_header(&lines, &ids(), "Left").unwrap();
        assert_eq!(h.index, 1);
    }

    #[test]
    fn header_beyond_fifty_lines_is_not_found() {
        let mut text = "noise,row\n".repeat(50);
        text.push_str("LOT_ID,TIME\n");
        let err = locate_header(&split_lines(&text), &ids(), "Right").unwrap_err();
        assert!(matches!(err, LotMatchError::HeaderNotFound { ref label } if label == "Right"));
        let mut text = "noise,row\n".repeat(49);
        text.push_str("LOT_ID,TIME\n");
        assert_eq!(locate_header(&split_lines(&text), &ids(), "Right").unwrap().index, 49);
    }

    #[test]
    fn clean_value_strips_one_quote_pair() {
        assert_eq!(clean_value("  \"A1\" "), "A1");
        assert_eq!(clean_value("'B2'"), "B2");
        assert_eq!(clean_value("x"), "x");
        assert_eq!(clean_value("   "), "");
        assert_eq!(clean_value("\"' A1 '\""), "' A1 '");
        assert_eq!(clean_value(" ' A1 ' "), " A1 ");
    }

    #[test]
    fn extraction_fills_unmapped_and_drops_short_rows() {
        let text = "LOT_ID;LOT_HOLD_TIME\nA1;20240101 080000\nshort\nB2;\nC3;20240101 090000;extra\n";
        let t = scan_bytes(text.as_bytes(), "Left", &default_left_spec()).unwrap();
        assert_eq!(t.fields, vec!["ID".to_string(), "Time".to_string(), "Info".to_string()]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.skipped_rows, 1);
        assert_eq!(t.value(0, "Info"), Some("N/A"));
        assert_eq!(t.value(1, "Time"), Some(""));
        assert_eq!(t.value(2, "ID"), Some("C3"));
        assert!(t.rows.iter().all(|r| r.len() == 3));
    }

    #[test]
    fn rows_missing_the_highest_mapped_column_are_dropped() {
        let text = "LOTID,CHART,TIME,EQP,EVENTLIST\nA1,C,T,E,X\nB2,C,T\n";
        let t = scan_bytes(text.as_bytes(), "Right", &default_right_spec()).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.value(0, "Equipment"), Some("N/A"));
        assert_eq!(t.value(0, "Eventlist"), Some("X"));
    }

    #[test]
    fn scan_many_keeps_going_after_a_bad_file() {
        let inputs = vec![
            ("r1.csv".to_string(), b"LOTID,TIME\nA1,1\n".to_vec()),
            ("bad.csv".to_string(), b"nothing here\n".to_vec()),
            ("r2.csv".to_string(), b"LOTID;TIME\nB2;2\n".to_vec()),
        ];
        let (table, failures) = scan_many(&inputs, &default_right_spec());
        let table = table.unwrap();
        assert_eq!(table.column("ID"), vec!["A1", "B2"]);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].to_string().contains("bad.csv"));
    }

    #[test]
    fn scan_file_reports_io_errors() {
        let p = std::env::temp_dir().join("lotmatch_definitely_missing.csv");
        let err = scan_file(&p, "Left", &default_left_spec()).unwrap_err();
        assert!(matches!(err, LotMatchError::Io { .. }));
    }
}
