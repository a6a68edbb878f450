use serde::{Deserialize, Serialize};

/// One logical field and the header substrings that identify it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub field: String,
    pub aliases: Vec<String>,
}

/// Ordered logical field -> alias list. Declare order decides ties when aliases overlap.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct ColumnSpec {
    pub fields: Vec<FieldSpec>,
}

impl ColumnSpec {
    pub fn new(entries: &[(&str, &[&str])]) -> Self {
        let fields = entries.iter().map(|(f, a)| FieldSpec { field: f.to_string(), aliases: a.iter().map(|s| s.to_uppercase()).collect() }).collect();
        Self { fields }
    }

    pub fn names(&self) -> Vec<String> { self.fields.iter().map(|f| f.field.clone()).collect() }

    pub fn aliases_for(&self, field: &str) -> &[String] {
        self.fields.iter().find(|f| f.field == field).map(|f| f.aliases.as_slice()).unwrap_or(&[])
    }

    /// Upper-cases every alias; run on anything read from disk.
    pub fn normalized(mut self) -> Self {
        for f in &mut self.fields { for a in &mut f.aliases { *a = a.trim().to_uppercase(); } f.aliases.retain(|a| !a.is_empty()); }
        self
    }
}

pub fn default_left_spec() -> ColumnSpec {
    ColumnSpec::new(&[
        ("ID", &["LOT_ID", "LOTID"]),
        ("Time", &["LOT_HOLD_TIME", "TIME"]),
        ("Info", &["LOT_HOLD_COMMENT"]),
    ])
}

pub fn default_right_spec() -> ColumnSpec {
    ColumnSpec::new(&[
        ("ID", &["LOTID", "LOT_ID", "BATCHID"]),
        ("Chart", &["CHARTNAME", "CHART"]),
        ("Time", &["DATETIME", "TIME"]),
        ("Equipment", &["EQPNAME", "EQUIPMENT"]),
        ("Eventlist", &["EVENTLIST", "EVENT_LIST"]),
    ])
}

/// Physical column index per logical field, aligned with `ColumnSpec::fields`.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMap {
    pub indices: Vec<Option<usize>>,
}

impl ColumnMap {
    pub fn max_index(&self) -> Option<usize> { self.indices.iter().flatten().copied().max() }
}

/// Walks header fields left to right; each unassigned logical field takes the first header
/// field containing one of its aliases. Assigned fields are never overwritten.
pub fn map_columns(header: &[String], spec: &ColumnSpec) -> ColumnMap {
    let mut indices: Vec<Option<usize>> = vec![None; spec.fields.len()];
    for (idx, part) in header.iter().enumerate() {
        let part = part.trim().to_uppercase();
        for (slot, fs) in spec.fields.iter().enumerate() {
            if indices[slot].is_some() { continue; }
            if fs.aliases.iter().any(|a| part.contains(a.as_str())) { indices[slot] = Some(idx); }
        }
    }
    for (fs, idx) in spec.fields.iter().zip(&indices) {
        match idx { Some(i) => log::debug!("column {} -> index {}", fs.field, i), None => log::debug!("column {} not found in header", fs.field) }
    }
    ColumnMap { indices }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ColumnsConfig {
    pub left: Option<ColumnSpec>,
    pub right: Option<ColumnSpec>,
}

pub fn load_column_specs(path_opt: Option<&str>) -> Option<ColumnsConfig> {
    let path = path_opt.map(|s| s.to_string()).or_else(|| std::env::var("LOTMATCH_COLUMNS_PATH").ok())?;
    let p = std::path::PathBuf::from(&path);
    let data = match std::fs::read(&p) { Ok(d) => d, Err(e) => { log::warn!("Failed to read column registry {}: {}", p.to_string_lossy(), e); return None } };
    let cfg: ColumnsConfig = match serde_json::from_slice(&data) { Ok(c) => c, Err(e) => { log::warn!("Failed to parse column registry {}: {}", p.to_string_lossy(), e); return None } };
    Some(ColumnsConfig { left: cfg.left.map(ColumnSpec::normalized), right: cfg.right.map(ColumnSpec::normalized) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr(s: &str, d: char) -> Vec<String> { s.split(d).map(|p| p.trim().to_uppercase()).collect() }

    #[test]
    fn maps_default_right_header() {
        let m = map_columns(&hdr("LotId;ChartName;DateTime;EqpName;EventList", ';'), &default_right_spec());
        assert_eq!(m.indices, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(m.max_index(), Some(4));
    }

    #[test]
    fn first_match_wins_and_is_not_overwritten() {
        // "LOT_HOLD_TIME" contains "TIME" too, but Time is already taken by index 1.
        let m = map_columns(&hdr("LOT_ID,LOT_HOLD_TIME,TIME,LOT_HOLD_COMMENT", ','), &default_left_spec());
        assert_eq!(m.indices, vec![Some(0), Some(1), Some(3)]);
    }

    #[test]
    fn overlapping_aliases_follow_declare_order() {
        let spec = ColumnSpec::new(&[("A", &["LOT"]), ("B", &["LOT"])]);
        let m = map_columns(&hdr("LOT,LOT", ','), &spec);
        // Both fields claim the first LOT column; declare order only decides who is checked first.
        assert_eq!(m.indices, vec![Some(0), Some(0)]);
        let spec = ColumnSpec::new(&[("A", &["LOT_ID"]), ("B", &["LOT"])]);
        let m = map_columns(&hdr("LOT_ID,LOT_NO", ','), &spec);
        assert_eq!(m.indices, vec![Some(0), Some(0)]);
    }

    #[test]
    fn missing_fields_stay_unassigned() {
        let m = map_columns(&hdr("LOT_ID,WHEN", ','), &default_left_spec());
        assert_eq!(m.indices, vec![Some(0), None, None]);
        assert_eq!(m.max_index(), Some(0));
    }

    #[test]
    fn mapping_is_idempotent() {
        let h = hdr("BATCHID,CHART,TIME,EQUIPMENT,EVENT_LIST", ',');
        let spec = default_right_spec();
        assert_eq!(map_columns(&h, &spec), map_columns(&h, &spec));
    }

    #[test]
    fn registry_loads_in_declare_order() {
        let p = std::env::temp_dir().join("lotmatch_columns_test.json");
        std::fs::write(&p, r#"{"left":[{"field":"ID","aliases":["lot"]},{"field":"Time","aliases":["stamp"]}]}"#).unwrap();
        let cfg = load_column_specs(Some(&p.to_string_lossy())).unwrap();
        let left = cfg.left.unwrap();
        assert_eq!(left.names(), vec!["ID".to_string(), "Time".to_string()]);
        assert_eq!(left.aliases_for("ID"), &["LOT".to_string()]);
        assert!(cfg.right.is_none());
        let _ = std::fs::remove_file(&p);
    }
}
