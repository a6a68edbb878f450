use serde::Serialize;

/// Marker written for logical fields whose column was not found in the header.
pub const NOT_AVAILABLE: &str = "N/A";

/// Rows of string values keyed by logical field. Every row carries one value per entry in `fields`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RawTable {
    pub label: String,
    pub fields: Vec<String>,
    pub mapped: Vec<bool>,
    pub rows: Vec<Vec<String>>,
    pub skipped_rows: usize,
}

impl RawTable {
    pub fn new(label: &str, fields: Vec<String>, mapped: Vec<bool>) -> Self {
        Self { label: label.to_string(), fields, mapped, rows: vec![], skipped_rows: 0 }
    }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn field_index(&self, field: &str) -> Option<usize> { self.fields.iter().position(|f| f == field) }

    /// True when the field exists and its column was located in the source header.
    pub fn has_column(&self, field: &str) -> bool {
        self.field_index(field).map(|i| self.mapped[i]).unwrap_or(false)
    }

    pub fn value(&self, row: usize, field: &str) -> Option<&str> {
        let i = self.field_index(field)?;
        self.rows.get(row).map(|r| r[i].as_str())
    }

    /// Value for export/display: "N/A" when the table has no such field at all.
    pub fn value_or_na(&self, row: usize, field: &str) -> &str { self.value(row, field).unwrap_or(NOT_AVAILABLE) }

    pub fn column(&self, field: &str) -> Vec<&str> {
        match self.field_index(field) { Some(i) => self.rows.iter().map(|r| r[i].as_str()).collect(), None => vec![] }
    }

    /// Appends another table parsed with the same spec. A field counts as mapped if either side mapped it.
    pub fn append(&mut self, other: RawTable) {
        if other.fields != self.fields {
            log::warn!("Skipping concat of {}: field set differs from {}", other.label, self.label);
            return;
        }
        for (m, o) in self.mapped.iter_mut().zip(&other.mapped) { *m = *m || *o; }
        self.rows.extend(other.rows);
        self.skipped_rows += other.skipped_rows;
        self.label = format!("{}+{}", self.label, other.label);
    }
}
