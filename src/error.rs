use thiserror::Error;

#[derive(Debug, Error)]
pub enum LotMatchError {
    #[error("Could not find a Header row containing an ID column (or delimiters were not detected) in {label} file.")]
    HeaderNotFound { label: String },
    #[error("{file}: {reason}")]
    FileParseFailed { file: String, reason: String },
    #[error("failed to read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LotMatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_not_found_names_the_file() {
        let e = LotMatchError::HeaderNotFound { label: "Left".to_string() };
        assert!(e.to_string().contains("in Left file"));
    }

    #[test]
    fn parse_failure_carries_file_and_reason() {
        let e = LotMatchError::FileParseFailed { file: "day1.csv".to_string(), reason: "Missing required columns: Time".to_string() };
        assert_eq!(e.to_string(), "day1.csv: Missing required columns: Time");
    }
}
