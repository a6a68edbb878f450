/// Latin-1 decode: every byte maps to the code point of the same value, so no input is ever rejected.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Splits decoded text into lines, keeping the same line boundaries a `readlines()` pass would
/// (`\n` terminated, a trailing `\r` stripped). A final empty fragment after the last newline is not a line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l).to_string()).collect();
    if text.ends_with('\n') || text.is_empty() { out.pop(); }
    out
}

pub fn decode_lines(bytes: &[u8]) -> Vec<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
    split_lines(&latin1_to_string(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_accepts_every_byte() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let s = latin1_to_string(&bytes);
        assert_eq!(s.chars().count(), 256);
        assert_eq!(s.chars().nth(0xE9), Some('é'));
    }

    #[test]
    fn split_handles_crlf_and_trailing_newline() {
        let lines = split_lines("a,b\r\nc,d\n");
        assert_eq!(lines, vec!["a,b".to_string(), "c,d".to_string()]);
        assert_eq!(split_lines("x\n\ny"), vec!["x".to_string(), String::new(), "y".to_string()]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn decode_strips_utf8_bom() {
        let lines = decode_lines(b"\xEF\xBB\xBFLOT_ID,TIME\nA1,1\n");
        assert_eq!(lines[0], "LOT_ID,TIME");
    }

    #[test]
    fn invalid_utf8_survives() {
        let lines = decode_lines(b"LOT_ID;INFO\nA1;caf\xe9 \xff\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("A1;caf"));
    }
}
