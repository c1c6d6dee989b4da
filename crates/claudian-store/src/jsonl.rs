//! Line-delimited JSON helpers.
//!
//! Transcript files store one record per line. Decoding skips malformed
//! lines with a warning instead of failing the whole file: one bad line
//! must never make an entire conversation unreadable.

use std::path::Path;

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Decode lines as `T` records, skipping lines that fail.
///
/// Blank lines are ignored. Skipped lines are logged with their 1-based
/// line number so the offending record can be found by hand;
/// `first_line_no` lets callers that consumed a header line themselves
/// keep the numbering honest.
pub(crate) fn decode_jsonl_lines<'a, T, I>(lines: I, path: &Path, first_line_no: usize) -> Vec<T>
where
    T: DeserializeOwned,
    I: Iterator<Item = &'a str>,
{
    let mut records = Vec::new();
    for (offset, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    "{}:{}: skipping malformed line: {}",
                    path.display(),
                    first_line_no + offset,
                    e
                );
            }
        }
    }
    records
}

/// Encode one record as a compact JSON line, newline included.
pub(crate) fn encode_jsonl_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        n: u32,
    }

    #[test]
    fn test_decode_skips_malformed_lines() {
        let text = "{\"n\":1}\nnot json\n{\"n\":3}\n";
        let rows: Vec<Row> = decode_jsonl_lines(text.lines(), Path::new("rows.jsonl"), 1);
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 3 }]);
    }

    #[test]
    fn test_decode_ignores_blank_lines() {
        let text = "\n{\"n\":1}\n\n   \n{\"n\":2}\n";
        let rows: Vec<Row> = decode_jsonl_lines(text.lines(), Path::new("rows.jsonl"), 1);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_decode_empty_text_yields_no_rows() {
        let rows: Vec<Row> = decode_jsonl_lines("".lines(), Path::new("rows.jsonl"), 1);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_encode_line_is_compact_with_newline() {
        let line = encode_jsonl_line(&Row { n: 7 }).unwrap();
        assert_eq!(line, "{\"n\":7}\n");
    }

    #[test]
    fn test_decode_lines_with_offset() {
        let body = "{\"n\":1}\nbad";
        let rows: Vec<Row> = decode_jsonl_lines(body.lines(), Path::new("s.jsonl"), 2);
        assert_eq!(rows, vec![Row { n: 1 }]);
    }
}
