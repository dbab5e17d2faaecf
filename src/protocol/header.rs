//! Header block scanning and parsing.
//!
//! A header block is one or more `key:value` lines, optionally preceded by a
//! start line, ended by the first blank line. Parsing is tolerant in the
//! same places the wire's peers are known to be sloppy: keys are lowercased,
//! values are whitespace-trimmed, and a keyless line after the start line is
//! kept under the empty key rather than rejected.

use std::collections::HashMap;

use super::framer::FramingError;
use super::HEADER_TERMINATOR;

/// Transient result of parsing one complete header block.
///
/// Not persisted beyond the parse that produced it; the session copies out
/// the fields it cares about and the accumulator drops the consumed text.
#[derive(Debug, Default)]
pub struct HeaderBlock {
    /// The start line, empty when the block opened directly with a `key:value`
    /// line.
    pub start_line: String,
    /// Parsed header fields; keys lowercased, values trimmed.
    pub fields: HashMap<String, String>,
    /// Bytes consumed from the accumulator, terminator included.
    pub len: usize,
}

impl HeaderBlock {
    /// Parse a complete header block of `len` bytes (terminator included)
    /// from the front of `buf`.
    ///
    /// The caller guarantees the terminator is present at `len - 4`.
    pub fn parse(buf: &[u8], len: usize) -> Result<Self, FramingError> {
        let text = std::str::from_utf8(&buf[..len - HEADER_TERMINATOR.len()])
            .map_err(|_| FramingError::MalformedHeader("header is not valid UTF-8".into()))?;

        let mut block = HeaderBlock {
            len,
            ..HeaderBlock::default()
        };
        let mut saw_start_line = false;

        for line in text.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => {
                    block
                        .fields
                        .insert(key.to_lowercase(), value.trim().to_string());
                },
                None => {
                    // A keyless line opens the block as its start line; once
                    // any key (or a start line) has been seen it no longer can.
                    if !saw_start_line && block.fields.is_empty() {
                        block.start_line.push_str(line);
                        saw_start_line = true;
                    } else {
                        block.fields.insert(String::new(), line.trim().to_string());
                    }
                },
            }
        }

        Ok(block)
    }

    /// Look up a field by its lowercased name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Scan `buf` for the header terminator, starting at `from`.
///
/// Returns the total length of the header block (terminator included) when
/// found. `from` lets repeated scans over a growing accumulator skip text
/// already searched.
pub fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    let needle = HEADER_TERMINATOR.as_bytes();
    if buf.len() < needle.len() {
        return None;
    }
    buf[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos + needle.len())
}
