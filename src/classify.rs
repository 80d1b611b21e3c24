//! Line classification
//!
//! Every line read from the device is one of:
//! - a fragment of a fault backtrace (contains `#` and a `0x` address)
//! - a log message tagged with a severity token
//! - plain text

use thiserror::Error;

/// Log severity, in the order tokens are searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Search order. The first token present in a line wins, whatever its position.
    pub const ALL: [Severity; 4] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
    ];

    /// Literal token as the firmware prints it
    pub fn token(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// A classified line, borrowing from the decoded text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedLine<'a> {
    Plain(&'a str),
    /// `prefix + level.token() + suffix` is the original line
    Severity {
        level: Severity,
        prefix: &'a str,
        suffix: &'a str,
    },
    /// `address` is the first whitespace-delimited token carrying a hex literal
    Backtrace { text: &'a str, address: &'a str },
}

/// Byte that is not single-byte (ASCII) text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("non-ASCII byte 0x{byte:02x} at offset {position}")]
pub struct DecodeError {
    pub byte: u8,
    pub position: usize,
}

/// Decode a raw line as ASCII and strip surrounding whitespace (including `\r\n`)
pub fn decode_line(raw: &[u8]) -> Result<&str, DecodeError> {
    if let Some(position) = raw.iter().position(|b| !b.is_ascii()) {
        return Err(DecodeError {
            byte: raw[position],
            position,
        });
    }
    // All bytes are ASCII, so this cannot fail
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError {
        byte: raw[e.valid_up_to()],
        position: e.valid_up_to(),
    })?;
    Ok(text.trim())
}

/// Find the `0x`-prefixed hex number inside a token, e.g. `0x1a2b` in `pc=0x1a2b,`
pub fn hex_literal(token: &str) -> Option<&str> {
    let bytes = token.as_bytes();
    let mut search = 0;
    while let Some(offset) = token[search..].find("0x") {
        let start = search + offset;
        let digits = bytes[start + 2..]
            .iter()
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        if digits > 0 {
            return Some(&token[start..start + 2 + digits]);
        }
        search = start + 2;
    }
    None
}

/// Classify one decoded line. Rules are tried in order; the first match wins.
pub fn classify(line: &str) -> ClassifiedLine<'_> {
    if line.contains('#') {
        if let Some(address) = line
            .split_whitespace()
            .find(|token| hex_literal(token).is_some())
        {
            return ClassifiedLine::Backtrace {
                text: line,
                address,
            };
        }
    }

    for level in Severity::ALL {
        if let Some((prefix, suffix)) = line.split_once(level.token()) {
            return ClassifiedLine::Severity {
                level,
                prefix,
                suffix,
            };
        }
    }

    ClassifiedLine::Plain(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtrace_takes_first_address() {
        let line = "#0 0x0001a2b3 in foo() 0xdeadbeef";
        assert_eq!(
            classify(line),
            ClassifiedLine::Backtrace {
                text: line,
                address: "0x0001a2b3",
            }
        );
    }

    #[test]
    fn test_backtrace_with_junk_prefix() {
        let line = "garbage#3  pc:0x00004F20 lr:0x00001234";
        match classify(line) {
            ClassifiedLine::Backtrace { address, .. } => assert_eq!(address, "pc:0x00004F20"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_backtrace_wins_over_severity() {
        let line = "ERROR #1 0x1000";
        assert!(matches!(
            classify(line),
            ClassifiedLine::Backtrace {
                address: "0x1000",
                ..
            }
        ));
    }

    #[test]
    fn test_hash_without_address_is_not_backtrace() {
        assert_eq!(classify("item #4 done"), ClassifiedLine::Plain("item #4 done"));
        // "0x" with no hex digits after it is not an address
        assert_eq!(classify("#1 0xzz"), ClassifiedLine::Plain("#1 0xzz"));
    }

    #[test]
    fn test_address_without_hash_is_not_backtrace() {
        assert_eq!(
            classify("wrote 0x10 bytes"),
            ClassifiedLine::Plain("wrote 0x10 bytes")
        );
    }

    #[test]
    fn test_severity_split() {
        assert_eq!(
            classify("[INFO] system ready"),
            ClassifiedLine::Severity {
                level: Severity::Info,
                prefix: "[",
                suffix: "] system ready",
            }
        );
    }

    #[test]
    fn test_severity_first_in_search_order_wins() {
        // ERROR appears first positionally, INFO is searched first
        let line = "ERROR while loading INFO block";
        match classify(line) {
            ClassifiedLine::Severity {
                level,
                prefix,
                suffix,
            } => {
                assert_eq!(level, Severity::Info);
                assert_eq!(prefix, "ERROR while loading ");
                assert_eq!(suffix, " block");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_severity_splits_on_first_occurrence() {
        let line = "WARNING: WARNING";
        match classify(line) {
            ClassifiedLine::Severity { prefix, suffix, .. } => {
                assert_eq!(prefix, "");
                assert_eq!(suffix, ": WARNING");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_plain_unchanged() {
        for line in ["", "hello world", "info lowercase is plain", "x = 0x10"] {
            assert_eq!(classify(line), ClassifiedLine::Plain(line));
        }
    }

    #[test]
    fn test_decode_line_trims() {
        assert_eq!(decode_line(b"  [INFO] ok\r\n"), Ok("[INFO] ok"));
        assert_eq!(decode_line(b"\n"), Ok(""));
    }

    #[test]
    fn test_decode_line_rejects_non_ascii() {
        assert_eq!(
            decode_line(b"ok\xffbad\n"),
            Err(DecodeError {
                byte: 0xff,
                position: 2,
            })
        );
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(hex_literal("0x0001a2b3"), Some("0x0001a2b3"));
        assert_eq!(hex_literal("pc=0x1A2B,"), Some("0x1A2B"));
        assert_eq!(hex_literal("0x"), None);
        assert_eq!(hex_literal("0xg 0x1"), Some("0x1"));
        assert_eq!(hex_literal("main"), None);
    }
}
