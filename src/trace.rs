//! Offline backtrace symbolication
//!
//! For a crash report pasted or piped in after the fact: every line that
//! carries a hex address has its first address resolved and printed.

use crate::cancel::CancelToken;
use crate::classify::hex_literal;
use crate::symbols::{ResolveError, SymbolResolver};
use anyhow::{Context, Result};
use std::io::{BufRead, Write};

/// Resolve the first address of each input line until EOF or cancellation.
/// Returns how many addresses were resolved.
pub fn resolve_trace<I, W, R>(input: I, mut output: W, resolver: &R, cancel: &CancelToken) -> Result<usize>
where
    I: BufRead,
    W: Write,
    R: SymbolResolver,
{
    let mut resolved = 0;
    for line in input.lines() {
        if cancel.is_cancelled() {
            break;
        }
        let line = line.context("Failed to read backtrace input")?;

        // Trace may contain some junk around the address
        let Some(token) = line.split_whitespace().find(|t| hex_literal(t).is_some()) else {
            continue;
        };

        match resolver.resolve(token, cancel) {
            Ok(location) => {
                writeln!(output, "{}", location)?;
                resolved += 1;
            }
            Err(ResolveError::Cancelled) => break,
            Err(e) => {
                log::warn!("cannot resolve {}: {}", token, e);
                writeln!(output, "?? ({})", token)?;
            }
        }
        output.flush()?;
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::ResolvedLocation;

    struct TableResolver;

    impl SymbolResolver for TableResolver {
        fn resolve(&self, address: &str, _cancel: &CancelToken) -> Result<ResolvedLocation, ResolveError> {
            match hex_literal(address) {
                Some("0x1000") => Ok(ResolvedLocation::parse("setup() at main.cpp:10")),
                Some("0x2000") => Ok(ResolvedLocation::parse("loop() at main.cpp:20")),
                _ => Err(ResolveError::EmptyOutput),
            }
        }
    }

    #[test]
    fn test_resolves_first_address_per_line() {
        let input = "Fault!\n#0 0x1000 0x2000\n  pc=0x2000\n#2 0x3000\n";
        let mut output = Vec::new();
        let resolved =
            resolve_trace(input.as_bytes(), &mut output, &TableResolver, &CancelToken::new()).unwrap();

        assert_eq!(resolved, 2);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "setup() at main.cpp:10\nloop() at main.cpp:20\n?? (0x3000)\n"
        );
    }

    #[test]
    fn test_stops_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut output = Vec::new();
        let resolved = resolve_trace("#0 0x1000\n".as_bytes(), &mut output, &TableResolver, &cancel).unwrap();
        assert_eq!(resolved, 0);
        assert!(output.is_empty());
    }
}
