#![allow(clippy::new_without_default)]

pub mod parsers;

use std::time::{Duration, Instant};

pub struct PerfStopwatch(pub Instant);

impl PerfStopwatch {
    #[tracing::instrument(name = "PerfStopwatch::new")]
    pub fn new() -> PerfStopwatch {
        PerfStopwatch(Instant::now())
    }

    #[tracing::instrument(name = "PerfStopwatch::elapsed", skip(self))]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

#[macro_export]
macro_rules! stopwatch_end {
    ($stopwatch:expr, $($arg:tt)+) => {
        tracing::debug!($($arg)+, $stopwatch.elapsed())
    }
}

/// Shortens a hex string for log output, keeping the `0x` prefix and both ends.
///
/// Non-ASCII input is not a hash and is returned unchanged.
pub fn trim_hash(hash: &str) -> String {
    if !hash.is_ascii() {
        return hash.to_string();
    }
    let body = hash.strip_prefix("0x").unwrap_or(hash);
    if body.len() <= 12 {
        return format!("0x{body}");
    }
    format!("0x{}…{}", &body[..6], &body[body.len() - 6..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_hash_keeps_short_values() {
        assert_eq!(trim_hash("0xabcdef"), "0xabcdef");
        assert_eq!(trim_hash("abcdef"), "0xabcdef");
    }

    #[test]
    fn trim_hash_shortens_long_values() {
        let hash = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";
        assert_eq!(trim_hash(hash), "0x5c504e…b22060");
    }

    #[test]
    fn trim_hash_leaves_non_ascii_untouched() {
        let label = "0xé5c504ed432cb51138bcf09aa5";
        assert_eq!(trim_hash(label), label);
    }
}
