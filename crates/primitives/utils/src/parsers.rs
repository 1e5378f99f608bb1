use alloy::primitives::Address;
use anyhow::{anyhow, bail, Context};

use std::time::Duration;

use url::Url;

/// Parse a string URL & returns it as [Url].
pub fn parse_url(s: &str) -> Result<Url, url::ParseError> {
    s.parse()
}

/// Parses a hex string into an [Address]. Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(s: &str) -> anyhow::Result<Address> {
    let s = s.trim();
    let body = s.strip_prefix("0x").unwrap_or(s);
    let is_mixed_case = body.chars().any(|c| c.is_ascii_lowercase()) && body.chars().any(|c| c.is_ascii_uppercase());
    if is_mixed_case {
        Address::parse_checksummed(s, None).with_context(|| format!("Invalid address checksum: {s}"))
    } else {
        s.parse::<Address>().with_context(|| format!("Invalid address format: {s}"))
    }
}

/// Parses a string duration & return it as [Duration].
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let split_index = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(|| anyhow!("Invalid duration format: {}", s))?;

    let (value_str, suffix) = s.split_at(split_index);
    let value: u64 = value_str.parse().map_err(|_| anyhow!("Invalid duration value: {}", value_str))?;

    match suffix.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "min" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => bail!("Invalid duration suffix: {}. Expected 'ms', 's', 'min' or 'h'.", suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1000ms").unwrap(), Duration::from_millis(1000));
        assert_eq!(parse_duration("2 min").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("s15").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("3d").is_err());
    }

    #[rstest]
    #[case::lowercase("0x00000000000000000000000000000000000000aa")]
    #[case::checksummed("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")]
    #[case::no_prefix("00000000000000000000000000000000000000aa")]
    fn test_parse_address_accepts(#[case] input: &str) {
        assert!(parse_address(input).is_ok());
    }

    #[rstest]
    #[case::bad_checksum("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD")]
    #[case::too_short("0x1234")]
    #[case::not_hex("0xzz00000000000000000000000000000000000000")]
    #[case::empty("")]
    fn test_parse_address_rejects(#[case] input: &str) {
        assert!(parse_address(input).is_err());
    }

    #[rstest]
    fn test_parse_url() {
        assert!(parse_url("http://localhost:8545").is_ok());
        assert!(parse_url("not a url").is_err());
    }
}
