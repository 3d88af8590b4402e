//! Hardware address parsing and validation
//!
//! Devices are keyed by their six-byte hardware address in colon-hex form.
//! Every inbound topic that carries an address segment is validated against
//! this format before anything else looks at the message.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid pattern"));

/// Six-byte device identifier, colon-hex encoded (`AA:BB:CC:DD:EE:FF`).
///
/// Parsing is case-insensitive; the stored form is uppercase so the address
/// can be used directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareAddress(String);

impl HardwareAddress {
    /// Parse and canonicalize an address string.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        if ADDRESS_RE.is_match(input) {
            Ok(Self(input.to_ascii_uppercase()))
        } else {
            Err(AddressError::InvalidFormat(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HardwareAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Address validation errors
#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    #[error("invalid hardware address: {0:?}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_canonical_address() {
        let addr = HardwareAddress::parse("7C:9E:BD:F1:DA:E4").unwrap();
        assert_eq!(addr.as_str(), "7C:9E:BD:F1:DA:E4");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower = HardwareAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let upper = HardwareAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for bad in [
            "",
            "not-a-mac",
            "AA:BB:CC:DD:EE",          // too short
            "AA:BB:CC:DD:EE:FF:00",    // too long
            "AA-BB-CC-DD-EE-FF",       // wrong delimiter
            "GG:BB:CC:DD:EE:FF",       // non-hex
            "AA:BB:CC:DD:EE:F",        // short final pair
            " AA:BB:CC:DD:EE:FF",      // leading space
        ] {
            assert!(
                HardwareAddress::parse(bad).is_err(),
                "should reject: {bad:?}"
            );
        }
    }

    #[test]
    fn test_from_str_roundtrip() {
        let addr: HardwareAddress = "01:23:45:67:89:ab".parse().unwrap();
        assert_eq!(addr.to_string(), "01:23:45:67:89:AB");
    }

    proptest! {
        #[test]
        fn valid_addresses_always_parse(addr in "([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}") {
            prop_assert!(HardwareAddress::parse(&addr).is_ok());
        }

        #[test]
        fn parsing_is_idempotent(addr in "([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}") {
            let first = HardwareAddress::parse(&addr).unwrap();
            let second = HardwareAddress::parse(first.as_str()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn arbitrary_strings_never_panic(input in ".*") {
            let _ = HardwareAddress::parse(&input);
        }
    }
}
