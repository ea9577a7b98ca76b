//! Normalized export format versions
//!
//! sysPass exports declare their version as `NNN.B` where the first part
//! packs up to three version digits and the second is a build number.
//! Comparisons must be numeric per component, as build numbers grow past
//! what a string compare would order correctly.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Oldest export format this crate understands
pub const MIN_VERSION: &str = "300.0";

/// First format version that base64 encodes section ciphertext
pub const BASE64_CIPHERTEXT_VERSION: &str = "320.0";

/// [`BASE64_CIPHERTEXT_VERSION`], parsed
pub(crate) fn base64_ciphertext_threshold() -> Version {
    Version::parse(BASE64_CIPHERTEXT_VERSION).expect("constant version parses")
}

#[derive(Debug, Error)]
/// Failure to interpret a declared version
pub enum VersionError {
    /// The version string was empty or not `number.number`
    #[error("Malformed version string: {0:?}")]
    Malformed(String),
}

/// A declared export version, normalized for comparison
///
/// The version part is scaled so each digit fills a decimal place of a
/// four digit number; digits past the fourth are dropped. `"301.0"` and
/// `"3010.0"` normalize to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    version: u32,
    build: u64,
}

impl Version {
    /// Parse a `NNN.B` version string
    pub fn parse(input: &str) -> Result<Version, VersionError> {
        let malformed = || VersionError::Malformed(input.to_string());
        let (version_part, build_part) = input.trim().split_once('.').ok_or_else(malformed)?;
        if version_part.is_empty() || !version_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let mut version = 0u32;
        for (idx, digit) in version_part.bytes().take(4).enumerate() {
            version += u32::from(digit - b'0') * 10u32.pow(3 - idx as u32);
        }
        let build = build_part.parse::<u64>().map_err(|_| malformed())?;
        Ok(Version { version, build })
    }

    /// Normalize a four part `[major, minor, patch, build]` version
    pub fn from_parts(parts: [u32; 4]) -> Version {
        let digits = format!("{}{}{}", parts[0], parts[1], parts[2]);
        let mut version = 0u32;
        for (idx, digit) in digits.bytes().take(4).enumerate() {
            version += u32::from(digit - b'0') * 10u32.pow(3 - idx as u32);
        }
        Version {
            version,
            build: u64::from(parts[3]),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        (self.version, self.build).cmp(&(other.version, other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.version, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(input: &str) -> String {
        Version::parse(input).unwrap().to_string()
    }

    #[test]
    fn normalize_for_compare() {
        assert_eq!(normalized("200.0"), "2000.0");
        assert_eq!(normalized("3010.0"), "3010.0");
        assert_eq!(normalized("301.0"), "3010.0");
        assert_eq!(normalized("31010.190901"), "3101.190901");
        assert_eq!(Version::from_parts([3, 0, 0, 190901]).to_string(), "3000.190901");
    }

    #[test]
    fn gate_against_minimum() {
        let minimum = Version::parse(MIN_VERSION).unwrap();
        let older = ["200.0", "210.0"];
        let supported = ["300.0", "300.190901", "310.0", "320.0", "400.0"];
        for version in older {
            assert!(Version::parse(version).unwrap() < minimum, "{}", version);
        }
        for version in supported {
            assert!(Version::parse(version).unwrap() >= minimum, "{}", version);
        }
    }

    #[test]
    fn build_numbers_compare_numerically() {
        let small_build = Version::parse("310.2").unwrap();
        let large_build = Version::parse("310.190901").unwrap();
        assert!(small_build < large_build);
    }

    #[test]
    fn malformed_versions_rejected() {
        for input in ["", "300", "x.0", "300.x", "."] {
            assert!(Version::parse(input).is_err(), "{:?}", input);
        }
    }
}
