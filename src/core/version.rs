use super::error::{Result, SaveLoadError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Dotted numeric version with two to four components (`major.minor[.build[.revision]]`).
///
/// Ordering is component-wise and an absent trailing component sorts before
/// any present one, so `1.0 < 1.0.0 < 1.0.0.0 < 1.0.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl Version {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || SaveLoadError::InvalidVersion(input.to_string());

        let parts = input
            .trim()
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u32>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<u32>>>()?;

        match parts.as_slice() {
            [major, minor] => Ok(Self {
                major: *major,
                minor: *minor,
                build: None,
                revision: None,
            }),
            [major, minor, build] => Ok(Self {
                major: *major,
                minor: *minor,
                build: Some(*build),
                revision: None,
            }),
            [major, minor, build, revision] => Ok(Self {
                major: *major,
                minor: *minor,
                build: Some(*build),
                revision: Some(*revision),
            }),
            _ => Err(invalid()),
        }
    }

    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }
}

impl FromStr for Version {
    type Err = SaveLoadError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_to_four_components() {
        assert_eq!(Version::parse("1.2").unwrap().to_string(), "1.2");
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(Version::parse("1.2.3.4").unwrap().revision, Some(4));
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", "1", "1.", "a.b", "1.2.3.4.5", "1.-2", "1. 2", "v1.0"] {
            assert!(
                matches!(Version::parse(bad), Err(SaveLoadError::InvalidVersion(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn missing_components_sort_first() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("1.0") < v("1.0.0"));
        assert!(v("1.0.0") < v("1.0.0.0"));
        assert!(v("1.9.9") < v("1.10"));
        assert!(v("2.0") > v("1.99.99.99"));
    }
}
