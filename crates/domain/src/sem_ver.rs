//! Semantic-version helpers for signal types.

use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

/// Which component a new signal-type version bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpType {
    Major,
    Minor,
    Patch,
}

/// Compute the next `MAJOR.MINOR.PATCH` from the highest existing version.
/// With no prior version, major starts the line at `1.0.0` and minor/patch
/// at `0.1.0` / `0.0.1`.
pub fn bump_sem_ver(prev: Option<&str>, bump: BumpType) -> Result<String, String> {
    let next = match prev {
        None => match bump {
            BumpType::Major => Version::new(1, 0, 0),
            BumpType::Minor => Version::new(0, 1, 0),
            BumpType::Patch => Version::new(0, 0, 1),
        },
        Some(raw) => {
            let v = Version::from_str(raw)
                .map_err(|e| format!("invalid existing version {raw:?}: {e}"))?;
            match bump {
                BumpType::Major => Version::new(v.major + 1, 0, 0),
                BumpType::Minor => Version::new(v.major, v.minor + 1, 0),
                BumpType::Patch => Version::new(v.major, v.minor, v.patch + 1),
            }
        }
    };
    Ok(next.to_string())
}

/// Parse a strict `MAJOR.MINOR.PATCH` string (no pre-release or build tags).
pub fn parse_sem_ver(raw: &str) -> Result<Version, String> {
    let v = Version::from_str(raw).map_err(|e| format!("invalid version {raw:?}: {e}"))?;
    if !v.pre.is_empty() || !v.build.is_empty() {
        return Err(format!("version {raw:?} must be plain MAJOR.MINOR.PATCH"));
    }
    Ok(v)
}

/// Order two version strings, treating unparseable input as lowest.
pub fn compare_sem_ver(a: &str, b: &str) -> std::cmp::Ordering {
    match (Version::from_str(a), Version::from_str(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        (Ok(_), Err(_)) => std::cmp::Ordering::Greater,
        (Err(_), Ok(_)) => std::cmp::Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
