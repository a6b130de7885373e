/// Game build gating.
///
/// Every stat constant and spell table in the simulator is tuned for exactly
/// one game build. Encounters recorded on another build are not errors: older
/// ones are skipped for good, newer ones are deferred so a later release of
/// this crate can pick them up when the log is re-read.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildVersion {
    pub expac: u8,
    pub patch: u8,
    pub minor: u8,
}

/// The build every formula in `damage` and `player_state` targets.
pub const SUPPORTED_BUILD: BuildVersion = BuildVersion { expac: 10, patch: 2, minor: 5 };

impl BuildVersion {
    pub const fn new(expac: u8, patch: u8, minor: u8) -> Self {
        Self { expac, patch, minor }
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.expac, self.patch, self.minor)
    }
}

impl FromStr for BuildVersion {
    type Err = LedgerError;

    /// Parses "10.2.5". A missing minor component ("10.2") reads as 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LedgerError::MalformedInput(format!("bad build version '{}'", s));
        let mut parts = s.trim().split('.');
        let expac = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let patch = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let minor = match parts.next() {
            Some(m) => m.parse().map_err(|_| bad())?,
            None    => 0,
        };
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Self { expac, patch, minor })
    }
}

impl TryFrom<String> for BuildVersion {
    type Error = LedgerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BuildVersion> for String {
    fn from(v: BuildVersion) -> Self {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Supported,
    /// Newer than we understand. Retry once the crate catches up.
    Future,
    /// Older than we understand. Never simulated.
    Past,
    /// The stream never announced a build.
    Unknown,
}

pub fn classify(build: Option<BuildVersion>) -> BuildStatus {
    match build {
        None => BuildStatus::Unknown,
        Some(b) => match b.cmp(&SUPPORTED_BUILD) {
            std::cmp::Ordering::Equal   => BuildStatus::Supported,
            std::cmp::Ordering::Greater => BuildStatus::Future,
            std::cmp::Ordering::Less    => BuildStatus::Past,
        },
    }
}
