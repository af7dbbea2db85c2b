use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

static LEADING_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\+?(\d+)").expect("static regex"));

/// Page number in the remote feed's own, zero-based numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginPage(u64);

impl OriginPage {
    pub const FIRST: OriginPage = OriginPage(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// `None` once the numbering is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    pub fn to_local(self) -> LocalPage {
        to_local(Some(self))
    }
}

impl fmt::Display for OriginPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OriginPage {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| MirrorError::InvalidConfig(format!("invalid page number: {value}")))
    }
}

/// Page number of a file in the local archive. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalPage(u64);

impl LocalPage {
    pub const SENTINEL: LocalPage = LocalPage(1);

    /// Returns `None` for 0, which no archive file may carry.
    pub fn new(value: u64) -> Option<Self> {
        (value >= 1).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Inverse of [`to_local`] for real content pages.
    pub fn to_origin(self) -> OriginPage {
        OriginPage(self.0 - 1)
    }

    /// Path-relative reference used for pagination links inside the archive.
    pub fn relative_ref(self) -> String {
        format!("./{}", self.0)
    }
}

impl fmt::Display for LocalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps an origin page number to the archive's numbering.
///
/// `None` is the not-a-number case (a relation URL without a usable `pageNumber`)
/// and maps to page 1, the same page origin 0 maps to. The feed only produces the
/// sentinel for its head page, so the two never name different content.
/// A number with no successor is treated like a missing one.
pub fn to_local(origin: Option<OriginPage>) -> LocalPage {
    origin
        .and_then(|page| page.0.checked_add(1))
        .map_or(LocalPage::SENTINEL, LocalPage)
}

/// Parses a `pageNumber` query value the way a lenient integer parser would:
/// optional leading whitespace and `+`, then digits, trailing garbage ignored.
/// Empty, negative and non-numeric input yields `None`.
pub fn parse_page_number(raw: &str) -> Option<OriginPage> {
    LEADING_INTEGER
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
        .map(OriginPage)
}
