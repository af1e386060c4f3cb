//! `git --version` parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::MIN_GIT_VERSION;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"git version (\d+)\.(\d+)(?:\.(\d+))?").unwrap_or_else(|e| unreachable!("{e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Parse output such as `git version 2.39.2 (Apple Git-143)`.
    pub fn parse(output: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(output)?;
        let num = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u32>().ok());
        Some(Self {
            major: num(1)?,
            minor: num(2)?,
            patch: num(3)?,
        })
    }

    pub fn minimum() -> Self {
        let (major, minor, patch) = MIN_GIT_VERSION;
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::minimum()
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
