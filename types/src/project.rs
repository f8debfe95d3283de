//! Plane project definitions.

use serde::{Deserialize, Serialize};

/// Project visibility as Plane encodes it.
pub const NETWORK_PRIVATE: u8 = 0;
/// Public project (the default for newly created projects).
pub const NETWORK_PUBLIC: u8 = 2;

/// A Plane project as returned by the REST API.
///
/// Only the fields the tools read are modelled; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// Project UUID
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Short uppercase code used in issue codes (e.g. `CLT` in `CLT-37`)
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub network: Option<u8>,
}

impl Project {
    /// Whether this project's identifier matches an issue-code prefix.
    ///
    /// Plane identifiers are uppercase, but issue codes typed by users often
    /// are not, so the comparison ignores ASCII case.
    pub fn matches_identifier(&self, code: &str) -> bool {
        self.identifier.eq_ignore_ascii_case(code)
    }
}
