//! Key Pattern Registry
//!
//! The only place cache keys are built. Keys follow
//! `prefix:domain:identifier[:subkey]`; everything else derives them from a
//! `(Domain, id)` pair through [`KeyRegistry`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Domain ==
/// Entity category with its own TTL policy and dependency-graph row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Event,
    EventCurrent,
    Phase,
    Team,
    Standing,
    Player,
    PlayerValue,
    PlayerStat,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Event,
        Domain::EventCurrent,
        Domain::Phase,
        Domain::Team,
        Domain::Standing,
        Domain::Player,
        Domain::PlayerValue,
        Domain::PlayerStat,
    ];

    /// Key segment for this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Event => "event",
            Domain::EventCurrent => "event_current",
            Domain::Phase => "phase",
            Domain::Team => "team",
            Domain::Standing => "standing",
            Domain::Player => "player",
            Domain::PlayerValue => "player_value",
            Domain::PlayerStat => "player_stat",
        }
    }

    /// Default TTL class for writes in this domain.
    pub fn ttl_class(self) -> TtlClass {
        match self {
            Domain::Event => TtlClass::DerivedData,
            Domain::EventCurrent => TtlClass::Weekly,
            Domain::Phase => TtlClass::DerivedData,
            Domain::Team => TtlClass::DerivedData,
            Domain::Standing => TtlClass::Temporary,
            Domain::Player => TtlClass::DerivedData,
            Domain::PlayerValue => TtlClass::Daily,
            Domain::PlayerStat => TtlClass::Temporary,
        }
    }

    /// TTL in seconds for writes in this domain.
    pub fn ttl_secs(self) -> u64 {
        self.ttl_class().seconds()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| CacheError::Validation(format!("unknown domain '{}'", s)))
    }
}

// == TTL Policy ==
/// Duration classes for cache expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// 30 days
    Metadata,
    /// 24 hours
    DerivedData,
    /// 1 hour
    Temporary,
    /// 24 hours
    Daily,
    /// 7 days
    Weekly,
}

impl TtlClass {
    pub const fn seconds(self) -> u64 {
        match self {
            TtlClass::Metadata => 2_592_000,
            TtlClass::DerivedData => 86_400,
            TtlClass::Temporary => 3_600,
            TtlClass::Daily => 86_400,
            TtlClass::Weekly => 604_800,
        }
    }
}

// == Cache Key ==
/// A fully built cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps a key returned by the backend (e.g. from KEYS).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// == Key Registry ==
/// Builds keys and related-key glob patterns under one prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRegistry {
    prefix: String,
}

impl KeyRegistry {
    /// An empty prefix yields keys that start at the domain (`team:7`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn build(&self, parts: &[&str]) -> String {
        let mut key = String::new();
        if !self.prefix.is_empty() {
            key.push_str(&self.prefix);
            key.push(':');
        }
        key.push_str(&parts.join(":"));
        key
    }

    /// Canonical single-entity key: `prefix:domain:id`.
    pub fn primary_key(&self, domain: Domain, id: &str) -> CacheKey {
        CacheKey(self.build(&[domain.as_str(), id]))
    }

    /// Collection key scoped by another entity: `prefix:domain:scope:id`,
    /// e.g. players of team 7 is `player:team:7`.
    pub fn scoped_key(&self, domain: Domain, scope: Domain, id: &str) -> CacheKey {
        CacheKey(self.build(&[domain.as_str(), scope.as_str(), id]))
    }

    /// A field of a hash-shaped entry: `prefix:domain:id:subkey`.
    pub fn subkey(&self, domain: Domain, id: &str, subkey: &str) -> CacheKey {
        CacheKey(self.build(&[domain.as_str(), id, subkey]))
    }

    /// Key holding the full collection of a domain: `prefix:domain:all`.
    pub fn collection_key(&self, domain: Domain) -> CacheKey {
        CacheKey(self.build(&[domain.as_str(), "all"]))
    }

    /// Glob matching every `dependent` key that embeds `source`'s entity
    /// `id`: `prefix:dependent:*:id*`.
    ///
    /// The scope segment is a wildcard: a dependent collection may embed the
    /// source id under any scope name (`player:team:7`, `player:squad:7`).
    pub fn related_pattern(&self, dependent: Domain, _source: Domain, id: &str) -> String {
        let id = format!("{}*", escape_glob(id));
        self.build(&[dependent.as_str(), "*", &id])
    }

    /// Well-known key written by health checks.
    pub fn health_key(&self) -> CacheKey {
        CacheKey(self.build(&["health", "check"]))
    }
}

/// Escapes glob metacharacters so ids are matched literally.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
