//! Per-category version counters that let polling consumers notice changes
//! without subscribing to individual events.

use std::{borrow::Cow, convert::Infallible, fmt, str::FromStr};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use tokio::sync::watch;
use tracing::debug;

/// Data families that display surfaces refresh independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum RefreshCategory {
    /// Player entities and their denormalized fields.
    Players,
    /// Monthly payment records.
    Payments,
    /// Team rosters.
    Teams,
    /// Any other category registered by a consumer; built with [`RefreshCategory::named`].
    Named(CategoryName),
}

/// Name of a consumer-defined category. Never equal to a built-in category name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryName(Cow<'static, str>);

impl CategoryName {
    /// The name as reported in snapshots.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl RefreshCategory {
    /// Categories that are always reported, even before their first bump.
    pub const KNOWN: [RefreshCategory; 3] = [
        RefreshCategory::Players,
        RefreshCategory::Payments,
        RefreshCategory::Teams,
    ];

    /// Category called `name`, resolving built-in names to their own variant.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        match name.as_ref() {
            "players" => RefreshCategory::Players,
            "payments" => RefreshCategory::Payments,
            "teams" => RefreshCategory::Teams,
            _ => RefreshCategory::Named(CategoryName(name)),
        }
    }

    /// Key used in the polling contract.
    pub fn as_str(&self) -> &str {
        match self {
            RefreshCategory::Players => "players",
            RefreshCategory::Payments => "payments",
            RefreshCategory::Teams => "teams",
            RefreshCategory::Named(name) => name.as_str(),
        }
    }
}

impl fmt::Display for RefreshCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshCategory {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(RefreshCategory::named(value.to_owned()))
    }
}

/// Monotonic version of a category. Every category starts at [`Version::INITIAL`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a category that was never bumped.
    pub const INITIAL: Version = Version(0);

    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Version(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Process-wide version registry. Only [`InvalidationTracker::bump`] writes.
#[derive(Debug, Default)]
pub struct InvalidationTracker {
    versions: DashMap<RefreshCategory, watch::Sender<Version>>,
}

impl InvalidationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `category` to a version strictly greater than the previous one.
    pub fn bump(&self, category: &RefreshCategory) -> Version {
        let entry = self
            .versions
            .entry(category.clone())
            .or_insert_with(|| watch::channel(Version::INITIAL).0);

        let mut bumped = Version::INITIAL;
        entry.send_modify(|version| {
            *version = version.next();
            bumped = *version;
        });
        drop(entry);

        debug!(%category, version = %bumped, "invalidation version bumped");
        bumped
    }

    /// Current version of `category`.
    pub fn version(&self, category: &RefreshCategory) -> Version {
        self.versions
            .get(category)
            .map(|sender| *sender.borrow())
            .unwrap_or(Version::INITIAL)
    }

    /// Receive every future bump of `category`. The current value counts as seen.
    pub fn watch(&self, category: &RefreshCategory) -> watch::Receiver<Version> {
        self.versions
            .entry(category.clone())
            .or_insert_with(|| watch::channel(Version::INITIAL).0)
            .subscribe()
    }

    /// Versions of the known categories followed by every other category seen so far.
    pub fn snapshot(&self) -> IndexMap<String, u64> {
        let mut versions: IndexMap<String, u64> = RefreshCategory::KNOWN
            .iter()
            .map(|category| (category.to_string(), self.version(category).get()))
            .collect();

        let mut extra: Vec<(String, u64)> = self
            .versions
            .iter()
            .filter(|entry| !RefreshCategory::KNOWN.contains(entry.key()))
            .map(|entry| (entry.key().to_string(), entry.value().borrow().get()))
            .collect();
        extra.sort();
        versions.extend(extra);

        versions
    }
}
