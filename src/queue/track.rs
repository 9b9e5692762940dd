//! Track references held by the queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a track in the device media index.
///
/// The queue never interprets it; metadata lookups happen outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub i64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TrackId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Token distinguishing one occurrence of a track from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceKey(Uuid);

impl OccurrenceKey {
    /// Mint a fresh key.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a key from its persisted text form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for OccurrenceKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One occurrence of a track in the queue.
///
/// The same [`TrackId`] may be queued several times; each occurrence gets
/// its own [`OccurrenceKey`] so removals and moves hit exactly one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    track_id: TrackId,
    occurrence_key: OccurrenceKey,
}

impl TrackRef {
    /// Create a reference with a freshly minted occurrence key.
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            occurrence_key: OccurrenceKey::new(),
        }
    }

    /// Rebuild a reference from persisted parts.
    pub fn from_parts(track_id: TrackId, occurrence_key: OccurrenceKey) -> Self {
        Self {
            track_id,
            occurrence_key,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn occurrence_key(&self) -> OccurrenceKey {
        self.occurrence_key
    }
}

/// Mint one [`TrackRef`] per id, preserving order.
pub fn mint_refs<I>(ids: I) -> Vec<TrackRef>
where
    I: IntoIterator<Item = TrackId>,
{
    ids.into_iter().map(TrackRef::new).collect()
}
