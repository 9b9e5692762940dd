//! Current-entry pointer and its adjustment rules.
//!
//! All cursor arithmetic lives in [`PositionCursor::adjust_for_mutation`],
//! one match arm per [`Mutation`] kind. Call sites never patch the index
//! themselves.

use serde::{Deserialize, Serialize};

use super::track::TrackRef;
use crate::error::{Error, Result};

/// Structural change applied to the queue, as seen by the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// `count` entries inserted starting at `index`
    Inserted { index: usize, count: usize },
    /// `count` entries removed starting at `index`
    Removed { index: usize, count: usize },
    /// Block `[from, from + count)` now starts at `to`
    Moved { from: usize, to: usize, count: usize },
    /// Same entries, new order (shuffle)
    Permuted,
    /// Cursor explicitly pointed at `index`; entries untouched
    Selected { index: usize },
    /// Whole queue swapped for new content
    Replaced,
}

/// Index of the entry currently playing, or `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionCursor(Option<usize>);

impl PositionCursor {
    /// Cursor pointing at nothing.
    pub const NONE: Self = Self(None);

    pub fn at(index: usize) -> Self {
        Self(Some(index))
    }

    pub fn current(&self) -> Option<usize> {
        self.0
    }

    /// Point at `index`, rejecting indices outside `[0, len)`.
    pub fn set_to(&mut self, index: usize, len: usize) -> Result<()> {
        if index >= len {
            return Err(Error::out_of_range(index, len));
        }
        self.0 = Some(index);
        Ok(())
    }

    /// Bring a cursor from an untrusted source (disk) in line with `len`.
    ///
    /// Returns `true` if the value had to change.
    pub fn normalize(&mut self, len: usize) -> bool {
        let fixed = match self.0 {
            _ if len == 0 => None,
            Some(i) if i < len => Some(i),
            Some(_) => Some(0),
            None => None,
        };
        let changed = fixed != self.0;
        self.0 = fixed;
        changed
    }

    /// Recompute the cursor after `mutation` turned `before` into `after`.
    ///
    /// Index rules for inserts and removals; moves and permutations follow
    /// the entry the cursor pointed at, by occurrence key.
    pub fn adjust_for_mutation(&mut self, mutation: &Mutation, before: &[TrackRef], after: &[TrackRef]) {
        if after.is_empty() {
            self.0 = None;
            return;
        }

        self.0 = match (*mutation, self.0) {
            (Mutation::Replaced, _) => Some(0),
            (Mutation::Selected { index }, _) if index < after.len() => Some(index),
            (Mutation::Selected { .. }, c) => c,

            (_, None) => None,

            (Mutation::Inserted { index, count }, Some(c)) if index <= c => Some(c + count),
            (Mutation::Inserted { .. }, Some(c)) => Some(c),

            (Mutation::Removed { index, count }, Some(c)) if index + count <= c => Some(c - count),
            // Cursor entry removed: stay on the same slot, wrap if it fell off the end
            (Mutation::Removed { index, .. }, Some(c)) if index <= c => {
                if index < after.len() {
                    Some(index)
                } else {
                    Some(0)
                }
            }
            (Mutation::Removed { .. }, Some(c)) => Some(c),

            (Mutation::Moved { .. } | Mutation::Permuted, Some(c)) => {
                follow_entry(c, before, after)
            }
        };
    }
}

/// Find where the entry at `before[c]` ended up in `after`.
fn follow_entry(c: usize, before: &[TrackRef], after: &[TrackRef]) -> Option<usize> {
    let Some(key) = before.get(c).map(TrackRef::occurrence_key) else {
        return Some(c.min(after.len() - 1));
    };
    match after.iter().position(|t| t.occurrence_key() == key) {
        Some(i) => Some(i),
        None => {
            tracing::warn!(cursor = c, "Cursor entry missing after reorder, clamping");
            Some(c.min(after.len() - 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::track::{TrackId, mint_refs};

    fn refs(n: i64) -> Vec<TrackRef> {
        mint_refs((0..n).map(TrackId))
    }

    /// Apply `mutation` to `before` the way the store does.
    fn apply(before: &[TrackRef], mutation: &Mutation) -> Vec<TrackRef> {
        let mut v = before.to_vec();
        match *mutation {
            Mutation::Inserted { index, count } => {
                let new = refs(count as i64);
                v.splice(index..index, new);
            }
            Mutation::Removed { index, count } => {
                v.drain(index..index + count);
            }
            Mutation::Moved { from, to, count } => {
                let block: Vec<_> = v.drain(from..from + count).collect();
                v.splice(to..to, block);
            }
            Mutation::Permuted => v.reverse(),
            Mutation::Selected { .. } => {}
            Mutation::Replaced => v = refs(2),
        }
        v
    }

    #[test]
    fn test_adjustment_table() {
        // (len, cursor, mutation, expected)
        let cases: Vec<(i64, Option<usize>, Mutation, Option<usize>)> = vec![
            // removals
            (3, Some(2), Mutation::Removed { index: 0, count: 1 }, Some(1)),
            (3, Some(1), Mutation::Removed { index: 1, count: 1 }, Some(1)),
            (3, Some(0), Mutation::Removed { index: 2, count: 1 }, Some(0)),
            (3, Some(2), Mutation::Removed { index: 2, count: 1 }, Some(0)),
            (1, Some(0), Mutation::Removed { index: 0, count: 1 }, None),
            (5, Some(4), Mutation::Removed { index: 1, count: 2 }, Some(2)),
            (5, Some(2), Mutation::Removed { index: 1, count: 3 }, Some(1)),
            (3, None, Mutation::Removed { index: 0, count: 1 }, None),
            // insertions
            (3, Some(1), Mutation::Inserted { index: 1, count: 2 }, Some(3)),
            (3, Some(1), Mutation::Inserted { index: 0, count: 1 }, Some(2)),
            (3, Some(1), Mutation::Inserted { index: 2, count: 1 }, Some(1)),
            (3, None, Mutation::Inserted { index: 0, count: 1 }, None),
            // moves follow the entry
            (4, Some(0), Mutation::Moved { from: 0, to: 2, count: 1 }, Some(2)),
            (4, Some(1), Mutation::Moved { from: 0, to: 2, count: 1 }, Some(0)),
            (4, Some(3), Mutation::Moved { from: 0, to: 2, count: 1 }, Some(3)),
            (4, Some(1), Mutation::Moved { from: 3, to: 0, count: 1 }, Some(2)),
            (4, Some(2), Mutation::Moved { from: 2, to: 2, count: 1 }, Some(2)),
            (5, Some(1), Mutation::Moved { from: 0, to: 3, count: 2 }, Some(4)),
            // permutation and replacement
            (4, Some(0), Mutation::Permuted, Some(3)),
            (3, Some(2), Mutation::Replaced, Some(0)),
            (3, None, Mutation::Replaced, Some(0)),
            (3, None, Mutation::Selected { index: 2 }, Some(2)),
            (3, Some(2), Mutation::Selected { index: 0 }, Some(0)),
            (3, Some(1), Mutation::Selected { index: 5 }, Some(1)),
        ];

        for (len, start, mutation, expected) in cases {
            let before = refs(len);
            let after = apply(&before, &mutation);
            let mut cursor = PositionCursor(start);
            cursor.adjust_for_mutation(&mutation, &before, &after);
            assert_eq!(
                cursor.current(),
                expected,
                "len={len} cursor={start:?} mutation={mutation:?}"
            );
        }
    }

    #[test]
    fn test_replaced_with_empty_clears() {
        let before = refs(3);
        let mut cursor = PositionCursor::at(1);
        cursor.adjust_for_mutation(&Mutation::Replaced, &before, &[]);
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn test_set_to_validates() {
        let mut cursor = PositionCursor::NONE;
        assert!(cursor.set_to(3, 3).unwrap_err().is_out_of_range());
        assert_eq!(cursor.current(), None);
        cursor.set_to(2, 3).unwrap();
        assert_eq!(cursor.current(), Some(2));
    }

    #[test]
    fn test_normalize() {
        let mut cursor = PositionCursor::at(9);
        assert!(cursor.normalize(3));
        assert_eq!(cursor.current(), Some(0));

        let mut cursor = PositionCursor::at(0);
        assert!(cursor.normalize(0));
        assert_eq!(cursor.current(), None);

        let mut cursor = PositionCursor::at(1);
        assert!(!cursor.normalize(2));
    }
}
