//! Per-chain emission watermark.
//!
//! # Purpose
//!
//! Re-publishing every historical epoch on each poll would flood the sink
//! with duplicates. This module tracks, per chain, the highest epoch whose
//! metrics were already confirmed emitted, so a tick only walks the epochs
//! above it.
//!
//! # Invariants
//!
//! - **Non-decreasing**: [`WatermarkTracker::advance`] only ever moves a
//!   watermark up; lower or equal epochs are a no-op, so out-of-order calls
//!   within one tick leave the maximum in place.
//! - **Floor 0**: a chain that was never seen reads as epoch 0.
//! - **No deletion**: chains are never forgotten for the process lifetime.
//! - **In-memory only**: state is lost on restart and re-seeded from the
//!   store according to the [`ColdStartPolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ChainId, Epoch, MaxEpochs};

// ---------------------------------------------------------------------------
// Cold-start policy
// ---------------------------------------------------------------------------

/// How the tracker is seeded from the first store read at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartPolicy {
    /// Seed each chain at its current max positive epoch: history that
    /// existed before the process started is not re-emitted.
    #[default]
    SkipHistory,
    /// Seed nothing: every chain starts at the floor and its full history
    /// is emitted on the first tick.
    ReplayAll,
}

impl ColdStartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColdStartPolicy::SkipHistory => "skip_history",
            ColdStartPolicy::ReplayAll => "replay_all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skip_history" | "skip-history" => Some(ColdStartPolicy::SkipHistory),
            "replay_all" | "replay-all" => Some(ColdStartPolicy::ReplayAll),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Highest confirmed-emitted epoch per chain.
///
/// Constructed explicitly at startup (see [`WatermarkTracker::seeded`]) and
/// then owned by the scheduler for the lifetime of the process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatermarkTracker {
    marks: BTreeMap<ChainId, Epoch>,
}

impl WatermarkTracker {
    /// The watermark of a chain that has never been seen.
    pub const FLOOR: Epoch = 0;

    /// Empty tracker: every chain reads as [`Self::FLOOR`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tracker from one read of the store's max positive epochs.
    pub fn seeded(policy: ColdStartPolicy, max_epochs: &MaxEpochs) -> Self {
        let mut tracker = Self::new();
        if policy == ColdStartPolicy::SkipHistory {
            for (chain, epoch) in max_epochs {
                tracker.advance(chain, *epoch);
            }
        }
        tracker
    }

    /// Last epoch confirmed emitted for `chain`, or [`Self::FLOOR`].
    pub fn get(&self, chain: &str) -> Epoch {
        self.marks.get(chain).copied().unwrap_or(Self::FLOOR)
    }

    /// Move the watermark of `chain` to `epoch` if and only if it is higher.
    ///
    /// Returns `true` when the watermark moved.
    pub fn advance(&mut self, chain: &str, epoch: Epoch) -> bool {
        match self.marks.get_mut(chain) {
            Some(current) if epoch > *current => {
                *current = epoch;
                true
            }
            Some(_) => false,
            None => {
                // An unseen chain sits at the floor; recording the floor
                // itself is not an advance.
                self.marks.insert(chain.to_string(), epoch);
                epoch > Self::FLOOR
            }
        }
    }

    /// `true` if the chain has an entry (seeded or advanced at least once).
    pub fn contains(&self, chain: &str) -> bool {
        self.marks.contains_key(chain)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Copy of all watermarks, ordered by chain.
    pub fn snapshot(&self) -> BTreeMap<ChainId, Epoch> {
        self.marks.clone()
    }
}
