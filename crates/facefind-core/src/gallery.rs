//! Gallery view model: display ordering, confidence badges, detail preview.
//!
//! Everything here is derived from a [`MatchData`] snapshot. The stored data
//! is never reordered; the view keeps its own sorted copy.

use crate::types::{Match, MatchData, MatchSummary};
use std::sync::Arc;
use thiserror::Error;

const HIGH_TIER_FLOOR: f64 = 0.30;
const MEDIUM_TIER_FLOOR: f64 = 0.10;

/// Badge colour class for a match confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// Classify a confidence: `> 0.30` high, `(0.10, 0.30]` medium, `<= 0.10` low.
    pub fn of(confidence: f64) -> Self {
        if confidence > HIGH_TIER_FLOOR {
            Self::High
        } else if confidence > MEDIUM_TIER_FLOOR {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence rendered as a whole percentage, e.g. `0.873` → `"87%"`.
///
/// Halves round up (`0.125` → `"13%"`).
pub fn badge_label(confidence: f64) -> String {
    format!("{}%", (confidence * 100.0).round())
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GalleryError {
    #[error("no match at position {index} (gallery has {len})")]
    OutOfRange { index: usize, len: usize },
}

/// One entry of the sorted grid.
#[derive(Debug, Clone, Copy)]
pub struct GalleryItem<'a> {
    /// 1-based display position.
    pub position: usize,
    pub item: &'a Match,
    pub tier: ConfidenceTier,
}

impl GalleryItem<'_> {
    pub fn badge(&self) -> String {
        badge_label(self.item.confidence)
    }
}

/// Sorted, browsable view over one `MatchData` snapshot.
#[derive(Debug, Clone)]
pub struct GalleryView {
    source: Arc<MatchData>,
    /// Indices into `source.matches`, confidence descending.
    order: Vec<usize>,
    preview: Option<usize>,
}

impl GalleryView {
    pub fn new(source: Arc<MatchData>) -> Self {
        let order = display_order(&source.matches);
        Self {
            source,
            order,
            preview: None,
        }
    }

    /// Replace the underlying snapshot, recomputing the order.
    ///
    /// An open preview is closed: its position may no longer refer to the same photo.
    pub fn refresh(&mut self, source: Arc<MatchData>) {
        self.order = display_order(&source.matches);
        self.source = source;
        self.preview = None;
    }

    pub fn summary(&self) -> &MatchSummary {
        &self.source.summary
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Items in display order.
    pub fn items(&self) -> impl Iterator<Item = GalleryItem<'_>> + '_ {
        self.order.iter().enumerate().map(|(pos, &idx)| {
            let item = &self.source.matches[idx];
            GalleryItem {
                position: pos + 1,
                item,
                tier: ConfidenceTier::of(item.confidence),
            }
        })
    }

    /// Open the detail preview for the item at 1-based `position`.
    ///
    /// Replaces any preview already open.
    pub fn open(&mut self, position: usize) -> Result<&Match, GalleryError> {
        let len = self.order.len();
        if position == 0 || position > len {
            return Err(GalleryError::OutOfRange { index: position, len });
        }
        self.preview = Some(position - 1);
        Ok(&self.source.matches[self.order[position - 1]])
    }

    pub fn close(&mut self) {
        self.preview = None;
    }

    pub fn preview(&self) -> Option<&Match> {
        self.preview
            .map(|slot| &self.source.matches[self.order[slot]])
    }
}

/// Stable sort of match indices by confidence, highest first.
fn display_order(matches: &[Match]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..matches.len()).collect();
    order.sort_by(|&a, &b| matches[b].confidence.total_cmp(&matches[a].confidence));
    order
}
