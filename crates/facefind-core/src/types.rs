use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One photo the matching service judged to contain the user's face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Location of the full photo (URL or CDN path).
    pub photo_url: String,
    /// Identifies the detected face instance within the event corpus.
    pub face_id: String,
    /// Face rectangle as produced by the matching service.
    ///
    /// The coordinate convention belongs to the service; this client never
    /// interprets it and passes the four numbers through unchanged.
    pub bounding_box: [f64; 4],
    /// Match confidence in [0, 1].
    pub confidence: f64,
}

/// Descriptive metadata returned alongside the matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub total_matched_photos: u64,
    pub total_faces_considered: u64,
    /// Threshold the service applied. Displayed only, never used for filtering.
    pub matching_threshold: f64,
}

/// Full body of a successful match response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchData {
    /// Matches in the order the service sent them.
    pub matches: Vec<Match>,
    pub summary: MatchSummary,
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("match {face_id}: confidence {value} outside [0, 1]")]
    Confidence { face_id: String, value: f64 },
    #[error("matching threshold {0} outside [0, 1]")]
    Threshold(f64),
}

impl MatchData {
    /// Reject values the service contract rules out.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for m in &self.matches {
            if !unit_interval(m.confidence) {
                return Err(ValidationError::Confidence {
                    face_id: m.face_id.clone(),
                    value: m.confidence,
                });
            }
        }
        if !unit_interval(self.summary.matching_threshold) {
            return Err(ValidationError::Threshold(self.summary.matching_threshold));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

fn unit_interval(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}
