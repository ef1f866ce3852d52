//! Selfie submission: still capture → JPEG → match request → shared state.

use crate::capture::StillSource;
use facefind_api::{MatchApi, MatchError};
use facefind_core::{MatchWriter, Route};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What happened to one submit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Matches stored; continue to the gallery.
    Matched { matches: usize },
    /// The service found nobody.
    NoMatches,
    /// Non-success status or unreadable body.
    Rejected { reason: String },
    /// The request never got a response.
    TransportFailed { reason: String },
    /// No still could be taken or encoded.
    CaptureFailed { reason: String },
    /// No face framed; submitting is disabled.
    NotReady,
    /// A request is already in flight.
    Busy,
    /// The login view closed before the response arrived.
    Discarded,
}

impl LoginOutcome {
    /// Route to show after this outcome.
    pub fn next_route(&self) -> Route {
        match self {
            Self::Matched { .. } => Route::Gallery,
            _ => Route::Login,
        }
    }

    /// Text shown to the user, if any.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Matched { matches } => Some(format!("Found you in {matches} photo(s)!")),
            Self::NoMatches => Some("No matches found. Try another selfie.".to_string()),
            Self::Rejected { reason } => Some(format!("Matching failed: {reason}")),
            Self::TransportFailed { reason } => {
                Some(format!("Could not reach the matching service: {reason}"))
            }
            Self::CaptureFailed { reason } => Some(format!("Could not take a photo: {reason}")),
            Self::NotReady => {
                Some("Login is disabled until exactly one face is in frame.".to_string())
            }
            Self::Busy => Some("Still matching your selfie, please wait.".to_string()),
            Self::Discarded => None,
        }
    }
}

/// Tracks whether the login view is still on screen.
#[derive(Debug, Clone)]
pub struct ViewLifetime(Arc<AtomicBool>);

impl ViewLifetime {
    pub fn mounted() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Owns the only writer of the shared match state.
pub struct LoginFlow<A> {
    api: A,
    writer: MatchWriter,
    jpeg_quality: u8,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the request ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<A: MatchApi> LoginFlow<A> {
    pub fn new(api: A, writer: MatchWriter, jpeg_quality: u8) -> Self {
        Self {
            api,
            writer,
            jpeg_quality,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Take a still from `source`, send it for matching, and store the result.
    ///
    /// The shared state is written only for a non-empty match list, and only
    /// while `view` is still mounted.
    pub async fn submit<S: StillSource>(&self, source: &S, view: &ViewLifetime) -> LoginOutcome {
        if !source.is_ready() {
            return LoginOutcome::NotReady;
        }
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            return LoginOutcome::Busy;
        };

        let frame = match source.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "still capture failed");
                return LoginOutcome::CaptureFailed { reason: e.to_string() };
            }
        };
        let jpeg = match frame.encode_jpeg(self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!(error = %e, "JPEG encoding failed");
                return LoginOutcome::CaptureFailed { reason: e.to_string() };
            }
        };

        let result = self.api.find_matches(&jpeg).await;

        if !view.is_mounted() {
            tracing::info!("login view closed before the response arrived; discarding it");
            return LoginOutcome::Discarded;
        }

        match result {
            Ok(data) if data.is_empty() => {
                tracing::info!(
                    faces_considered = data.summary.total_faces_considered,
                    "no matches found"
                );
                LoginOutcome::NoMatches
            }
            Ok(data) => {
                let matches = data.matches.len();
                self.writer.set(data);
                tracing::info!(matches, "match data stored");
                LoginOutcome::Matched { matches }
            }
            Err(MatchError::Transport(e)) => {
                tracing::error!(error = %e, "match request failed in transport");
                LoginOutcome::TransportFailed { reason: e.to_string() }
            }
            Err(e @ (MatchError::Rejected { .. } | MatchError::Malformed(_) | MatchError::InvalidEndpoint(_))) => {
                LoginOutcome::Rejected { reason: e.to_string() }
            }
        }
    }
}
