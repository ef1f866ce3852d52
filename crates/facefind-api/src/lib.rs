//! facefind-api: client for the external face-matching service.
//!
//! One selfie in, one `POST` out: the JPEG is wrapped as a data URI, sent as
//! `{"image": "..."}`, and the response is parsed into [`MatchData`].
//!
//! [`MatchData`]: facefind_core::MatchData

pub mod client;

pub use client::{jpeg_data_uri, MatchApi, MatchClient, MatchError};
