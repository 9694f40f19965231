//! HTTP Media Source
//!
//! Loads media resources over HTTP(S) for the media blob cache and decides
//! whether a fetched resource can play through.

pub mod error;
pub mod source;

pub use error::{HttpSourceError, Result};
pub use source::{is_playable_content_type, HttpMediaSource};
