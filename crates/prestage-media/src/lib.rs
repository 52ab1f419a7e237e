//! Prestage Media
//!
//! Media pipeline state observed by the preloader.
//!
//! Features:
//! - Buffered time ranges and duration tracking for audio/video
//! - Image decode completion flag
//! - MIME inference for `<source type>` attributes

pub mod mime;
pub mod state;

pub use mime::mime_for_url;
pub use state::{ImageState, MediaState, TimeRanges};
