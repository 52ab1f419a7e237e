//! MIME Inference
//!
//! Maps candidate URLs to media MIME types so `<source>` elements can carry
//! a `type` attribute and the pipeline can skip formats it cannot decode.

use url::Url;

/// Infer the MIME type of a media URL from its file extension.
///
/// Query strings and fragments are ignored. Returns `None` for unknown or
/// missing extensions.
pub fn mime_for_url(raw: &str) -> Option<&'static str> {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        // Relative URL: resolve against a throwaway base to reuse the
        // same path normalization.
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse("file:///").ok()?;
            base.join(raw).ok()?.path().to_string()
        }
        Err(_) => return None,
    };

    let ext = path.rsplit('/').next()?.rsplit_once('.')?.1.to_ascii_lowercase();
    mime_for_extension(&ext)
}

/// MIME type for a lowercase file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "ogv" => Some("video/ogg"),
        "mp3" => Some("audio/mpeg"),
        "ogg" | "oga" => Some("audio/ogg"),
        "wav" => Some("audio/wav"),
        "aac" => Some("audio/aac"),
        "m4a" => Some("audio/mp4"),
        _ => None,
    }
}
