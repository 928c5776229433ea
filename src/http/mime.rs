//! MIME type helpers.
//!
//! Spartan carries the MIME type of a successful response in the meta field,
//! optionally followed by parameters (`text/gemini; lang=en`). These helpers
//! pull out the bare type token and classify it.

/// Well-known content types. Anything else is `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    TextGemini,
    TextPlain,
    TextHtml,
    TextCss,
    TextXml,
    ApplicationJson,
    ApplicationXml,
    ApplicationJavascript,
    ApplicationOctetStream,
    ApplicationPdf,
    ApplicationWasm,
    ImagePng,
    ImageJpeg,
    ImageGif,
    ImageWebp,
    ImageSvgXml,
    ImageXIcon,
    Custom,
}

/// Returns the MIME type token of a meta string: everything up to the first
/// `;`, `,` or space.
///
/// ```
/// # use spartoi::http::mime::essence;
/// assert_eq!(essence("text/gemini; lang=en"), "text/gemini");
/// assert_eq!(essence("image/png"), "image/png");
/// ```
pub fn essence(meta: &str) -> &str {
    let end = meta.find([';', ',', ' ']).unwrap_or(meta.len());
    &meta[..end]
}

impl ContentType {
    /// Classifies the essence of `meta`. Matching is ASCII case-insensitive.
    pub fn from_meta(meta: &str) -> Self {
        let mime = essence(meta).to_ascii_lowercase();
        match mime.as_str() {
            "text/gemini" => ContentType::TextGemini,
            "text/plain" => ContentType::TextPlain,
            "text/html" => ContentType::TextHtml,
            "text/css" => ContentType::TextCss,
            "text/xml" => ContentType::TextXml,
            "application/json" => ContentType::ApplicationJson,
            "application/xml" => ContentType::ApplicationXml,
            "application/javascript" | "application/x-javascript" => {
                ContentType::ApplicationJavascript
            }
            "application/octet-stream" => ContentType::ApplicationOctetStream,
            "application/pdf" => ContentType::ApplicationPdf,
            "application/wasm" => ContentType::ApplicationWasm,
            "image/png" => ContentType::ImagePng,
            "image/jpeg" => ContentType::ImageJpeg,
            "image/gif" => ContentType::ImageGif,
            "image/webp" => ContentType::ImageWebp,
            "image/svg+xml" => ContentType::ImageSvgXml,
            "image/x-icon" => ContentType::ImageXIcon,
            _ => ContentType::Custom,
        }
    }
}

/// Whether `meta` names a type in `accepted`. An empty list accepts all.
pub fn is_accepted(meta: &str, accepted: &[String]) -> bool {
    if accepted.is_empty() {
        return true;
    }
    let mime = essence(meta);
    accepted.iter().any(|a| a == mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essence_stops_at_first_separator() {
        assert_eq!(essence("text/plain,charset=utf-8"), "text/plain");
        assert_eq!(essence("text/plain charset"), "text/plain");
        assert_eq!(essence(""), "");
    }

    #[test]
    fn empty_allow_list_accepts_everything() {
        assert!(is_accepted("anything/at-all", &[]));
        assert!(!is_accepted("image/png", &["text/gemini".to_string()]));
        assert!(is_accepted("text/gemini; lang=en", &["text/gemini".to_string()]));
    }
}
