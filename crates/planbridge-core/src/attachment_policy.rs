//! Attachment selection and naming rules.

use std::path::Path;

use regex::Regex;

use crate::identity::random_hex_id;
use crate::text::scrub_file_name;
use crate::CoreError;

/// Attachment names matched literally rather than as regular expressions.
pub const LITERAL_ATTACHMENT_KINDS: &[&str] = &["screenshot", "video", "trace"];
pub const DEFAULT_ATTACHMENT_EXTENSION: &str = "bin";

const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpeg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("video/webm", "webm"),
    ("video/mp4", "mp4"),
    ("application/zip", "zip"),
    ("application/json", "json"),
    ("application/pdf", "pdf"),
    ("application/xml", "xml"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
    ("text/markdown", "md"),
];

#[derive(Debug, Clone)]
enum AttachmentPattern {
    Literal(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
/// Decides which runner attachments are uploaded.
pub struct AttachmentMatcher {
    patterns: Vec<AttachmentPattern>,
}

impl Default for AttachmentMatcher {
    fn default() -> Self {
        Self {
            patterns: vec![AttachmentPattern::Literal("screenshot".to_string())],
        }
    }
}

impl AttachmentMatcher {
    /// `screenshot`, `video` and `trace` match names exactly; anything else is
    /// compiled as a regular expression.
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self, CoreError> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            if LITERAL_ATTACHMENT_KINDS.contains(&pattern) {
                compiled.push(AttachmentPattern::Literal(pattern.to_string()));
                continue;
            }
            let regex =
                Regex::new(pattern).map_err(|source| CoreError::InvalidAttachmentPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            compiled.push(AttachmentPattern::Regex(regex));
        }
        Ok(Self { patterns: compiled })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| match pattern {
            AttachmentPattern::Literal(literal) => literal == name,
            AttachmentPattern::Regex(regex) => regex.is_match(name),
        })
    }
}

/// Map a content type to a file extension.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let base = content_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == base)
        .map(|(_, extension)| *extension)
}

/// Map a file extension back to its content type.
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
    let normalized = if normalized == "jpg" {
        "jpeg".to_string()
    } else {
        normalized
    };
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(_, known)| *known == normalized)
        .map(|(content_type, _)| *content_type)
}

/// Pick an extension from the content type, then the path, else `bin`.
pub fn infer_extension(content_type: Option<&str>, path: Option<&Path>) -> String {
    if let Some(extension) = content_type.and_then(extension_for_content_type) {
        return extension.to_string();
    }
    path.and_then(|path| path.extension())
        .and_then(|extension| extension.to_str())
        .and_then(content_type_for_extension)
        .and_then(extension_for_content_type)
        .unwrap_or(DEFAULT_ATTACHMENT_EXTENSION)
        .to_string()
}

/// Scrubbed attachment name with a random hex suffix, e.g. `login_shot_1a2b3c4d.png`.
pub fn attachment_file_name(name: &str, extension: &str) -> String {
    format!("{}_{}.{}", scrub_file_name(name), random_hex_id(), extension)
}
