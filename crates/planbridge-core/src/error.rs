use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates failures raised by the pure publishing helpers.
pub enum CoreError {
    #[error("invalid test case id matcher '{pattern}': {source}")]
    InvalidCaseIdMatcher {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid attachment pattern '{pattern}': {source}")]
    InvalidAttachmentPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("pagination stopped after {max_pages} full pages of {page_size} items")]
    PageLimitExceeded { max_pages: usize, page_size: usize },
}
