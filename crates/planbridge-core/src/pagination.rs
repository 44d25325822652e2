//! Skip/top pagination against endpoints that cap page length.

use std::future::Future;

use crate::CoreError;

/// Items per page; a page of exactly this length suggests more data exists.
pub const DEFAULT_PAGE_SIZE: usize = 200;
/// Upper bound on consecutive full pages before giving up.
pub const DEFAULT_MAX_PAGES: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Offset window for one page request.
pub struct PageRequest {
    pub skip: usize,
    pub top: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Drives a page fetcher until a short page is returned.
pub struct Paginator {
    page_size: usize,
    max_pages: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_MAX_PAGES)
    }
}

impl Paginator {
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Call `fetch` with increasing skip offsets and concatenate the pages in
    /// request order. Stops on the first page shorter than the page size.
    pub async fn fetch_all<T, E, F, Fut>(&self, mut fetch: F) -> Result<Vec<T>, E>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        E: From<CoreError>,
    {
        let mut rows = Vec::new();
        let mut skip = 0_usize;
        let mut pages = 0_usize;
        loop {
            if pages >= self.max_pages {
                return Err(CoreError::PageLimitExceeded {
                    max_pages: self.max_pages,
                    page_size: self.page_size,
                }
                .into());
            }
            let page = fetch(PageRequest {
                skip,
                top: self.page_size,
            })
            .await?;
            pages = pages.saturating_add(1);
            let page_len = page.len();
            rows.extend(page);
            if page_len < self.page_size {
                return Ok(rows);
            }
            skip = skip.saturating_add(self.page_size);
        }
    }
}

/// Split `items` into consecutive chunks of at most `size` items.
pub fn chunk_items<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
