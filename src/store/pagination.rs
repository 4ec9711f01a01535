//! Deterministic page windowing for paged responses.
//!
//! The wire cursor is a page index. Page boundaries are computed by greedy
//! packing from the start of the sequence: at most `size` items and
//! `max_bytes` of weight per page, always at least one item. The same data
//! yields the same boundaries on every call, so a client can restart from
//! any index.

use crate::config::LimitsConfig;
use crate::error::StrataDbResult;

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub index: u64,
    pub size: usize,
    pub max_bytes: usize,
}

impl Page {
    /// Build a page spec from a request. A requested size is honored up to
    /// the server cap; zero or absent falls back to the default.
    pub fn new(index: u64, requested_size: Option<usize>, limits: &LimitsConfig) -> Self {
        let size = match requested_size {
            Some(0) | None => limits.page_size,
            Some(n) => n.min(limits.page_size),
        };
        Self {
            index,
            size,
            max_bytes: limits.max_page_bytes,
        }
    }
}

/// Walk a sequence of fallible items and return the `page.index`-th page
/// plus whether more pages follow. Consumes only as much of the iterator
/// as the answer needs.
pub fn paginate<T, I, W>(items: I, page: &Page, weight: W) -> StrataDbResult<(Vec<T>, bool)>
where
    I: IntoIterator<Item = StrataDbResult<T>>,
    W: Fn(&T) -> usize,
{
    let mut current_page: u64 = 0;
    let mut count = 0usize;
    let mut bytes = 0usize;
    let mut out = Vec::new();

    for item in items {
        let item = item?;
        let w = weight(&item);
        if count >= page.size || (count > 0 && bytes + w > page.max_bytes) {
            // Page boundary
            if current_page == page.index {
                return Ok((out, true));
            }
            current_page += 1;
            count = 0;
            bytes = 0;
        }
        if current_page == page.index {
            out.push(item);
        }
        count += 1;
        bytes += w;
    }
    Ok((out, false))
}
