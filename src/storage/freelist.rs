use crate::error::{Error, Result};
use crate::storage::page::{META_PAGE_ID, PAGE_ID_SIZE, Page, PageId};

/// max_page(8B) + released count(8B)
const HEADER_SIZE: usize = 2 * PAGE_ID_SIZE;

/// Page id allocator.
///
/// Hands out never-used ids by bumping `max_page`, and reuses released ids
/// most-recently-released first. There is no delay before reuse, so an id
/// released by one operation may be returned by the very next allocation.
///
/// format:
/// ┌──────────┬─────────┬────────┬─────┐
/// │ max_page │ count   │ id     │ ... │
/// │ (8B)     │ (8B)    │ (8B)   │     │
/// └──────────┴─────────┴────────┴─────┘
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeList {
    max_page: PageId,

    released_pages: Vec<PageId>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_page(&mut self) -> PageId {
        if let Some(page_id) = self.released_pages.pop() {
            return page_id;
        }
        self.max_page += 1;
        self.max_page
    }

    pub fn release_page(&mut self, page_id: PageId) {
        if page_id == META_PAGE_ID {
            tracing::warn!("ignoring release of the meta page");
            return;
        }
        self.released_pages.push(page_id);
    }

    pub fn max_page(&self) -> PageId {
        self.max_page
    }

    pub fn released_pages(&self) -> &[PageId] {
        &self.released_pages
    }

    /// number of released ids that fit in one page
    pub fn capacity(page_size: usize) -> usize {
        page_size.saturating_sub(HEADER_SIZE) / PAGE_ID_SIZE
    }

    pub fn encode(&self, page: &mut Page) -> Result<()> {
        let capacity = Self::capacity(page.len());
        if self.released_pages.len() > capacity {
            return Err(Error::FreeListFull {
                count: self.released_pages.len(),
                capacity,
            });
        }

        let mut pos = 0;
        page.put_u64(pos, self.max_page);
        pos += PAGE_ID_SIZE;

        page.put_u64(pos, self.released_pages.len() as u64);
        pos += PAGE_ID_SIZE;

        for &page_id in &self.released_pages {
            page.put_u64(pos, page_id);
            pos += PAGE_ID_SIZE;
        }

        Ok(())
    }

    pub fn decode(page: &Page) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptPage {
            page: page.id,
            reason,
        };

        let max_page = page
            .read_u64(0)
            .ok_or_else(|| corrupt("freelist header is truncated".to_string()))?;
        let count = page
            .read_u64(PAGE_ID_SIZE)
            .ok_or_else(|| corrupt("freelist header is truncated".to_string()))?;

        let capacity = Self::capacity(page.len());
        if count > capacity as u64 {
            return Err(corrupt(format!(
                "freelist claims {count} released pages, a page fits {capacity}"
            )));
        }

        let mut released_pages = Vec::with_capacity(count as usize);
        let mut pos = HEADER_SIZE;
        for _ in 0..count {
            let page_id = page
                .read_u64(pos)
                .ok_or_else(|| corrupt("freelist entry is truncated".to_string()))?;
            if page_id == META_PAGE_ID || page_id > max_page {
                return Err(corrupt(format!(
                    "released page {page_id} outside 1..={max_page}"
                )));
            }
            released_pages.push(page_id);
            pos += PAGE_ID_SIZE;
        }

        Ok(Self {
            max_page,
            released_pages,
        })
    }
}
