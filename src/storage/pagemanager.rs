use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::btree::node::{NODE_HEADER_SIZE, Node};
use crate::error::{Error, Result};
use crate::storage::config::Options;
use crate::storage::freelist::FreeList;
use crate::storage::meta::{Meta, read_metapage, write_metapage};
use crate::storage::page::{META_PAGE_ID, Page, PageId};

/// Owns the backing file and turns pages into nodes.
///
/// Single writer only: every operation takes `&mut self`, and nodes handed
/// out are independent copies that must be written back explicitly.
#[derive(Debug)]
pub struct PageManager {
    /// None once closed
    file: Option<File>,
    path: PathBuf,
    options: Options,
    num_pages: PageId,

    meta: Meta,
    freelist: FreeList,
    freelist_dirty: bool,
}

impl PageManager {
    /// Open the store at `path`, creating it when the file is missing or empty.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        let page_size = options.page_size as u64;

        if file_len % page_size != 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "database file is not page-aligned",
            )));
        }

        let mut pager = PageManager {
            file: Some(file),
            path,
            options,
            num_pages: file_len / page_size,
            meta: Meta::default(),
            freelist: FreeList::new(),
            freelist_dirty: false,
        };

        if file_len == 0 {
            pager.init()?;
            tracing::info!(path = %pager.path.display(), "created store");
        } else {
            pager.load()?;
            tracing::info!(
                path = %pager.path.display(),
                pages = pager.num_pages,
                root = ?pager.meta.root,
                "opened store"
            );
        }

        Ok(pager)
    }

    fn init(&mut self) -> Result<()> {
        self.freelist = FreeList::new();
        self.meta.freelist_page = self.freelist.next_page();
        self.freelist_dirty = true;
        self.flush_freelist()?;
        self.write_meta()
    }

    fn load(&mut self) -> Result<()> {
        let page = self.read_page(META_PAGE_ID)?;
        self.meta = read_metapage(&page.data);

        if self.meta.freelist_page == META_PAGE_ID {
            return Err(Error::CorruptPage {
                page: META_PAGE_ID,
                reason: "meta record has no freelist page".to_string(),
            });
        }

        let page = self.read_page(self.meta.freelist_page)?;
        self.freelist = FreeList::decode(&page)?;
        tracing::debug!(
            max_page = self.freelist.max_page(),
            released = self.freelist.released_pages().len(),
            "loaded freelist"
        );
        Ok(())
    }

    /// Flush the freelist and release the file. Calling it again is a no-op.
    ///
    /// This does not fsync; call [`PageManager::sync`] first for that.
    pub fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let flushed = self.flush_freelist();
        self.file = None;
        tracing::info!(path = %self.path.display(), "closed store");
        flushed
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file()?.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn page_size(&self) -> usize {
        self.options.page_size
    }

    pub fn num_pages(&self) -> PageId {
        self.num_pages
    }

    pub fn meta(&self) -> Meta {
        self.meta
    }

    pub fn freelist(&self) -> &FreeList {
        &self.freelist
    }

    pub fn root(&self) -> Option<PageId> {
        self.meta.root
    }

    /// Point the meta record at a new root and persist it right away.
    pub fn set_root(&mut self, root: Option<PageId>) -> Result<()> {
        self.meta.root = root;
        self.write_meta()?;
        tracing::debug!(?root, "root changed");
        Ok(())
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::Closed)
    }

    pub fn allocate_empty_page(&self) -> Page {
        Page::new(META_PAGE_ID, self.options.page_size)
    }

    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if page_id >= self.num_pages {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {page_id} is past the end of the file"),
            )));
        }

        let mut page = self.allocate_empty_page();
        page.id = page_id;
        let offset = page_id * self.options.page_size as u64;

        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut page.data)?;
        Ok(page)
    }

    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        debug_assert_eq!(page.len(), self.options.page_size);
        let offset = page.id * self.options.page_size as u64;

        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;

        if page.id >= self.num_pages {
            self.num_pages = page.id + 1;
        }
        Ok(())
    }

    fn write_meta(&mut self) -> Result<()> {
        let mut page = self.allocate_empty_page();
        write_metapage(&self.meta, &mut page.data);
        self.write_page(&page)
    }

    /// Write the freelist page if allocations changed it since the last write.
    pub fn flush_freelist(&mut self) -> Result<()> {
        if !self.freelist_dirty {
            return Ok(());
        }
        let mut page = self.allocate_empty_page();
        page.id = self.meta.freelist_page;
        self.freelist.encode(&mut page)?;
        self.write_page(&page)?;
        self.freelist_dirty = false;
        Ok(())
    }

    fn next_page(&mut self) -> PageId {
        self.freelist_dirty = true;
        let page_id = self.freelist.next_page();
        tracing::debug!(page_id, "allocated page");
        page_id
    }

    pub fn get_node(&mut self, page_id: PageId) -> Result<Node> {
        let page = self.read_page(page_id)?;
        Node::decode(&page)
    }

    /// Persist a node, giving it a page first if it never had one.
    pub fn write_node(&mut self, node: &mut Node) -> Result<PageId> {
        let mut page = self.allocate_empty_page();
        if let Some(page_id) = node.page_id {
            page.id = page_id;
        }
        // encode before allocating so a rejected node does not leak a page
        node.encode(&mut page)?;

        let page_id = match node.page_id {
            Some(page_id) => page_id,
            None => self.next_page(),
        };
        page.id = page_id;
        self.write_page(&page)?;

        node.page_id = Some(page_id);
        Ok(page_id)
    }

    /// Hand the page back to the freelist. The page itself is left untouched.
    pub fn delete_node(&mut self, page_id: PageId) {
        self.freelist.release_page(page_id);
        self.freelist_dirty = true;
    }

    pub fn max_threshold(&self) -> f64 {
        self.options.max_threshold()
    }

    pub fn min_threshold(&self) -> f64 {
        self.options.min_threshold()
    }

    /// Over the max threshold, or too big for a page at all. Internal nodes
    /// can hit the second case first, their cell overhead is not accounted.
    pub fn is_over_populated(&self, node: &Node) -> bool {
        node.node_size() as f64 > self.max_threshold() || node.encoded_size() > self.page_size()
    }

    pub fn is_under_populated(&self, node: &Node) -> bool {
        (node.node_size() as f64) < self.min_threshold()
    }

    /// Index of the median to split `node` around: the first item at which
    /// the running size passes the min threshold, unless that is the last
    /// item. None means the node cannot be split.
    pub fn split_index(&self, node: &Node) -> Option<usize> {
        let last = node.items.len().checked_sub(1)?;
        let mut size = NODE_HEADER_SIZE;

        for i in 0..last {
            size += node.element_size(i);
            if size as f64 > self.min_threshold() {
                return Some(i);
            }
        }
        None
    }
}

impl Drop for PageManager {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(path = %self.path.display(), %err, "failed to close store");
        }
    }
}
