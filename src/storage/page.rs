pub type PageId = u64;

/// page 0 always holds the meta record
pub const META_PAGE_ID: PageId = 0;

pub const PAGE_ID_SIZE: usize = 8;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// One page-sized buffer, tagged with the page it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            data: vec![0u8; page_size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_u16(&self, pos: usize) -> Option<u16> {
        let bytes = self.data.get(pos..pos + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u64(&self, pos: usize) -> Option<u64> {
        let bytes = self.data.get(pos..pos + 8)?;
        bytes.try_into().ok().map(u64::from_le_bytes)
    }

    pub fn put_u16(&mut self, pos: usize, value: u16) {
        self.data[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, pos: usize, value: u64) {
        self.data[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
    }
}
