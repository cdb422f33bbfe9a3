use crate::storage::page::PageId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Meta {
    pub root: Option<PageId>,
    pub freelist_page: PageId,
}

// disk layout
mod disk {
    pub const OFFSET_ROOT: usize = 0;
    pub const OFFSET_FREELIST: usize = 8;
}

// encode/decode page metadata, buf is always a full page
pub fn read_metapage(buf: &[u8]) -> Meta {
    let root = read_u64(buf, disk::OFFSET_ROOT);
    let freelist_page = read_u64(buf, disk::OFFSET_FREELIST);

    Meta {
        root: if root == 0 { None } else { Some(root) },
        freelist_page,
    }
}

pub fn write_metapage(meta: &Meta, buf: &mut [u8]) {
    let root = meta.root.unwrap_or(0);
    buf[disk::OFFSET_ROOT..disk::OFFSET_ROOT + 8].copy_from_slice(&root.to_le_bytes());
    buf[disk::OFFSET_FREELIST..disk::OFFSET_FREELIST + 8]
        .copy_from_slice(&meta.freelist_page.to_le_bytes());
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
