use crate::error::{Error, Result};
use crate::storage::page::{META_PAGE_ID, PAGE_ID_SIZE, Page, PageId};

/// key and value lengths are stored in a single byte
pub const MAX_KEY_SIZE: usize = u8::MAX as usize;
pub const MAX_VALUE_SIZE: usize = u8::MAX as usize;

/// leaf flag(1B) + item count(2B)
pub const NODE_HEADER_SIZE: usize = 3;

const OFFSET_SIZE: usize = 2;
const LEN_SIZE: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<Self> {
        let item = Self {
            key: key.into(),
            value: value.into(),
        };
        item.check_size()?;
        Ok(item)
    }

    fn check_size(&self) -> Result<()> {
        if self.key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLarge(self.key.len()));
        }
        if self.value.len() > MAX_VALUE_SIZE {
            return Err(Error::ValueTooLarge(self.value.len()));
        }
        Ok(())
    }
}

/// A B-tree node, materialized from exactly one page.
///
/// A node is a leaf iff it has no children; internal nodes always carry
/// one more child than items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// None until the node is first written
    pub page_id: Option<PageId>,

    pub items: Vec<Item>,

    pub children: Vec<PageId>,
}

impl Node {
    pub fn new(items: Vec<Item>, children: Vec<PageId>) -> Self {
        Self {
            page_id: None,
            items,
            children,
        }
    }

    pub fn new_leaf(items: Vec<Item>) -> Self {
        Self::new(items, Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Accounted size of one item: key, value and a child pointer. Leaves
    /// are charged the pointer too.
    pub fn element_size(&self, index: usize) -> usize {
        let item = &self.items[index];
        item.key.len() + item.value.len() + PAGE_ID_SIZE
    }

    /// Size used against the fill thresholds. It leaves out the length
    /// bytes and cell offsets, see [`Node::encoded_size`] for what a page
    /// really has to hold.
    pub fn node_size(&self) -> usize {
        let items: usize = (0..self.items.len()).map(|i| self.element_size(i)).sum();
        NODE_HEADER_SIZE + items + PAGE_ID_SIZE
    }

    /// bytes the slotted encoding actually occupies
    pub fn encoded_size(&self) -> usize {
        let child_size = if self.is_leaf() { 0 } else { PAGE_ID_SIZE };
        let items: usize = self
            .items
            .iter()
            .map(|item| child_size + OFFSET_SIZE + 2 * LEN_SIZE + item.key.len() + item.value.len())
            .sum();
        NODE_HEADER_SIZE + items + child_size
    }

    /// Encode into a slotted page.
    ///
    /// format:
    /// ┌──────┬───────┬─────────────────────────┬──────────┬──────┬──────────────────────────────┐
    /// │ Leaf │ Count │ [Child(8B)] Offset(2B)  │ [Child]  │ free │ ... KeyLen Key ValLen Val    │
    /// │ (1B) │ (2B)  │ one per item            │ (8B)     │      │ first item ends the page     │
    /// └──────┴───────┴─────────────────────────┴──────────┴──────┴──────────────────────────────┘
    /// Child ids are only present in internal nodes. Each offset points at
    /// the key length byte of its item.
    pub fn encode(&self, page: &mut Page) -> Result<()> {
        for item in &self.items {
            item.check_size()?;
        }

        let is_leaf = self.is_leaf();
        if !is_leaf && self.children.len() != self.items.len() + 1 {
            return Err(Error::CorruptPage {
                page: page.id,
                reason: format!(
                    "internal node has {} items and {} children",
                    self.items.len(),
                    self.children.len()
                ),
            });
        }

        let size = self.encoded_size();
        if size > page.len() {
            return Err(Error::PageOverflow {
                size,
                page_size: page.len(),
            });
        }

        page.data.fill(0);

        let mut left = 0;
        let mut right = page.len();

        page.data[left] = u8::from(is_leaf);
        left += 1;

        // size fits a page of at most 64KiB, and every item takes 4 bytes or more
        page.put_u16(left, self.items.len() as u16);
        left += 2;

        for (i, item) in self.items.iter().enumerate() {
            if !is_leaf {
                page.put_u64(left, self.children[i]);
                left += PAGE_ID_SIZE;
            }

            right -= item.value.len();
            page.data[right..right + item.value.len()].copy_from_slice(&item.value);
            right -= LEN_SIZE;
            page.data[right] = item.value.len() as u8;

            right -= item.key.len();
            page.data[right..right + item.key.len()].copy_from_slice(&item.key);
            right -= LEN_SIZE;
            page.data[right] = item.key.len() as u8;

            page.put_u16(left, right as u16);
            left += OFFSET_SIZE;
        }

        if let Some(&last) = self.children.last() {
            page.put_u64(left, last);
        }

        Ok(())
    }

    /// Decode a node, refusing any page whose bytes do not describe one.
    pub fn decode(page: &Page) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptPage {
            page: page.id,
            reason,
        };

        if page.len() < NODE_HEADER_SIZE {
            return Err(corrupt("page shorter than the node header".to_string()));
        }

        let is_leaf = match page.data[0] {
            1 => true,
            0 => false,
            flag => return Err(corrupt(format!("invalid leaf flag {flag}"))),
        };
        let count = page.read_u16(1).unwrap_or(0) as usize;

        let entry_size = if is_leaf {
            OFFSET_SIZE
        } else {
            PAGE_ID_SIZE + OFFSET_SIZE
        };
        let trailer = if is_leaf { 0 } else { PAGE_ID_SIZE };
        let directory_end = NODE_HEADER_SIZE + count * entry_size + trailer;
        if directory_end > page.len() {
            return Err(corrupt(format!(
                "directory of {count} items ends at {directory_end}, past the page"
            )));
        }

        let mut items: Vec<Item> = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(if is_leaf { 0 } else { count + 1 });
        let mut pos = NODE_HEADER_SIZE;

        for i in 0..count {
            if !is_leaf {
                children.push(read_child(page, pos)?);
                pos += PAGE_ID_SIZE;
            }

            let offset = page.read_u16(pos).unwrap_or(0) as usize;
            pos += OFFSET_SIZE;
            if offset < directory_end {
                return Err(corrupt(format!(
                    "item {i} offset {offset} points into the directory"
                )));
            }

            let (key, next) = read_cell(page, offset)
                .ok_or_else(|| corrupt(format!("item {i} key runs past the page")))?;
            let (value, _) = read_cell(page, next)
                .ok_or_else(|| corrupt(format!("item {i} value runs past the page")))?;

            if let Some(prev) = items.last() {
                if prev.key.as_slice() >= key {
                    return Err(corrupt(format!("item {i} key is out of order")));
                }
            }

            items.push(Item {
                key: key.to_vec(),
                value: value.to_vec(),
            });
        }

        if !is_leaf {
            children.push(read_child(page, pos)?);
        }

        Ok(Self {
            page_id: Some(page.id),
            items,
            children,
        })
    }
}

/// length-prefixed byte run at `offset`, and the position right after it
fn read_cell(page: &Page, offset: usize) -> Option<(&[u8], usize)> {
    let len = *page.data.get(offset)? as usize;
    let start = offset + LEN_SIZE;
    let bytes = page.data.get(start..start + len)?;
    Some((bytes, start + len))
}

fn read_child(page: &Page, pos: usize) -> Result<PageId> {
    match page.read_u64(pos) {
        Some(child) if child != META_PAGE_ID => Ok(child),
        _ => Err(Error::CorruptPage {
            page: page.id,
            reason: format!("child pointer at {pos} is not a node page"),
        }),
    }
}
