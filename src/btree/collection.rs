use crate::btree::node::{Item, Node};
use crate::btree::tree::{Search, find_key, rebalance};
use crate::error::{Error, Result};
use crate::storage::page::PageId;
use crate::storage::pagemanager::PageManager;

/// A named B-tree living in a [`PageManager`].
///
/// The store keeps a single root in its meta record; mapping several
/// collection names to roots is left to a catalog on top of this.
pub struct Collection<'a> {
    name: Vec<u8>,
    root: Option<PageId>,
    store: &'a mut PageManager,
}

impl<'a> Collection<'a> {
    pub fn new(name: impl Into<Vec<u8>>, store: &'a mut PageManager) -> Self {
        let root = store.root();
        Self {
            name: name.into(),
            root,
            store,
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn root(&self) -> Option<PageId> {
        self.root
    }

    /// Look up `key`. A missing key is `Ok(None)`, not an error.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<Item>> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        Ok(find_key(self.store, root, key)?.into_item())
    }

    /// Insert `key`, or overwrite its value if it is already present.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let item = Item::new(key, value)?;

        let Some(root) = self.root else {
            let mut leaf = Node::new_leaf(vec![item]);
            if self.store.is_over_populated(&leaf) {
                self.store
                    .split_index(&leaf)
                    .ok_or(Error::Unsplittable(None))?;
            }
            let root = self.store.write_node(&mut leaf)?;
            self.set_root(root)?;
            return self.store.flush_freelist();
        };

        let Search {
            found,
            index,
            mut node,
            path,
        } = find_key(self.store, root, key)?;

        if found {
            node.items[index] = item;
        } else {
            node.items.insert(index, item);
        }

        if let Some(root) = rebalance(self.store, node, path)? {
            self.set_root(root)?;
        }
        self.store.flush_freelist()
    }

    fn set_root(&mut self, root: PageId) -> Result<()> {
        self.root = Some(root);
        self.store.set_root(Some(root))?;
        tracing::debug!(
            collection = %String::from_utf8_lossy(&self.name),
            root,
            "collection root changed"
        );
        Ok(())
    }
}
