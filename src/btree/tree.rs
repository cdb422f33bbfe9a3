use std::cmp::Ordering;

use crate::btree::node::{Item, Node};
use crate::error::{Error, Result};
use crate::storage::page::PageId;
use crate::storage::pagemanager::PageManager;

/// Where a descent stopped.
#[derive(Debug)]
pub struct Search {
    pub found: bool,

    /// position of the match, or where the key would be inserted
    pub index: usize,

    pub node: Node,

    /// ancestors of `node`, root first, with the child index taken at each
    pub path: Vec<(PageId, usize)>,
}

impl Search {
    pub fn into_item(mut self) -> Option<Item> {
        if self.found {
            Some(self.node.items.swap_remove(self.index))
        } else {
            None
        }
    }
}

/// Linear scan of a node: `(true, i)` for a match at `i`, otherwise
/// `(false, i)` where `i` is the first item greater than `key`.
pub fn find_key_in_node(node: &Node, key: &[u8]) -> (bool, usize) {
    for (i, item) in node.items.iter().enumerate() {
        match item.key.as_slice().cmp(key) {
            Ordering::Equal => return (true, i),
            Ordering::Greater => return (false, i),
            Ordering::Less => {}
        }
    }
    (false, node.items.len())
}

/// Descend from `root` until `key` is found or a leaf is reached.
pub fn find_key(store: &mut PageManager, root: PageId, key: &[u8]) -> Result<Search> {
    let mut path = Vec::new();
    let mut node = store.get_node(root)?;

    loop {
        let (found, index) = find_key_in_node(&node, key);
        if found || node.is_leaf() {
            return Ok(Search {
                found,
                index,
                node,
                path,
            });
        }

        let page_id = node.page_id.ok_or(Error::DetachedNode)?;
        let child = node.children[index];
        path.push((page_id, index));

        // a well formed tree is never deeper than the file has pages
        if path.len() as u64 > store.num_pages() {
            return Err(Error::CorruptPage {
                page: child,
                reason: "descent does not terminate".to_string(),
            });
        }
        node = store.get_node(child)?;
    }
}

/// Split `child` around its median, pushing the median up into `parent`
/// at `child_index` and linking the new sibling right after `child`.
///
/// Nothing is touched unless both halves fit their pages. The child and the
/// sibling are written. The parent is written too unless the median made it
/// over-populated, in which case the caller has to split it next. Returns
/// the sibling.
pub fn split(
    store: &mut PageManager,
    parent: &mut Node,
    child: &mut Node,
    child_index: usize,
) -> Result<Node> {
    let child_id = child.page_id.ok_or(Error::DetachedNode)?;
    check_link(parent, child_id, child_index)?;
    let (lower, median, mut sibling) = divide(store, child)?;

    *child = lower;
    store.write_node(child)?;
    let sibling_id = store.write_node(&mut sibling)?;

    parent.items.insert(child_index, median);
    parent.children.insert(child_index + 1, sibling_id);
    if !store.is_over_populated(parent) {
        store.write_node(parent)?;
    }

    tracing::debug!(
        child = child_id,
        sibling = sibling_id,
        parent = ?parent.page_id,
        "split node"
    );
    Ok(sibling)
}

/// Cut `node` at its split index into the lower half, the median and the
/// upper half. The lower half keeps the page id.
fn divide(store: &PageManager, node: &Node) -> Result<(Node, Item, Node)> {
    let split_index = store
        .split_index(node)
        .ok_or(Error::Unsplittable(node.page_id))?;

    let mut lower = node.clone();
    let upper_children = if lower.is_leaf() {
        Vec::new()
    } else {
        lower.children.split_off(split_index + 1)
    };
    let mut upper_items = lower.items.split_off(split_index);
    let median = upper_items.remove(0);
    let upper = Node::new(upper_items, upper_children);

    check_fits(store, &lower)?;
    check_fits(store, &upper)?;
    Ok((lower, median, upper))
}

fn check_link(parent: &Node, child_id: PageId, child_index: usize) -> Result<()> {
    if parent.children.get(child_index) != Some(&child_id) {
        return Err(Error::CorruptPage {
            page: parent.page_id.unwrap_or(child_id),
            reason: format!("child {child_index} is not page {child_id}"),
        });
    }
    Ok(())
}

fn check_fits(store: &PageManager, node: &Node) -> Result<()> {
    let size = node.encoded_size();
    if size > store.page_size() {
        return Err(Error::PageOverflow {
            size,
            page_size: store.page_size(),
        });
    }
    Ok(())
}

/// Persist `node` after an in-memory change, then restore the size bounds
/// bottom-up along `path`, the ancestors recorded by [`find_key`].
///
/// The whole cascade is tried in memory first, so a node that cannot be
/// split fails the call before any page is written. Returns the new root
/// when the old root had to split.
pub fn rebalance(
    store: &mut PageManager,
    mut node: Node,
    mut path: Vec<(PageId, usize)>,
) -> Result<Option<PageId>> {
    if !store.is_over_populated(&node) {
        store.write_node(&mut node)?;
        return Ok(None);
    }

    check_cascade(store, &node, &path)?;

    loop {
        let Some((parent_id, child_index)) = path.pop() else {
            return grow_root(store, node).map(Some);
        };

        let mut parent = store.get_node(parent_id)?;
        split(store, &mut parent, &mut node, child_index)?;

        if !store.is_over_populated(&parent) {
            return Ok(None);
        }
        node = parent;
    }
}

/// Run the splits of [`rebalance`] without writing anything.
fn check_cascade(store: &mut PageManager, node: &Node, path: &[(PageId, usize)]) -> Result<()> {
    let mut node = node.clone();

    for &(parent_id, child_index) in path.iter().rev() {
        let child_id = node.page_id.ok_or(Error::DetachedNode)?;
        let mut parent = store.get_node(parent_id)?;
        check_link(&parent, child_id, child_index)?;

        let (_, median, _) = divide(store, &node)?;
        parent.items.insert(child_index, median);
        // the sibling has no id yet, only the child count matters here
        parent.children.insert(child_index + 1, child_id);

        if !store.is_over_populated(&parent) {
            return Ok(());
        }
        node = parent;
    }

    let root_id = node.page_id.ok_or(Error::DetachedNode)?;
    let (_, median, _) = divide(store, &node)?;
    check_fits(store, &Node::new(vec![median], vec![root_id, root_id]))
}

/// split the root under a fresh, empty internal node
fn grow_root(store: &mut PageManager, mut old_root: Node) -> Result<PageId> {
    let old_root_id = old_root.page_id.ok_or(Error::DetachedNode)?;
    let mut root = Node::new(Vec::new(), vec![old_root_id]);

    split(store, &mut root, &mut old_root, 0)?;

    // a one item root can still be over the threshold on tiny pages
    let root_id = match root.page_id {
        Some(root_id) => root_id,
        None => store.write_node(&mut root)?,
    };
    tracing::debug!(root = root_id, old_root = old_root_id, "tree grew a level");
    Ok(root_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::Options;

    fn item(key: &str, value: &str) -> Item {
        Item::new(key.as_bytes(), value.as_bytes()).unwrap()
    }

    fn leaf(keys: &[&str]) -> Node {
        Node::new_leaf(keys.iter().map(|k| item(k, "v")).collect())
    }

    fn open(dir: &tempfile::TempDir, page_size: usize) -> PageManager {
        PageManager::open(
            dir.path().join("tree.db"),
            Options::new().with_page_size(page_size),
        )
        .unwrap()
    }

    fn open_small(dir: &tempfile::TempDir) -> PageManager {
        open(dir, 64)
    }

    #[test]
    fn test_find_key_in_node() {
        let node = leaf(&["b", "d", "f"]);

        assert_eq!(find_key_in_node(&node, b"a"), (false, 0));
        assert_eq!(find_key_in_node(&node, b"b"), (true, 0));
        assert_eq!(find_key_in_node(&node, b"c"), (false, 1));
        assert_eq!(find_key_in_node(&node, b"f"), (true, 2));
        assert_eq!(find_key_in_node(&node, b"g"), (false, 3));
        assert_eq!(find_key_in_node(&Node::default(), b"a"), (false, 0));
    }

    #[test]
    fn test_find_key_in_node_compares_bytes() {
        let node = leaf(&["a", "ab", "b"]);
        assert_eq!(find_key_in_node(&node, b"aa"), (false, 1));
        assert_eq!(find_key_in_node(&node, b"abc"), (false, 2));
    }

    #[test]
    fn test_find_key_descends() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_small(&dir);

        let mut left = leaf(&["a", "b"]);
        let mut right = leaf(&["x", "y"]);
        let left_id = store.write_node(&mut left).unwrap();
        let right_id = store.write_node(&mut right).unwrap();
        let mut root = Node::new(vec![item("m", "v")], vec![left_id, right_id]);
        let root_id = store.write_node(&mut root).unwrap();

        let search = find_key(&mut store, root_id, b"y").unwrap();
        assert!(search.found);
        assert_eq!(search.index, 1);
        assert_eq!(search.node.page_id, Some(right_id));
        assert_eq!(search.path, vec![(root_id, 1)]);

        let search = find_key(&mut store, root_id, b"m").unwrap();
        assert!(search.found);
        assert_eq!(search.node.page_id, Some(root_id));
        assert!(search.path.is_empty());

        let search = find_key(&mut store, root_id, b"c").unwrap();
        assert!(!search.found);
        assert_eq!(search.index, 2);
        assert_eq!(search.node.page_id, Some(left_id));
        assert!(search.into_item().is_none());
    }

    #[test]
    fn test_split_leaf_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_small(&dir);

        let mut child = leaf(&["k1", "k2", "k3", "k4", "k5"]);
        let child_id = store.write_node(&mut child).unwrap();
        let mut parent = Node::new(Vec::new(), vec![child_id]);

        let sibling = split(&mut store, &mut parent, &mut child, 0).unwrap();

        assert_eq!(parent.items, vec![item("k3", "v")]);
        assert_eq!(parent.children, vec![child_id, sibling.page_id.unwrap()]);
        assert!(parent.page_id.is_some());

        let child = store.get_node(child_id).unwrap();
        assert_eq!(child.items, vec![item("k1", "v"), item("k2", "v")]);
        let sibling = store.get_node(sibling.page_id.unwrap()).unwrap();
        assert_eq!(sibling.items, vec![item("k4", "v"), item("k5", "v")]);
        let parent = store.get_node(parent.page_id.unwrap()).unwrap();
        assert_eq!(parent.children.len(), 2);
    }

    #[test]
    fn test_split_internal_moves_children() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(&dir, 128);
        let value = "x".repeat(10);

        // children ids only need to be valid pointers here
        let mut child = Node::new(
            ["a", "b", "c", "d", "e"].iter().map(|k| item(k, &value)).collect(),
            vec![10, 11, 12, 13, 14, 15],
        );
        let child_id = store.write_node(&mut child).unwrap();

        let mut parent = Node::new(vec![item("z", "")], vec![child_id, 20]);
        let sibling = split(&mut store, &mut parent, &mut child, 0).unwrap();

        // 3 + 19 = 22, 41, 60, 79 > 64
        assert_eq!(
            child.items,
            vec![item("a", &value), item("b", &value), item("c", &value)]
        );
        assert_eq!(child.children, vec![10, 11, 12, 13]);
        assert_eq!(sibling.items, vec![item("e", &value)]);
        assert_eq!(sibling.children, vec![14, 15]);
        assert_eq!(parent.items, vec![item("d", &value), item("z", "")]);
        assert_eq!(
            parent.children,
            vec![child_id, sibling.page_id.unwrap(), 20]
        );
    }

    #[test]
    fn test_split_unsplittable_node() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_small(&dir);

        let mut child = Node::new_leaf(vec![item(&"k".repeat(32), &"v".repeat(10))]);
        let child_id = store.write_node(&mut child).unwrap();
        assert!(store.is_over_populated(&child));

        let mut parent = Node::new(Vec::new(), vec![child_id]);
        let result = split(&mut store, &mut parent, &mut child, 0);

        assert!(matches!(result, Err(Error::Unsplittable(Some(id))) if id == child_id));
        assert!(parent.items.is_empty());
        assert_eq!(store.get_node(child_id).unwrap().items.len(), 1);
    }

    #[test]
    fn test_split_rejects_wrong_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_small(&dir);

        let mut child = leaf(&["k1", "k2", "k3", "k4", "k5"]);
        store.write_node(&mut child).unwrap();
        let mut parent = Node::new(Vec::new(), vec![99]);

        let result = split(&mut store, &mut parent, &mut child, 0);
        assert!(matches!(result, Err(Error::CorruptPage { .. })));
        assert_eq!(child.items.len(), 5);
    }

    #[test]
    fn test_rebalance_within_bounds_just_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_small(&dir);

        let mut node = leaf(&["k1"]);
        let page_id = store.write_node(&mut node).unwrap();
        node.items.push(item("k2", "v"));

        assert_eq!(rebalance(&mut store, node, Vec::new()).unwrap(), None);
        assert_eq!(store.get_node(page_id).unwrap().items.len(), 2);
    }

    #[test]
    fn test_rebalance_grows_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_small(&dir);

        let mut node = leaf(&["k1", "k2", "k3", "k4"]);
        let old_root = store.write_node(&mut node).unwrap();
        node.items.push(item("k5", "v"));

        let root = rebalance(&mut store, node, Vec::new()).unwrap().unwrap();
        assert_ne!(root, old_root);

        let root = store.get_node(root).unwrap();
        assert_eq!(root.items, vec![item("k3", "v")]);
        assert_eq!(root.children[0], old_root);
    }

    #[test]
    fn test_rebalance_checks_every_level_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(&dir, 128);
        let big = "z".repeat(85);

        let mut left = leaf(&["a1", "a2", "a3", "a4", "a5"]);
        let mut right = leaf(&["zz"]);
        let left_id = store.write_node(&mut left).unwrap();
        let right_id = store.write_node(&mut right).unwrap();
        // 3 + 11 + 93 + 8 = 115, one more median pushes it past 121.6
        let mut root = Node::new(
            vec![item("a0", "v"), item(&big, "")],
            vec![20, left_id, right_id],
        );
        let root_id = store.write_node(&mut root).unwrap();
        let max_page = store.freelist().max_page();

        // 3 + 11 * 11 + 8 = 132, the leaf splits fine but the root cannot
        for k in ["a6", "a7", "a8", "a9", "aa", "ab"] {
            left.items.push(item(k, "v"));
        }
        assert!(store.is_over_populated(&left));
        assert!(store.split_index(&left).is_some());

        let result = rebalance(&mut store, left, vec![(root_id, 1)]);
        assert!(matches!(result, Err(Error::Unsplittable(Some(id))) if id == root_id));

        assert_eq!(store.get_node(root_id).unwrap(), root);
        assert_eq!(store.get_node(left_id).unwrap().items.len(), 5);
        assert_eq!(store.freelist().max_page(), max_page);
    }
}
