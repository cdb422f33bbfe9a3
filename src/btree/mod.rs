pub mod collection;
pub mod node;
pub mod tree;

pub use collection::Collection;
pub use node::{Item, MAX_KEY_SIZE, MAX_VALUE_SIZE, Node};
pub use tree::{Search, find_key, find_key_in_node, rebalance, split};
