pub mod config;
pub mod freelist;
pub mod meta;
pub mod page;
pub mod pagemanager;

pub use config::Options;
pub use freelist::FreeList;
pub use meta::Meta;
pub use page::{Page, PageId};
pub use pagemanager::PageManager;
