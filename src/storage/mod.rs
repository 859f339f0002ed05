pub mod disk;
pub mod heap_file;
pub mod page;

pub use heap_file::{HeapFile, HeapFileIter};
pub use page::{HeapPage, Page};
