//! Command implementations for the mdocs CLI
//!
//! Each command writes its result to an injected writer so it can be tested
//! without spawning the binary.

mod cache;
mod discover;
mod list;
mod preload;
mod search;
mod show;

pub use cache::{clear as clear_cache, stats as cache_stats};
pub use discover::execute as discover;
pub use list::execute as list_documents;
pub use preload::execute as preload_documents;
pub use search::{SearchArgs, execute as search};
pub use show::execute as show_document;
