pub mod loader;
pub mod splitter;
pub mod web_search;

pub use loader::HttpDocumentLoader;
pub use splitter::RecursiveSplitter;
pub use web_search::{create_web_search, TavilySearch};
