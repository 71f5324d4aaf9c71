pub mod completion;
pub mod config;
pub mod copy;
pub mod crawl;
pub mod debug;
