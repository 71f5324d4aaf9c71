pub mod config;
pub mod copy;
pub mod decode;
pub mod error;
pub mod gather;
pub mod output_formats;
pub mod rules;
pub mod tree;

pub use config::Config;
pub use copy::{CopyReport, copy_code_files};
pub use decode::{DecodeError, DetectingDecoder, TextDecoder, Utf8Decoder};
pub use error::{AppError, Result};
pub use gather::{CollectOptions, Collection, Collector, SkippedEntry, collect};
pub use output_formats::OutputFormat;
pub use rules::{Admission, IncludeMode, RuleFile, RuleSet, SkipReason};
pub use tree::{OutputTree, TreeEntry};
