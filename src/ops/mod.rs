//! Whole-file pipelines: convert, merge, recover, sort.

pub mod convert;
pub mod merge;
pub mod recover;
pub mod sort;

pub use convert::{convert_file, ConvertStats};
pub use merge::{merge_mcap, merge_mcap_files, MergeStats};
pub use recover::{recover_mcap_file, recover_records, RecoverStats};
pub use sort::{sort_mcap, sort_mcap_file, SortOptions, SortStats};
