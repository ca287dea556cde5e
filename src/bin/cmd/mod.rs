//! Subcommand implementations.

mod convert;
mod inspect;
mod merge;
mod recover;
mod sort;

pub use convert::ConvertCmd;
pub use inspect::InspectCmd;
pub use merge::MergeCmd;
pub use recover::RecoverCmd;
pub use sort::SortCmd;
