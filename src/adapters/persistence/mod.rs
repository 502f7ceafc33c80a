//! Filesystem persistence: resident entry history, policy text, report and segment output.

pub mod fs_store;

pub use fs_store::FsStore;
