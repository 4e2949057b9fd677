//! State holders: the in-memory session registry and the file archive.

pub mod archive;
pub mod session_store;
