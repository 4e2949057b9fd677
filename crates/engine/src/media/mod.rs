//! Media generation: file layout and the async orchestrator.

pub mod orchestrator;
pub mod store;
