//! Narrative generation: context assembly, prompt construction, draft
//! parsing, and the scene pipeline that ties them together.

pub mod context;
pub mod directives;
pub mod draft;
pub mod pipeline;
pub mod prompts;
