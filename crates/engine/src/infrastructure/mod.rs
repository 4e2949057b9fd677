//! External dependency implementations: provider ports, concrete
//! adapters, retry wrapper, registry, and settings.

pub mod anthropic;
pub mod openai;
pub mod ports;
pub mod registry;
pub mod resilient;
pub mod settings;
pub mod xai;
