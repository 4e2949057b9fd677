//! Fableforge engine: everything effectful around the story domain.
//!
//! Layering, innermost out:
//! - `infrastructure` — provider ports and concrete adapters (Anthropic,
//!   OpenAI, xAI), the retry wrapper, the credential-gated registry, and
//!   environment settings.
//! - `generation` — narrative context assembly, prompt construction,
//!   draft parsing/repair, and the scene pipeline.
//! - `media` — file layout for generated media and the async
//!   orchestrator that drives image/video units over live sessions.
//! - `stores` — the in-memory session registry and the file archive.
//! - `flow` — the use-case service a serving layer calls.

pub mod flow;
pub mod generation;
pub mod infrastructure;
pub mod media;
pub mod stores;
pub mod telemetry;

pub use flow::{FlowError, NewStoryParams, StoryFlow};
pub use infrastructure::ports::{GenerationError, ProviderError};
pub use infrastructure::registry::{ImageProviderId, ProviderRegistry, ProviderResolver, TextProviderId};
pub use infrastructure::settings::Settings;
pub use media::orchestrator::MediaOrchestrator;
pub use media::store::MediaStore;
pub use stores::archive::{ArchiveError, ArchivePort, FileArchive};
pub use stores::session_store::{InMemorySessionStore, SessionStore, SharedSession};
