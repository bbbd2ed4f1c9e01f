//! External collaborators consumed by the core.
//!
//! Each collaborator is a narrow trait so the assistant can be composed with
//! real backends in the binary and with in-memory doubles in tests.

mod compiler;
mod credentials;
mod examples;
mod store;
mod widget_cache;


pub use compiler::{ArtifactCompiler, CompiledArtifact, SyntaxCheckCompiler};
pub use credentials::{
    ApiKeys, ConfigCredentials, CredentialsProvider, PRIMARY_KEY_ENV, SECONDARY_KEY_ENV,
    StaticCredentials,
};
pub use examples::{ArtifactExample, ExamplesProvider, StaticExamples};
pub use store::{FileStore, KeyValueStore, MemoryStore, get_json, set_json};
pub use widget_cache::{CachedWidget, WidgetCache};
