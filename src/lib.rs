mod client;
mod config;
mod dispatch;
mod errors;
mod request_context;
mod session;

pub mod refresh;
pub mod store;
pub mod telemetry;
pub mod token;

pub use client::AuthClient;
pub use config::Config;
pub use dispatch::PipelineResponse;
pub use errors::Error;
pub use refresh::RefreshCoordinator;
pub use request_context::{FilePart, LifecycleHook, MethodKind, RequestContext};
pub use session::{NavigateFn, SessionTeardown};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
