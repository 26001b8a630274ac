//! Pluggable collaborator adapters: the model provider, the email
//! dispatcher, and the durable job queue. Each lives behind a trait defined
//! in `lexai-core`'s `ports` module (or a local equivalent for collaborators
//! `lexai-core` doesn't need to know about directly), so the worker and API
//! binaries can swap a fake in for tests without touching call sites.

pub mod directory;
pub mod email;
pub mod model;
pub mod queue;

pub use directory::{FakeTenantDirectory, NoopTenantDirectory, TenantDirectory, TenantMember};
pub use email::{BoundedRetryDispatcher, EmailDispatcher, EmailMessage, EmailTransport, ReqwestEmailTransport};
pub use model::{FakeModelClient, ModelChainConfig, ModelClient, ModelOutcome, ReqwestModelClient};
pub use queue::LapinJobQueue;
