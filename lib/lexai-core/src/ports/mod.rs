//! External-collaborator traits (§6). `lexai-core`'s domain logic (the
//! admission service, the lock, the quota accountant) depends only on these
//! — never on a concrete store, broker, or provider client.

pub mod document_store;
pub mod job_queue;
pub mod kv_store;

pub use document_store::DocumentStore;
pub use job_queue::{Consumer, Delivery, JobQueue};
pub use kv_store::{EventSubscriber, KeyValueStore};
