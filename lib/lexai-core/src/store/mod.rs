//! Store adapters: one production implementation per port, plus an
//! in-memory pair used by this crate's and downstream crates' tests.

pub mod memory;
pub mod mongo;
pub mod redis_store;

pub use memory::{InMemoryDocumentStore, InMemoryJobQueue, InMemoryKeyValueStore};
pub use mongo::MongoDocumentStore;
pub use redis_store::RedisKeyValueStore;
