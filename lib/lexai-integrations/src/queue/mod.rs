//! Durable job queue collaborator (§4.5, §6): an AMQP adapter behind the
//! [`lexai_core::ports::job_queue::JobQueue`] port.

mod lapin_queue;

pub use lapin_queue::LapinJobQueue;
