pub mod error;
pub mod job;
pub mod queue;
pub mod worker;
