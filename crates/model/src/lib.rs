pub mod job;
pub mod pagination;
pub mod progress;
pub mod records;
pub mod stats;
pub mod value;
