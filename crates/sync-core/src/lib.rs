pub mod governor;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod settings;
