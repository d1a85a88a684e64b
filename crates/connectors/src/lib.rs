pub mod error;
pub mod query;
pub mod sql;
pub mod store;
pub mod warehouse;
