pub mod error;
pub mod mapper;
pub mod orchestrator;
pub mod pager;
pub mod queries;
pub mod writer;

#[cfg(test)]
pub(crate) mod support;
