//! Provider clients and the shared fetch machinery underneath them.

pub mod batch;
pub mod client;
pub mod exchange;
pub mod fetcher;
pub mod ladder;

#[cfg(test)]
pub mod testing;
