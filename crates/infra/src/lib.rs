//! Infrastructure layer: event store, command dispatch, read models and
//! background workers.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;

#[cfg(test)]
mod integration_tests;
