//! Background workers draining the event bus.

pub mod bus_worker;

pub use bus_worker::{BusWorker, WorkerHandle};
