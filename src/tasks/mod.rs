//! Background Tasks Module
//!
//! Housekeeping tasks for the in-memory store.

mod sweeper;

pub use sweeper::spawn_sweep_task;
