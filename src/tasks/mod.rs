//! Background Tasks Module
//!
//! Contains the tasks a cache schedules on the tokio runtime.
//!
//! # Tasks
//! - Expiry sweep: removes expired entries at the configured check period
//! - Expiry timers: one-shot per-entry timers backing expiry callbacks

mod expiry;
mod sweep;

pub(crate) use expiry::spawn_expiry_timer;
pub(crate) use sweep::spawn_sweep_task;
