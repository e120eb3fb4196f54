//! Cooperative main loop and system time

pub mod scheduler;
pub mod tick;

pub use scheduler::{Changes, Context, Devices, Mode, Presence, Scheduler};
pub use tick::TickService;
