//! Real-time core of a handheld camcorder built on the ATmega1284P.
//!
//! Owns the system tick, the four timer/counter units, interrupt-driven
//! audio capture into a buffer pool, frame pacing and the cooperative
//! main loop. Views, storage and display drivers plug in through the
//! traits in [`board`] and [`rtos::Mode`].
#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

pub mod board;
pub mod capture;
pub mod config;
pub mod diagnostics;
pub mod logger;
pub mod rtos;
pub mod timers;

#[cfg(all(target_arch = "avr", feature = "atmega1284p"))]
pub mod hal;

#[cfg(all(target_arch = "avr", feature = "atmega1284p"))]
pub mod firmware;

pub use board::{Display, PresenceProbe, Storage};
pub use capture::{AudioPipeline, FramePacer};
pub use rtos::{Mode, Scheduler, TickService};
pub use timers::{ConfigError, TimerRoles};
