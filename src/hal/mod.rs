//! ATmega1284P register backends

pub mod adc;
pub mod timer;
pub mod uart;

pub use adc::SampleAdc;
pub use timer::{Tc0, Tc1, Tc2, Tc3};
pub use uart::Usart0;
