//! Register encodings for the ATmega1284P timer/counter units.
//!
//! Kept target-independent so the bit patterns can be checked on the host;
//! `crate::hal` writes them into the real registers.

use super::{CompareOutput, Prescaler, TimerConfig, Waveform, Width};

/// CSn2:0 mask in TCCRnB
pub const CLOCK_SELECT_MASK: u8 = 0x07;

pub const TOIE: u8 = 1 << 0;
pub const OCIEA: u8 = 1 << 1;
pub const OCIEB: u8 = 1 << 2;

/// OCFnB in TIFRn. Written as one to clear.
pub const OCFB: u8 = 1 << 2;

/// Clock select bits. TC2 is the asynchronous unit and has its own table.
pub const fn clock_select(prescaler: Prescaler, async_unit: bool) -> u8 {
    if async_unit {
        match prescaler {
            Prescaler::Direct => 1,
            Prescaler::Div8 => 2,
            Prescaler::Div64 => 4,
            Prescaler::Div256 => 6,
            Prescaler::Div1024 => 7,
        }
    } else {
        match prescaler {
            Prescaler::Direct => 1,
            Prescaler::Div8 => 2,
            Prescaler::Div64 => 3,
            Prescaler::Div256 => 4,
            Prescaler::Div1024 => 5,
        }
    }
}

/// COMnA1:0 in TCCRnA
pub const fn compare_output_bits(output: CompareOutput) -> u8 {
    match output {
        CompareOutput::Disconnected => 0,
        CompareOutput::Toggle => 0b01 << 6,
        CompareOutput::NonInverting => 0b10 << 6,
        CompareOutput::Inverting => 0b11 << 6,
    }
}

/// WGM bits split across (TCCRnA, TCCRnB).
///
/// 8-bit units: CTC is mode 2 (top = OCRnA).
/// 16-bit units: CTC is mode 4 (top = OCRnA), fast PWM is mode 14 (top = ICRn).
pub const fn waveform_bits(waveform: Waveform, width: Width) -> (u8, u8) {
    match (width, waveform) {
        (_, Waveform::Normal) => (0, 0),
        (Width::Bits8, Waveform::ClearOnMatch) => (0x02, 0),
        (Width::Bits8, Waveform::FastPwm) => (0x03, 0x08),
        (Width::Bits16, Waveform::ClearOnMatch) => (0, 0x08),
        (Width::Bits16, Waveform::FastPwm) => (0x02, 0x18),
    }
}

/// (TCCRnA, TCCRnB with the clock stopped, TIMSKn)
pub const fn control_bits(config: &TimerConfig) -> (u8, u8, u8) {
    let (wgm_a, wgm_b) = waveform_bits(config.waveform(), config.width());
    let mut timsk = 0;
    if config.overflow_interrupt() {
        timsk |= TOIE;
    }
    if config.match_interrupt() {
        timsk |= OCIEA;
    }
    (wgm_a | compare_output_bits(config.output()), wgm_b, timsk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timers::{self, Width};

    #[test]
    fn bus_clock_toggles_oc0a_in_ctc() {
        let config = timers::bus_clock_config(crate::config::BUS_CLOCK_HZ).unwrap();
        assert_eq!(control_bits(&config), (0x42, 0x00, 0x00));
        assert_eq!(clock_select(config.prescaler(), false), 1);
    }

    #[test]
    fn backlight_is_inverted_fast_pwm_on_icr_top() {
        let config = timers::backlight_config(crate::config::BACKLIGHT_PWM_HZ).unwrap();
        assert_eq!(control_bits(&config), (0xC2, 0x18, 0x00));
        assert_eq!(clock_select(config.prescaler(), false), 2);
    }

    #[test]
    fn playback_enables_compare_a_interrupt_only() {
        let config = timers::sample_playback_config(crate::config::SAMPLE_RATE_HZ).unwrap();
        assert_eq!(control_bits(&config), (0x00, 0x08, OCIEA));
    }

    #[test]
    fn delay_unit_uses_async_prescaler_table() {
        let config = timers::delay_config().unwrap();
        assert_eq!(config.width(), Width::Bits8);
        assert_eq!(control_bits(&config), (0x00, 0x00, TOIE));
        assert_eq!(clock_select(Prescaler::Div64, true), 4);
        assert_eq!(clock_select(Prescaler::Div64, false), 3);
    }
}
