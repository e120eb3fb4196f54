use crate::timers::regs;
use crate::timers::{CompareOutput, Prescaler, TimerConfig, TimerUnit, Waveform, Width};
use avr_device::atmega1284p::{PORTB, PORTD, TC0, TC1, TC2, TC3};

/// Make the unit's compare-A pin an output when the waveform drives it
macro_rules! output_pin {
    ($PORT:ident, $ddr:ident, $bit:expr) => {
        fn drive_output_pin(config: &TimerConfig) {
            if config.output() != CompareOutput::Disconnected {
                unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() | (1 << $bit)));
                }
            }
        }
    };
}

macro_rules! impl_timer8 {
    ($Unit:ident, $TC:ident, $tccra:ident, $tccrb:ident, $tcnt:ident, $ocra:ident, $ocrb:ident, $timsk:ident,
     async = $async_unit:expr, pin = ($PORT:ident, $ddr:ident, $bit:expr)) => {
        pub struct $Unit {
            tc: $TC,
        }

        impl $Unit {
            pub fn new(tc: $TC) -> Self {
                Self { tc }
            }

            output_pin!($PORT, $ddr, $bit);
        }

        impl TimerUnit for $Unit {
            const WIDTH: Width = Width::Bits8;

            fn disable(&mut self) {
                self.tc
                    .$tccrb
                    .modify(|r, w| unsafe { w.bits(r.bits() & !regs::CLOCK_SELECT_MASK) });
            }

            fn clear_counter(&mut self) {
                self.tc.$tcnt.write(|w| unsafe { w.bits(0) });
            }

            fn write_config(&mut self, config: &TimerConfig) {
                let (tccra, tccrb, timsk) = regs::control_bits(config);
                self.tc.$tccra.write(|w| unsafe { w.bits(tccra) });
                self.tc.$tccrb.write(|w| unsafe { w.bits(tccrb) });
                match config.waveform() {
                    Waveform::ClearOnMatch => {
                        self.tc.$ocra.write(|w| unsafe { w.bits(config.top() as u8) });
                        self.tc.$ocrb.write(|w| unsafe { w.bits(config.compare() as u8) });
                    }
                    Waveform::FastPwm => {
                        self.tc.$ocra.write(|w| unsafe { w.bits(config.compare() as u8) });
                    }
                    Waveform::Normal => {}
                }
                self.tc.$timsk.write(|w| unsafe { w.bits(timsk) });
                Self::drive_output_pin(config);
            }

            fn enable(&mut self, prescaler: Prescaler) {
                let cs = regs::clock_select(prescaler, $async_unit);
                self.tc
                    .$tccrb
                    .modify(|r, w| unsafe { w.bits((r.bits() & !regs::CLOCK_SELECT_MASK) | cs) });
            }

            fn write_compare(&mut self, compare: u16) {
                self.tc.$ocra.write(|w| unsafe { w.bits(compare as u8) });
            }

            fn counter(&self) -> u16 {
                self.tc.$tcnt.read().bits() as u16
            }
        }
    };
}

macro_rules! impl_timer16 {
    ($Unit:ident, $TC:ident, $tccra:ident, $tccrb:ident, $tcnt:ident, $icr:ident, $ocra:ident, $ocrb:ident,
     $timsk:ident, pin = ($PORT:ident, $ddr:ident, $bit:expr)) => {
        pub struct $Unit {
            tc: $TC,
        }

        impl $Unit {
            pub fn new(tc: $TC) -> Self {
                Self { tc }
            }

            output_pin!($PORT, $ddr, $bit);
        }

        impl TimerUnit for $Unit {
            const WIDTH: Width = Width::Bits16;

            fn disable(&mut self) {
                self.tc
                    .$tccrb
                    .modify(|r, w| unsafe { w.bits(r.bits() & !regs::CLOCK_SELECT_MASK) });
            }

            fn clear_counter(&mut self) {
                self.tc.$tcnt.write(|w| unsafe { w.bits(0) });
            }

            fn write_config(&mut self, config: &TimerConfig) {
                let (tccra, tccrb, timsk) = regs::control_bits(config);
                self.tc.$tccra.write(|w| unsafe { w.bits(tccra) });
                self.tc.$tccrb.write(|w| unsafe { w.bits(tccrb) });
                match config.waveform() {
                    // OCRnB == top puts the compare-B event (ADC trigger) on the period boundary
                    Waveform::ClearOnMatch => {
                        self.tc.$ocra.write(|w| unsafe { w.bits(config.top()) });
                        self.tc.$ocrb.write(|w| unsafe { w.bits(config.compare()) });
                    }
                    Waveform::FastPwm => {
                        self.tc.$icr.write(|w| unsafe { w.bits(config.top()) });
                        self.tc.$ocra.write(|w| unsafe { w.bits(config.compare()) });
                    }
                    Waveform::Normal => {}
                }
                self.tc.$timsk.write(|w| unsafe { w.bits(timsk) });
                Self::drive_output_pin(config);
            }

            fn enable(&mut self, prescaler: Prescaler) {
                let cs = regs::clock_select(prescaler, false);
                self.tc
                    .$tccrb
                    .modify(|r, w| unsafe { w.bits((r.bits() & !regs::CLOCK_SELECT_MASK) | cs) });
            }

            fn write_compare(&mut self, compare: u16) {
                self.tc.$ocra.write(|w| unsafe { w.bits(compare) });
            }

            fn counter(&self) -> u16 {
                self.tc.$tcnt.read().bits()
            }
        }
    };
}

// Cartridge bus clock on OC0A (PB3)
impl_timer8!(Tc0, TC0, tccr0a, tccr0b, tcnt0, ocr0a, ocr0b, timsk0, async = false, pin = (PORTB, ddrb, 3));
// Delay reference; clocked from the I/O clock, so ASSR is left at reset
impl_timer8!(Tc2, TC2, tccr2a, tccr2b, tcnt2, ocr2a, ocr2b, timsk2, async = true, pin = (PORTD, ddrd, 7));
// Sample period and tone output on OC1A (PD5)
impl_timer16!(Tc1, TC1, tccr1a, tccr1b, tcnt1, icr1, ocr1a, ocr1b, timsk1, pin = (PORTD, ddrd, 5));
// Backlight on OC3A (PB6)
impl_timer16!(Tc3, TC3, tccr3a, tccr3b, tcnt3, icr3, ocr3a, ocr3b, timsk3, pin = (PORTB, ddrb, 6));

/// Acknowledge the compare-B match that triggered the last conversion.
/// The ADC only re-triggers on a rising edge of OCF1B.
#[inline]
pub fn clear_sample_trigger() {
    unsafe {
        (*TC1::ptr()).tifr1.write(|w| w.bits(regs::OCFB));
    }
}
