use avr_device::atmega1284p::ADC;

// ADMUX
const REFS_AVCC: u8 = 1 << 6;
const ADLAR: u8 = 1 << 5;
const MUX_MASK: u8 = 0x07;

// ADCSRA
const ADEN: u8 = 1 << 7;
const ADATE: u8 = 1 << 5;
const ADIF: u8 = 1 << 4;
const ADIE: u8 = 1 << 3;
/// clk/64: 250kHz ADC clock, one conversion (13 cycles) takes 52us
const ADPS_DIV64: u8 = 0x06;

// ADCSRB: Timer/Counter1 compare match B
const ADTS_TC1_COMPB: u8 = 0x05;

/// The ADC in sample-capture mode: left-adjusted result, one conversion
/// per compare-B match of the sample-period unit, completion interrupt.
/// Created disarmed.
pub struct SampleAdc {
    adc: ADC,
}

impl SampleAdc {
    pub fn new(adc: ADC, channel: u8) -> Self {
        let channel = channel & MUX_MASK;
        adc.admux.write(|w| unsafe { w.bits(REFS_AVCC | ADLAR | channel) });
        adc.adcsrb.write(|w| unsafe { w.bits(ADTS_TC1_COMPB) });
        adc.didr0.write(|w| unsafe { w.bits(1 << channel) });
        adc.adcsra.write(|w| unsafe { w.bits(ADEN | ADPS_DIV64) });
        Self { adc }
    }

    /// Auto-trigger on compare-B with the completion interrupt. A stale
    /// completion flag is dropped first.
    pub fn arm(&mut self) {
        self.adc
            .adcsra
            .write(|w| unsafe { w.bits(ADEN | ADATE | ADIF | ADIE | ADPS_DIV64) });
    }

    /// No further conversions start; one already running completes silently
    pub fn disarm(&mut self) {
        self.adc.adcsra.write(|w| unsafe { w.bits(ADEN | ADIF | ADPS_DIV64) });
    }
}

/// Latest conversion result, left adjusted. Interrupt context only.
#[inline]
pub fn result() -> u16 {
    unsafe { (*ADC::ptr()).adc.read().bits() }
}
