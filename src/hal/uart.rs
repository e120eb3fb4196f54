use crate::config::CPU_FREQ_HZ;
use avr_device::atmega1284p::USART0;
use ufmt::uWrite;

// UCSR0A
const UDRE0: u8 = 1 << 5;
const U2X0: u8 = 1 << 1;
// UCSR0B
const TXEN0: u8 = 1 << 3;
// UCSR0C: 8N1
const UCSZ_8BIT: u8 = 0x06;

/// Double-speed baud divider
const fn ubrr(baud: u32) -> u16 {
    ((CPU_FREQ_HZ + baud * 4) / (baud * 8) - 1) as u16
}

/// Transmit-only, polled USART0. Used as the log sink from the main loop.
pub struct Usart0 {
    usart: USART0,
}

impl Usart0 {
    pub fn new(usart: USART0, baud: u32) -> Self {
        usart.ubrr0.write(|w| unsafe { w.bits(ubrr(baud)) });
        usart.ucsr0a.write(|w| unsafe { w.bits(U2X0) });
        usart.ucsr0c.write(|w| unsafe { w.bits(UCSZ_8BIT) });
        usart.ucsr0b.write(|w| unsafe { w.bits(TXEN0) });
        Self { usart }
    }

    pub fn write_byte(&mut self, byte: u8) {
        while self.usart.ucsr0a.read().bits() & UDRE0 == 0 {}
        self.usart.udr0.write(|w| unsafe { w.bits(byte) });
    }
}

impl uWrite for Usart0 {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}
