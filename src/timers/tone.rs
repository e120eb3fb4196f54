//! Blocking beeps on the sample-period unit.
//!
//! The unit is borrowed away from its pacing role for the duration of the
//! tone. Never beep while capture or playback is running: the pacing
//! interrupt and ADC trigger stop for the length of the tone and the
//! unit comes back stopped.

use super::{
    CompareOutput, ConfigError, Prescaler, SampleTimer, SampleTrigger, TimerConfig, TimerUnit, Waveform, Width,
};
use crate::config::CPU_FREQ_HZ;
use crate::rtos::TickService;

/// One beep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u16,
    /// Duration in 10ms ticks
    pub duration: u8,
    /// 0..=255, duty cycle in 1/256ths
    pub volume: u8,
}

impl Tone {
    pub const fn new(frequency_hz: u16, duration: u8, volume: u8) -> Self {
        Self {
            frequency_hz,
            duration,
            volume,
        }
    }

    /// PWM configuration producing this tone on the OC1A pin
    pub fn config(&self) -> Result<TimerConfig, ConfigError> {
        let builder = TimerConfig::builder(Width::Bits16)
            .prescaler(Prescaler::Div8)
            .waveform(Waveform::FastPwm)
            .frequency(CPU_FREQ_HZ, self.frequency_hz as u32)
            .output(CompareOutput::NonInverting);

        // Volume scales the high time against the full period
        let period = CPU_FREQ_HZ / (Prescaler::Div8.divisor() * (self.frequency_hz as u32).max(1));
        let compare = (period * self.volume as u32) >> 8;
        builder.compare(compare.min(u16::MAX as u32) as u16).build()
    }
}

impl<U: TimerUnit, A: SampleTrigger> SampleTimer<U, A> {
    /// Play `tone` and block until it is done
    pub fn beep(&mut self, ticks: &TickService, tone: Tone) -> Result<(), ConfigError> {
        self.beep_with(ticks, tone, core::hint::spin_loop)
    }

    /// Like [`Self::beep`], calling `idle` while waiting
    pub fn beep_with<F: FnMut()>(
        &mut self,
        ticks: &TickService,
        tone: Tone,
        idle: F,
    ) -> Result<(), ConfigError> {
        let config = tone.config()?;
        self.take_for_tone(config)?;
        ticks.wait_with(tone.duration, idle);
        self.halt()
    }

    /// Play a sequence of tones back to back
    pub fn chime(&mut self, ticks: &TickService, tones: &[Tone]) -> Result<(), ConfigError> {
        for tone in tones {
            self.beep(ticks, *tone)?;
        }
        Ok(())
    }
}
