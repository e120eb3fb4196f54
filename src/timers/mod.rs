//! Timer/counter role allocation.
//!
//! The four hardware units are bound once at boot to one duty each:
//!
//! | unit | role                                   |
//! |------|----------------------------------------|
//! | TC2  | delay reference (also derives the tick)|
//! | TC0  | cartridge bus clock                    |
//! | TC1  | sample period (ADC trigger), tone      |
//! | TC3  | backlight PWM                          |
//!
//! Every register change goes through [`Timer::reconfigure`], which always
//! stops the unit and clears its counter before touching the match registers.

pub mod regs;
pub mod tone;

use crate::config::{BACKLIGHT_PWM_HZ, BUS_CLOCK_HZ, CPU_FREQ_HZ, DELAY_COUNTS_PER_US, SAMPLE_RATE_HZ};
use embedded_hal::blocking::delay::DelayUs;

pub use tone::Tone;

/// Counter width of a unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Bits8,
    Bits16,
}

impl Width {
    pub const fn max(self) -> u16 {
        match self {
            Width::Bits8 => u8::MAX as u16,
            Width::Bits16 => u16::MAX,
        }
    }
}

/// Clock prescaler values available on every unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prescaler {
    Direct,
    Div8,
    Div64,
    Div256,
    Div1024,
}

impl Prescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Direct => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    /// Free-running up to the counter maximum
    Normal,
    /// Reset on reaching `top`
    ClearOnMatch,
    /// PWM with variable `top`
    FastPwm,
}

/// Compare output pin behaviour
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOutput {
    Disconnected,
    /// Toggle on each top match (CTC only)
    Toggle,
    /// High until compare match (PWM only)
    NonInverting,
    /// Low until compare match (PWM only)
    Inverting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    TopOutOfRange { top: u32, max: u16 },
    CompareAboveTop { compare: u16, top: u16 },
    OutputUnsupported,
    ZeroFrequency,
    WidthMismatch,
    NotPwm,
}

/// A validated timer configuration. Built with [`TimerConfig::builder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerConfig {
    width: Width,
    prescaler: Prescaler,
    waveform: Waveform,
    top: u16,
    compare: u16,
    output: CompareOutput,
    match_interrupt: bool,
    overflow_interrupt: bool,
}

impl TimerConfig {
    pub const fn builder(width: Width) -> TimerConfigBuilder {
        TimerConfigBuilder::new(width)
    }

    pub const fn width(&self) -> Width {
        self.width
    }

    pub const fn prescaler(&self) -> Prescaler {
        self.prescaler
    }

    pub const fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub const fn top(&self) -> u16 {
        self.top
    }

    pub const fn compare(&self) -> u16 {
        self.compare
    }

    pub const fn output(&self) -> CompareOutput {
        self.output
    }

    pub const fn match_interrupt(&self) -> bool {
        self.match_interrupt
    }

    pub const fn overflow_interrupt(&self) -> bool {
        self.overflow_interrupt
    }

    /// Period repeat rate in Hz for the given input clock
    pub const fn frequency_hz(&self, clock_hz: u32) -> u32 {
        clock_hz / (self.prescaler.divisor() * (self.top as u32 + 1))
    }
}

pub struct TimerConfigBuilder {
    width: Width,
    prescaler: Prescaler,
    waveform: Waveform,
    top: u32,
    compare: Option<u16>,
    output: CompareOutput,
    match_interrupt: bool,
    overflow_interrupt: bool,
    error: Option<ConfigError>,
}

impl TimerConfigBuilder {
    pub const fn new(width: Width) -> Self {
        Self {
            width,
            prescaler: Prescaler::Direct,
            waveform: Waveform::Normal,
            top: width.max() as u32,
            compare: None,
            output: CompareOutput::Disconnected,
            match_interrupt: false,
            overflow_interrupt: false,
            error: None,
        }
    }

    pub fn prescaler(mut self, prescaler: Prescaler) -> Self {
        self.prescaler = prescaler;
        self
    }

    pub fn waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = top;
        self
    }

    /// Derive `top` so one period lasts `1 / target_hz` seconds.
    /// Set the prescaler first.
    pub fn frequency(mut self, clock_hz: u32, target_hz: u32) -> Self {
        if target_hz == 0 {
            self.error = Some(ConfigError::ZeroFrequency);
            return self;
        }
        let counts = clock_hz / (self.prescaler.divisor() * target_hz);
        if counts == 0 {
            self.error = Some(ConfigError::TopOutOfRange {
                top: 0,
                max: self.width.max(),
            });
        } else {
            self.top = counts - 1;
        }
        self
    }

    /// Compare value. Defaults to `top` when not set.
    pub fn compare(mut self, compare: u16) -> Self {
        self.compare = Some(compare);
        self
    }

    pub fn output(mut self, output: CompareOutput) -> Self {
        self.output = output;
        self
    }

    pub fn match_interrupt(mut self, enable: bool) -> Self {
        self.match_interrupt = enable;
        self
    }

    pub fn overflow_interrupt(mut self, enable: bool) -> Self {
        self.overflow_interrupt = enable;
        self
    }

    pub fn build(self) -> Result<TimerConfig, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let max = self.width.max();
        let top = match self.waveform {
            Waveform::Normal => max as u32,
            Waveform::ClearOnMatch | Waveform::FastPwm => self.top,
        };
        if top == 0 || top > max as u32 {
            return Err(ConfigError::TopOutOfRange { top, max });
        }
        let top = top as u16;

        let output_ok = matches!(
            (self.waveform, self.output),
            (_, CompareOutput::Disconnected)
                | (Waveform::ClearOnMatch, CompareOutput::Toggle)
                | (Waveform::FastPwm, CompareOutput::NonInverting)
                | (Waveform::FastPwm, CompareOutput::Inverting)
        );
        if !output_ok {
            return Err(ConfigError::OutputUnsupported);
        }

        let compare = self.compare.unwrap_or(top);
        if compare > top {
            return Err(ConfigError::CompareAboveTop { compare, top });
        }

        Ok(TimerConfig {
            width: self.width,
            prescaler: self.prescaler,
            waveform: self.waveform,
            top,
            compare,
            output: self.output,
            match_interrupt: self.match_interrupt,
            overflow_interrupt: self.overflow_interrupt,
        })
    }
}

/// Register-level access to one timer/counter unit
pub trait TimerUnit {
    const WIDTH: Width;

    /// Stop the unit's clock
    fn disable(&mut self);

    fn clear_counter(&mut self);

    /// Write mode, top, compare, output and interrupt enables.
    /// Only called while the unit is disabled.
    fn write_config(&mut self, config: &TimerConfig);

    /// Start the unit's clock
    fn enable(&mut self, prescaler: Prescaler);

    /// Update the compare register of a running PWM unit
    fn write_compare(&mut self, compare: u16);

    fn counter(&self) -> u16;
}

/// A unit together with the configuration it currently runs
pub struct Timer<U> {
    unit: U,
    config: TimerConfig,
    running: bool,
}

impl<U: TimerUnit> Timer<U> {
    /// Bind `unit` to `config`. The unit is stopped and reprogrammed.
    pub fn new(unit: U, config: TimerConfig, start: bool) -> Result<Self, ConfigError> {
        let mut timer = Self {
            unit,
            config,
            running: false,
        };
        timer.reconfigure(config, start)?;
        Ok(timer)
    }

    /// Full stop / clear / program / restart sequence
    pub fn reconfigure(&mut self, config: TimerConfig, start: bool) -> Result<(), ConfigError> {
        if config.width() != U::WIDTH {
            return Err(ConfigError::WidthMismatch);
        }

        self.unit.disable();
        self.unit.clear_counter();
        self.unit.write_config(&config);
        self.config = config;
        self.running = false;

        if start {
            self.start();
        }
        Ok(())
    }

    pub fn start(&mut self) {
        if !self.running {
            self.unit.enable(self.config.prescaler());
            self.running = true;
        }
    }

    pub fn stop(&mut self) {
        if self.running {
            self.unit.disable();
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn counter(&self) -> u16 {
        self.unit.counter()
    }

    /// Change the PWM duty. PWM compare registers are double buffered and
    /// latch at TOP, so this is the one write allowed while running.
    pub fn set_duty(&mut self, compare: u16) -> Result<(), ConfigError> {
        if self.config.waveform() != Waveform::FastPwm {
            return Err(ConfigError::NotPwm);
        }
        let top = self.config.top();
        if compare > top {
            return Err(ConfigError::CompareAboveTop { compare, top });
        }
        self.unit.write_compare(compare);
        self.config.compare = compare;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn unit(&self) -> &U {
        &self.unit
    }
}

/// Free-running delay reference, 8-bit, clk/8. Its overflow interrupt
/// drives the system tick.
pub fn delay_config() -> Result<TimerConfig, ConfigError> {
    TimerConfig::builder(Width::Bits8)
        .prescaler(Prescaler::Div8)
        .waveform(Waveform::Normal)
        .overflow_interrupt(true)
        .build()
}

/// Overflow period of the delay reference in microseconds
pub const DELAY_OVERFLOW_US: u16 = (Width::Bits8.max() as u32 + 1) as u16 / DELAY_COUNTS_PER_US as u16;

/// Symmetric square wave: the pin toggles on every top match, so the unit
/// runs at twice the bus frequency.
pub fn bus_clock_config(bus_hz: u32) -> Result<TimerConfig, ConfigError> {
    TimerConfig::builder(Width::Bits8)
        .prescaler(Prescaler::Direct)
        .waveform(Waveform::ClearOnMatch)
        .frequency(CPU_FREQ_HZ, bus_hz.saturating_mul(2))
        .output(CompareOutput::Toggle)
        .build()
}

/// Sample-period pacing. The compare-B match at `top` auto-triggers the ADC,
/// no timer interrupt is involved.
pub fn sample_capture_config(rate_hz: u32) -> Result<TimerConfig, ConfigError> {
    TimerConfig::builder(Width::Bits16)
        .prescaler(Prescaler::Direct)
        .waveform(Waveform::ClearOnMatch)
        .frequency(CPU_FREQ_HZ, rate_hz)
        .build()
}

/// Same cadence as capture, but raising the compare-A interrupt so
/// playback can be paced without sampling.
pub fn sample_playback_config(rate_hz: u32) -> Result<TimerConfig, ConfigError> {
    TimerConfig::builder(Width::Bits16)
        .prescaler(Prescaler::Direct)
        .waveform(Waveform::ClearOnMatch)
        .frequency(CPU_FREQ_HZ, rate_hz)
        .match_interrupt(true)
        .build()
}

/// Inverted PWM: a lower compare value means a brighter backlight.
/// Starts fully dark (compare = top).
pub fn backlight_config(pwm_hz: u32) -> Result<TimerConfig, ConfigError> {
    TimerConfig::builder(Width::Bits16)
        .prescaler(Prescaler::Div8)
        .waveform(Waveform::FastPwm)
        .frequency(CPU_FREQ_HZ, pwm_hz)
        .output(CompareOutput::Inverting)
        .build()
}

/// What the sample-period unit is currently doing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleRole {
    Idle,
    Capture,
    Playback,
    Tone,
}

/// The ADC's hardware trigger from the sample-period unit.
///
/// Compare-B fires every period in every CTC configuration, so the trigger
/// is armed only while capturing. Playback and tones never convert.
pub trait SampleTrigger {
    /// Start converting on every sample period. Called with the unit stopped.
    fn arm(&mut self);

    fn disarm(&mut self);
}

/// The sample-period unit. Capture pacing, playback pacing and tone output
/// are mutually exclusive; switching always goes through a full reconfigure
/// with the ADC trigger disarmed.
pub struct SampleTimer<U, A> {
    timer: Timer<U>,
    trigger: A,
    capture: TimerConfig,
    playback: TimerConfig,
    role: SampleRole,
}

impl<U: TimerUnit, A: SampleTrigger> SampleTimer<U, A> {
    /// Program the capture configuration, stopped and disarmed
    pub fn new(unit: U, mut trigger: A, rate_hz: u32) -> Result<Self, ConfigError> {
        let capture = sample_capture_config(rate_hz)?;
        let playback = sample_playback_config(rate_hz)?;
        trigger.disarm();
        Ok(Self {
            timer: Timer::new(unit, capture, false)?,
            trigger,
            capture,
            playback,
            role: SampleRole::Idle,
        })
    }

    pub fn role(&self) -> SampleRole {
        self.role
    }

    pub fn config(&self) -> &TimerConfig {
        self.timer.config()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Start pacing the ADC. The trigger is armed between programming the
    /// unit and starting its clock.
    pub fn start_capture(&mut self) -> Result<(), ConfigError> {
        self.trigger.disarm();
        self.timer.reconfigure(self.capture, false)?;
        self.trigger.arm();
        self.timer.start();
        self.role = SampleRole::Capture;
        Ok(())
    }

    /// Start the playback pacing interrupt
    pub fn start_playback(&mut self) -> Result<(), ConfigError> {
        self.switch(self.playback, true, SampleRole::Playback)
    }

    /// Stop and return to the capture configuration
    pub fn halt(&mut self) -> Result<(), ConfigError> {
        self.switch(self.capture, false, SampleRole::Idle)
    }

    pub(crate) fn take_for_tone(&mut self, config: TimerConfig) -> Result<(), ConfigError> {
        self.switch(config, true, SampleRole::Tone)
    }

    fn switch(&mut self, config: TimerConfig, start: bool, role: SampleRole) -> Result<(), ConfigError> {
        self.trigger.disarm();
        self.timer.reconfigure(config, start)?;
        self.role = role;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn timer(&self) -> &Timer<U> {
        &self.timer
    }

    #[cfg(test)]
    pub(crate) fn trigger(&self) -> &A {
        &self.trigger
    }
}

/// Backlight PWM unit
pub struct Backlight<U> {
    timer: Timer<U>,
}

impl<U: TimerUnit> Backlight<U> {
    pub fn new(unit: U, pwm_hz: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            timer: Timer::new(unit, backlight_config(pwm_hz)?, true)?,
        })
    }

    /// 0 is off, 255 is full brightness
    pub fn set_brightness(&mut self, level: u8) -> Result<(), ConfigError> {
        let top = self.timer.config().top() as u32;
        let compare = top - (top * level as u32) / u8::MAX as u32;
        self.timer.set_duty(compare as u16)
    }

    pub fn brightness(&self) -> u8 {
        let config = self.timer.config();
        let top = config.top() as u32;
        let lit = top - config.compare() as u32;
        ((lit * u8::MAX as u32 + top / 2) / top) as u8
    }

    /// Raw (inverted) duty register value
    pub fn duty(&self) -> u16 {
        self.timer.config().compare()
    }
}

/// All four units in their permanent roles. Taking the units by value is
/// what keeps a role from migrating.
pub struct TimerRoles<D, C, S, B, A> {
    pub delay: Timer<D>,
    pub bus_clock: Timer<C>,
    pub sample: SampleTimer<S, A>,
    pub backlight: Backlight<B>,
}

impl<D, C, S, B, A> TimerRoles<D, C, S, B, A>
where
    D: TimerUnit,
    C: TimerUnit,
    S: TimerUnit,
    B: TimerUnit,
    A: SampleTrigger,
{
    /// One-time boot configuration at the configured rates. The delay
    /// reference, bus clock and backlight start running; the sample-period
    /// unit waits, disarmed, for a mode to start capture or playback.
    pub fn allocate(delay: D, bus_clock: C, sample: S, trigger: A, backlight: B) -> Result<Self, ConfigError> {
        Ok(Self {
            delay: Timer::new(delay, delay_config()?, true)?,
            bus_clock: Timer::new(bus_clock, bus_clock_config(BUS_CLOCK_HZ)?, true)?,
            sample: SampleTimer::new(sample, trigger, SAMPLE_RATE_HZ)?,
            backlight: Backlight::new(backlight, BACKLIGHT_PWM_HZ)?,
        })
    }

    /// Microsecond delays for bus-timing collaborators
    pub fn delay_us(&self) -> MicrosecondDelay<'_, D> {
        MicrosecondDelay::new(&self.delay)
    }
}

/// Busy-wait delay on a free-running unit. The unit must be polled at least
/// once per counter wrap.
pub struct MicrosecondDelay<'a, U> {
    timer: &'a Timer<U>,
}

impl<'a, U: TimerUnit> MicrosecondDelay<'a, U> {
    pub fn new(timer: &'a Timer<U>) -> Self {
        Self { timer }
    }

    fn spin_counts(&self, counts: u32) {
        let mask = U::WIDTH.max() as u32;
        let mut remaining = counts;
        let mut last = self.timer.counter() as u32;
        while remaining > 0 {
            let now = self.timer.counter() as u32;
            remaining = remaining.saturating_sub(now.wrapping_sub(last) & mask);
            last = now;
        }
    }
}

impl<U: TimerUnit> DelayUs<u16> for MicrosecondDelay<'_, U> {
    fn delay_us(&mut self, us: u16) {
        self.spin_counts(us as u32 * DELAY_COUNTS_PER_US);
    }
}

impl<U: TimerUnit> DelayUs<u8> for MicrosecondDelay<'_, U> {
    fn delay_us(&mut self, us: u8) {
        self.spin_counts(us as u32 * DELAY_COUNTS_PER_US);
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{Mock16, Mock8, MockTrigger, Op};
    use super::*;

    fn roles() -> TimerRoles<Mock8, Mock8, Mock16, Mock16, MockTrigger> {
        TimerRoles::allocate(
            Mock8::new(),
            Mock8::new(),
            Mock16::new(),
            MockTrigger::default(),
            Mock16::new(),
        )
        .unwrap()
    }

    #[test]
    fn role_configs_hit_their_targets() {
        let bus = bus_clock_config(BUS_CLOCK_HZ).unwrap();
        assert_eq!(bus.top(), 7);
        assert_eq!(bus.frequency_hz(CPU_FREQ_HZ), 2 * BUS_CLOCK_HZ);

        let sample = sample_capture_config(SAMPLE_RATE_HZ).unwrap();
        assert_eq!(sample.top(), 1952);
        assert_eq!(sample.compare(), sample.top());
        assert!(!sample.match_interrupt());

        let backlight = backlight_config(BACKLIGHT_PWM_HZ).unwrap();
        assert_eq!(backlight.top(), 1999);
        assert_eq!(backlight.compare(), 1999);

        assert_eq!(DELAY_OVERFLOW_US, 128);
    }

    #[test]
    fn builder_rejects_bad_values() {
        let err = TimerConfig::builder(Width::Bits8)
            .waveform(Waveform::ClearOnMatch)
            .top(300)
            .build();
        assert_eq!(err, Err(ConfigError::TopOutOfRange { top: 300, max: 255 }));

        let err = TimerConfig::builder(Width::Bits16)
            .waveform(Waveform::FastPwm)
            .top(100)
            .compare(101)
            .build();
        assert_eq!(err, Err(ConfigError::CompareAboveTop { compare: 101, top: 100 }));

        let err = TimerConfig::builder(Width::Bits16)
            .waveform(Waveform::FastPwm)
            .top(100)
            .output(CompareOutput::Toggle)
            .build();
        assert_eq!(err, Err(ConfigError::OutputUnsupported));

        let err = TimerConfig::builder(Width::Bits16)
            .waveform(Waveform::ClearOnMatch)
            .frequency(CPU_FREQ_HZ, 0)
            .build();
        assert_eq!(err, Err(ConfigError::ZeroFrequency));

        // 16MHz / 8Hz does not fit 16 bits
        let err = sample_capture_config(8);
        assert_eq!(
            err,
            Err(ConfigError::TopOutOfRange { top: 1_999_999, max: u16::MAX })
        );
    }

    #[test]
    fn reconfigure_always_stops_before_writing() {
        let mut roles = roles();
        roles.sample.start_capture().unwrap();
        roles.sample.start_playback().unwrap();

        let ops = &roles.sample.timer().unit().ops;
        for (i, op) in ops.iter().enumerate() {
            if let Op::Write(_) = op {
                assert_eq!(ops[i - 2], Op::Disable);
                assert_eq!(ops[i - 1], Op::Clear);
            }
        }
        assert_eq!(ops.last(), Some(&Op::Enable(Prescaler::Direct)));
        assert_eq!(roles.sample.role(), SampleRole::Playback);
        assert!(roles.sample.config().match_interrupt());
    }

    #[test]
    fn allocation_leaves_sample_unit_stopped() {
        let roles = roles();
        assert!(roles.delay.is_running());
        assert!(roles.bus_clock.is_running());
        assert!(roles.backlight.timer.is_running());
        assert!(!roles.sample.is_running());
        assert_eq!(roles.sample.role(), SampleRole::Idle);
        assert!(!roles.sample.trigger().armed);
    }

    #[test]
    fn adc_trigger_is_armed_only_while_capturing() {
        let mut roles = roles();

        roles.sample.start_capture().unwrap();
        assert!(roles.sample.trigger().armed);
        assert!(roles.sample.is_running());
        assert_eq!(
            roles.sample.timer().unit().ops.last(),
            Some(&Op::Enable(Prescaler::Direct))
        );

        roles.sample.start_playback().unwrap();
        assert!(!roles.sample.trigger().armed);
        assert!(roles.sample.is_running());

        roles.sample.start_capture().unwrap();
        roles.sample.halt().unwrap();
        assert!(!roles.sample.trigger().armed);
        assert!(!roles.sample.is_running());

        assert_eq!(roles.sample.trigger().arms, 2);
    }

    #[test]
    fn width_mismatch_is_refused() {
        let config = sample_capture_config(SAMPLE_RATE_HZ).unwrap();
        assert!(matches!(
            Timer::new(Mock8::new(), config, false),
            Err(ConfigError::WidthMismatch)
        ));
    }

    #[test]
    fn duty_updates_only_on_pwm_units() {
        let mut roles = roles();
        assert_eq!(roles.bus_clock.set_duty(3), Err(ConfigError::NotPwm));

        roles.backlight.set_brightness(255).unwrap();
        assert_eq!(roles.backlight.duty(), 0);
        assert_eq!(roles.backlight.brightness(), 255);

        roles.backlight.set_brightness(0).unwrap();
        assert_eq!(roles.backlight.duty(), 1999);
        assert_eq!(roles.backlight.brightness(), 0);

        roles.backlight.set_brightness(128).unwrap();
        assert!(roles.backlight.duty() < 1999 / 2 + 10);
        assert_eq!(roles.backlight.brightness(), 128);
    }

    #[test]
    fn microsecond_delay_spins_through_counter_wrap() {
        let mut unit = Mock8::new();
        unit.step = 7;
        let timer = Timer::new(unit, delay_config().unwrap(), true).unwrap();

        let mut delay = MicrosecondDelay::new(&timer);
        DelayUs::<u16>::delay_us(&mut delay, 500);

        // 1000 counts at 7 per poll, plus the initial read
        let polled = timer.unit().count.get() as u32;
        let reads = 1 + (1000 + 6) / 7;
        assert_eq!(polled, (reads * 7) & 0xFF);
    }
}
