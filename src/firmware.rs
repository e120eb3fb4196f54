//! Board bring-up, interrupt handlers and the shared state they touch.

use crate::board::{Display, Image, PresenceProbe, Storage};
use crate::capture::AudioPipeline;
use crate::config::{AUDIO_BUFFER_COUNT, BOOT_CHIME, CAPTURE_ADC_CHANNEL, LOG_BAUD, POWER_ON_SETTLE_TICKS};
use crate::hal::{adc, timer, SampleAdc, Tc0, Tc1, Tc2, Tc3, Usart0};
use crate::logger::{Level, Logger};
use crate::rtos::{Devices, Mode, Scheduler, TickService};
use crate::timers::{SampleTrigger, Tone, TimerRoles, DELAY_OVERFLOW_US};
use avr_device::atmega1284p::Peripherals;
use avr_device::interrupt::{self, Mutex};
use core::cell::RefCell;
use panic_halt as _;

/// Delay reference, bus clock, sample period, backlight
pub type Roles = TimerRoles<Tc2, Tc0, Tc1, Tc3, CaptureTrigger>;

static TICKS: TickService = TickService::new();
static AUDIO: AudioPipeline<AUDIO_BUFFER_COUNT> = AudioPipeline::new();
static ROLES: Mutex<RefCell<Option<Roles>>> = Mutex::new(RefCell::new(None));

pub fn ticks() -> &'static TickService {
    &TICKS
}

pub fn audio() -> &'static AudioPipeline<AUDIO_BUFFER_COUNT> {
    &AUDIO
}

/// Run `f` on the timer roles inside a critical section. Returns `None`
/// until boot has finished with them. Never wait on the tick from `f`.
pub fn with_roles<R>(f: impl FnOnce(&mut Roles) -> R) -> Option<R> {
    interrupt::free(|cs| ROLES.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Couples the ADC to the sample-period unit and starts a fresh capture
/// session each time it is armed.
pub struct CaptureTrigger {
    adc: SampleAdc,
}

impl SampleTrigger for CaptureTrigger {
    fn arm(&mut self) {
        AUDIO.restart();
        // the ADC only triggers on a rising compare-B flag
        timer::clear_sample_trigger();
        self.adc.arm();
    }

    fn disarm(&mut self) {
        self.adc.disarm();
    }
}

#[avr_device::interrupt(atmega1284p)]
fn TIMER2_OVF() {
    TICKS.on_overflow(DELAY_OVERFLOW_US);
}

#[avr_device::interrupt(atmega1284p)]
fn ADC() {
    AUDIO.on_conversion(adc::result());
    timer::clear_sample_trigger();
}

#[avr_device::interrupt(atmega1284p)]
fn TIMER1_COMPA() {
    AUDIO.pacer().on_playback_tick();
}

/// Bring the board up and run the main loop forever.
///
/// The sample-period unit is left stopped; modes start capture or playback
/// through [`with_roles`].
pub fn run<S, P, D, M>(dp: Peripherals, mut devices: Devices<S, P, D>, mode: M, splash: Option<&Image<'_>>) -> !
where
    S: Storage,
    P: PresenceProbe,
    D: Display,
    M: Mode<S, D>,
{
    let mut logger = Logger::new(Usart0::new(dp.USART0, LOG_BAUD), Level::default_max());

    let trigger = CaptureTrigger {
        adc: SampleAdc::new(dp.ADC, CAPTURE_ADC_CHANNEL),
    };
    let roles = Roles::allocate(
        Tc2::new(dp.TC2),
        Tc0::new(dp.TC0),
        Tc1::new(dp.TC1),
        trigger,
        Tc3::new(dp.TC3),
    );
    let mut roles = match roles {
        Ok(roles) => roles,
        Err(_) => {
            crate::log!(logger, 0, Level::Error, "timer allocation failed");
            halt()
        }
    };

    // SAFETY: the tick and capture statics are const-initialised
    unsafe { interrupt::enable() };
    TICKS.wait(POWER_ON_SETTLE_TICKS);

    if let Some(image) = splash {
        devices.display.blit(0, 0, image);
    }

    // Waits on the tick, so this runs before the roles move behind the mutex
    let chime = BOOT_CHIME.map(|(hz, duration, volume)| Tone::new(hz, duration, volume));
    if roles.sample.chime(&TICKS, &chime).is_err() {
        crate::log!(logger, TICKS.elapsed(), Level::Warn, "boot chime skipped");
    }
    interrupt::free(|cs| ROLES.borrow(cs).replace(Some(roles)));

    crate::log!(logger, TICKS.elapsed(), Level::Info, "boot complete");

    Scheduler::new(&TICKS, devices, mode, logger)
        .with_capture_stats(&AUDIO)
        .run()
}

fn halt() -> ! {
    loop {
        avr_device::asm::sleep();
    }
}
