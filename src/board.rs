//! Interfaces to the collaborators around the timing core: storage, the
//! cartridge presence probe and the display.

use crate::capture::SampleView;
use embedded_hal::digital::v2::InputPin;

/// Removable storage
pub trait Storage {
    type Error: core::fmt::Debug;

    /// Mount the filesystem. Retried every slow-poll until it succeeds.
    fn try_mount(&mut self) -> Result<(), Self::Error>;

    /// Write one completed audio buffer. `WouldBlock` means try again later.
    fn drain(&mut self, samples: SampleView<'_>) -> nb::Result<(), Self::Error>;
}

/// Capture source (cartridge) detection
pub trait PresenceProbe {
    fn probe_presence(&mut self) -> bool;
}

/// Status icon positions on the title bar
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IconSlot {
    Storage,
    CaptureSource,
}

impl IconSlot {
    /// Top-left pixel of the slot
    pub const fn origin(self) -> (u8, u8) {
        match self {
            IconSlot::Storage => (218, 0),
            IconSlot::CaptureSource => (184, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Icon {
    StorageReady,
    StorageMissing,
    CaptureReady,
    CaptureMissing,
}

impl Icon {
    pub const fn for_slot(slot: IconSlot, ready: bool) -> Self {
        match (slot, ready) {
            (IconSlot::Storage, true) => Icon::StorageReady,
            (IconSlot::Storage, false) => Icon::StorageMissing,
            (IconSlot::CaptureSource, true) => Icon::CaptureReady,
            (IconSlot::CaptureSource, false) => Icon::CaptureMissing,
        }
    }
}

/// Packed raster handed to the display driver as-is
#[derive(Clone, Copy, Debug)]
pub struct Image<'a> {
    pub width: u8,
    pub height: u8,
    pub data: &'a [u8],
}

pub trait Display {
    fn draw_icon(&mut self, slot: IconSlot, icon: Icon);
    fn blit(&mut self, x: u8, y: u8, image: &Image<'_>);
}

/// Presence probe reading a detect line
pub struct PinPresence<P> {
    pin: P,
    active_low: bool,
}

impl<P: InputPin> PinPresence<P> {
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }

    pub fn active_high(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: InputPin> PresenceProbe for PinPresence<P> {
    /// A pin read error counts as absent; the next slow-poll reads again.
    fn probe_presence(&mut self) -> bool {
        let level = if self.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        };
        level.unwrap_or(false)
    }
}
