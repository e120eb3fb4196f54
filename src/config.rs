//! Configuration constants for the camcorder firmware

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// System tick rate in Hz
pub const TICK_HZ: u32 = 100;

/// System tick period in microseconds
pub const TICK_US: u32 = 1_000_000 / TICK_HZ;

/// The tick counter saturates here instead of wrapping
pub const TICK_CEILING: u8 = u8::MAX;

/// Slow-poll period in ticks (2s)
pub const SLOW_POLL_TICKS: u8 = 200;

/// Audio sample rate in Hz
pub const SAMPLE_RATE_HZ: u32 = 8192;

/// Samples per audio buffer, which is also one video frame period
pub const AUDIO_BUFFER_LEN: usize = 512;

/// Number of audio buffers in the capture pool.
/// Storage may stall for up to (N - 1) frame periods (~312ms) before data is lost.
pub const AUDIO_BUFFER_COUNT: usize = 6;

/// Frame cadence shared by capture and playback
pub const FRAME_RATE_HZ: u32 = SAMPLE_RATE_HZ / AUDIO_BUFFER_LEN as u32;

/// Cartridge bus clock in Hz
pub const BUS_CLOCK_HZ: u32 = 1_000_000;

/// Delay unit resolution (clk/8 at 16MHz)
pub const DELAY_COUNTS_PER_US: u32 = 2;

/// Backlight PWM frequency in Hz
pub const BACKLIGHT_PWM_HZ: u32 = 1000;

/// Tones played once the display is up: (frequency Hz, duration ticks, volume)
pub const BOOT_CHIME: [(u16, u8, u8); 2] = [(900, 10, 40), (1200, 10, 40)];

/// Settle time before peripheral bring-up, in ticks
pub const POWER_ON_SETTLE_TICKS: u8 = 10;

/// Log UART baud rate
pub const LOG_BAUD: u32 = 38_400;

/// ADC input wired to the capture source's audio line
pub const CAPTURE_ADC_CHANNEL: u8 = 0;
