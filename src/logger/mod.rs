//! Leveled text logging over any `ufmt` writer.
//!
//! Records look like `[INF 000123] storage mounted` with the stamp taken
//! from the elapsed tick counter. Main loop only, never from an interrupt.

use ufmt::uWrite;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERR",
            Level::Warn => "WRN",
            Level::Info => "INF",
            Level::Debug => "DBG",
        }
    }

    /// Default threshold for this build
    pub const fn default_max() -> Self {
        if cfg!(feature = "debug") {
            Level::Debug
        } else {
            Level::Info
        }
    }
}

pub struct Logger<W> {
    sink: W,
    max_level: Level,
    dropped: u16,
}

impl<W: uWrite> Logger<W> {
    pub const fn new(sink: W, max_level: Level) -> Self {
        Self {
            sink,
            max_level,
            dropped: 0,
        }
    }

    pub fn set_max_level(&mut self, level: Level) {
        self.max_level = level;
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    /// Write one record. `body` renders the message; sink errors are
    /// counted and otherwise ignored.
    pub fn log<F>(&mut self, level: Level, stamp: u32, body: F)
    where
        F: FnOnce(&mut W) -> Result<(), W::Error>,
    {
        if !self.enabled(level) {
            return;
        }

        if write_record(&mut self.sink, level, stamp, body).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    /// Records lost to sink errors
    pub fn dropped(&self) -> u16 {
        self.dropped
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }
}

fn write_record<W, F>(sink: &mut W, level: Level, stamp: u32, body: F) -> Result<(), W::Error>
where
    W: uWrite,
    F: FnOnce(&mut W) -> Result<(), W::Error>,
{
    sink.write_char('[')?;
    sink.write_str(level.tag())?;
    sink.write_char(' ')?;
    write_stamp(sink, stamp)?;
    sink.write_str("] ")?;
    body(sink)?;
    sink.write_str("\r\n")
}

/// Zero-padded to six digits so columns line up on a terminal
fn write_stamp<W: uWrite>(sink: &mut W, stamp: u32) -> Result<(), W::Error> {
    let mut digits = [b'0'; 10];
    let mut value = stamp;
    let mut len = 0;
    while value > 0 || len == 0 {
        digits[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    for _ in len..6 {
        sink.write_char('0')?;
    }
    for &digit in digits[..len].iter().rev() {
        sink.write_char(digit as char)?;
    }
    Ok(())
}

/// Sink that discards everything
pub struct NullSink;

impl uWrite for NullSink {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, _s: &str) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// `log!(logger, stamp, Level::Info, "fmt {}", arg)`
#[macro_export]
macro_rules! log {
    ($logger:expr, $stamp:expr, $level:expr, $($arg:tt)+) => {
        $logger.log($level, $stamp, |w| ::ufmt::uwrite!(w, $($arg)+))
    };
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::string::String;

    #[derive(Default)]
    pub struct StringSink(pub String);

    impl uWrite for StringSink {
        type Error = core::convert::Infallible;

        fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
            self.0.push_str(s);
            Ok(())
        }
    }

    struct FullSink;

    impl uWrite for FullSink {
        type Error = ();

        fn write_str(&mut self, _s: &str) -> Result<(), ()> {
            Err(())
        }
    }

    #[test]
    fn record_layout() {
        let mut logger = Logger::new(StringSink::default(), Level::Debug);
        crate::log!(logger, 123, Level::Info, "storage {}", "mounted");
        crate::log!(logger, 1_234_567, Level::Warn, "overruns +{}", 3u32);
        assert_eq!(
            logger.sink().0,
            "[INF 000123] storage mounted\r\n[WRN 1234567] overruns +3\r\n"
        );
    }

    #[test]
    fn records_above_threshold_are_skipped() {
        let mut logger = Logger::new(StringSink::default(), Level::Info);
        crate::log!(logger, 0, Level::Debug, "mount attempt");
        assert!(logger.sink().0.is_empty());

        logger.set_max_level(Level::Debug);
        crate::log!(logger, 0, Level::Debug, "mount attempt");
        assert_eq!(logger.sink().0, "[DBG 000000] mount attempt\r\n");
    }

    #[test]
    fn sink_errors_are_counted() {
        let mut logger = Logger::new(FullSink, Level::Info);
        crate::log!(logger, 0, Level::Error, "lost");
        crate::log!(logger, 0, Level::Error, "lost");
        assert_eq!(logger.dropped(), 2);
    }
}
