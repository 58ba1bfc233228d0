use std::{env, fmt, str::FromStr, sync::OnceLock, time::Instant};

use ansi_term::{Color, WithFg};

/// Environment variable consulted when `--log-level` is not given.
pub const ENV_VAR: &str = "OSVIZ_LOG";

static START: OnceLock<Instant> = OnceLock::new();
static MAX_LEVEL: OnceLock<LogLevel> = OnceLock::new();

macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::log($level, format_args!($($arg)*));
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Trace, $($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Debug, $($arg)*);
    };
}

macro_rules! info {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Info, $($arg)*);
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Warn, $($arg)*);
    };
}

#[expect(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Error, $($arg)*);
    };
}

/// Sets the maximum level, falling back to [`ENV_VAR`] and then `info`.
pub fn init(level: Option<LogLevel>) {
    START.get_or_init(Instant::now);
    let from_env = env::var(ENV_VAR).ok();
    let parsed = from_env.as_deref().map(str::parse::<LogLevel>);
    let level = level
        .or_else(|| parsed.clone().and_then(Result::ok))
        .unwrap_or(LogLevel::Info);
    MAX_LEVEL.get_or_init(|| level);

    if let (Some(value), Some(Err(err))) = (from_env, parsed) {
        warn!("ignoring {ENV_VAR}={value:?}: {err}");
    }
}

fn max_level() -> LogLevel {
    MAX_LEVEL.get().copied().unwrap_or(LogLevel::Info)
}

pub fn log(level: LogLevel, message: fmt::Arguments) {
    if level < max_level() {
        return;
    }
    let now = START.get_or_init(Instant::now).elapsed();
    eprintln!(
        "{} {} {}",
        WithFg::new(Color::DarkGray, format_args!("{now:>10.3?}")),
        LevelFormat(level),
        message
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid log level `{s}`")),
        }
    }
}

struct LevelFormat(LogLevel);

impl fmt::Display for LevelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = match self.0 {
            LogLevel::Trace => Color::Magenta,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        };
        let msg = match self.0 {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => " INFO",
            LogLevel::Warn => " WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", WithFg::new(color, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!("trace".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        "loud".parse::<LogLevel>().unwrap_err();
    }

    #[test]
    fn test_level_order() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_level_tag_width() {
        ansi_term::set_enabled(false);
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(LevelFormat(level).to_string().len(), 5);
        }
        assert_eq!(LevelFormat(LogLevel::Info).to_string(), " INFO");
    }
}
