//! Minimal ANSI escape sequence styling.
//!
//! Coloring can be switched off process-wide with [`set_enabled`], in which
//! case the wrappers print their value unchanged.

#![cfg_attr(not(test), no_std)]

use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Enables or disables escape sequences for every wrapper in this crate.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    DarkGray,
    Red,
    LightRed,
    Green,
    LightGreen,
    Yellow,
    LightYellow,
    Blue,
    LightBlue,
    Magenta,
    LightMagenta,
    Cyan,
    LightCyan,
    White,
    LightGray,
    Default,
}

impl Color {
    fn code(self) -> (u8, bool) {
        match self {
            Self::Black => (0, false),
            Self::DarkGray => (0, true),
            Self::Red => (1, false),
            Self::LightRed => (1, true),
            Self::Green => (2, false),
            Self::LightGreen => (2, true),
            Self::Yellow => (3, false),
            Self::LightYellow => (3, true),
            Self::Blue => (4, false),
            Self::LightBlue => (4, true),
            Self::Magenta => (5, false),
            Self::LightMagenta => (5, true),
            Self::Cyan => (6, false),
            Self::LightCyan => (6, true),
            Self::White => (7, false),
            Self::LightGray => (7, true),
            Self::Default => (9, false),
        }
    }

    fn fg(self) -> u8 {
        let (code, light) = self.code();
        if light { code + 90 } else { code + 30 }
    }

    fn bg(self) -> u8 {
        let (code, light) = self.code();
        if light { code + 100 } else { code + 40 }
    }
}

/// Bold text in a foreground color.
pub struct WithFg<T>(Color, T);

impl<T> fmt::Display for WithFg<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = &self.1;
        if !is_enabled() {
            return write!(f, "{value}");
        }
        let fg = self.0.fg();
        write!(f, "\x1B[{fg};1m{value}\x1B[0m")
    }
}

impl<T> WithFg<T> {
    pub fn new(color: Color, value: T) -> Self {
        Self(color, value)
    }
}

/// Text on a background color, used for block and frame cells.
pub struct WithBg<T>(Color, T);

impl<T> fmt::Display for WithBg<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = &self.1;
        if !is_enabled() {
            return write!(f, "{value}");
        }
        let bg = self.0.bg();
        write!(f, "\x1B[{bg}m{value}\x1B[0m")
    }
}

impl<T> WithBg<T> {
    pub fn new(color: Color, value: T) -> Self {
        Self(color, value)
    }
}
