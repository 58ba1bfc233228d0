//! Error plumbing shared by the simulator crates.
//!
//! Every error type in the workspace records the source location where it was
//! raised through [`Location`], exposes it through [`Located`], and is
//! rendered for humans by [`Report`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::{boxed::Box, string::String};
use core::{error::Error, fmt};

use ansi_term::{Color, WithFg};
use snafu::{GenerateImplicitData, Snafu};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An error that knows where it was raised.
pub trait Located {
    fn location(&self) -> Location;
}

impl<T> Located for &T
where
    T: Located + ?Sized,
{
    fn location(&self) -> Location {
        (**self).location()
    }
}

#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
pub struct GenericError {
    message: String,
    #[snafu(implicit)]
    location: Location,
    #[snafu(source(from(Box<dyn Error>, Some)))]
    source: Option<Box<dyn Error>>,
}

impl Located for GenericError {
    fn location(&self) -> Location {
        self.location
    }
}

/// Human readable rendering of an error and its cause chain.
pub struct Report<E> {
    error: E,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error + Located,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error + Located,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", WithFg::new(Color::Red, &self.error))?;
        writeln!(
            f,
            "  at {}",
            WithFg::new(Color::DarkGray, self.error.location())
        )?;
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {}", WithFg::new(Color::Red, s))?;
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, string::ToString as _};

    use snafu::{ResultExt as _, whatever};

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("inner failure"))]
    struct InnerError {
        #[snafu(implicit)]
        location: Location,
    }

    fn fail_inner() -> Result<(), InnerError> {
        InnerSnafu.fail()
    }

    fn fail_outer() -> Result<(), GenericError> {
        fail_inner().whatever_context("outer failure")?;
        Ok(())
    }

    #[test]
    fn test_location_points_at_caller() {
        let loc = Location::default();
        assert!(loc.to_string().contains("lib.rs"));
    }

    #[test]
    fn test_report_lists_cause_chain() {
        ansi_term::set_enabled(false);
        let err = fail_outer().unwrap_err();
        let report = format!("{}", Report::new(&err));
        assert!(report.starts_with("Error: outer failure\n"));
        assert!(report.contains("Caused by:"));
        assert!(report.contains("   0: inner failure"));
    }

    #[test]
    fn test_report_without_source() {
        fn fail() -> Result<(), GenericError> {
            whatever!("plain failure {}", 42);
        }
        ansi_term::set_enabled(false);
        let err = fail().unwrap_err();
        let report = Report::new(err).to_string();
        assert!(report.starts_with("Error: plain failure 42\n"));
        assert!(!report.contains("Caused by:"));
    }
}
