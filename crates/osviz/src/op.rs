//! Parsing helpers for command-line operations such as `alloc:100`.

use std::{fmt::Display, str::FromStr};

/// Splits `name:arg` into its name and optional argument.
pub fn split(s: &str) -> (&str, Option<&str>) {
    match s.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (s, None),
    }
}

/// Requires the argument of an operation.
pub fn required<'a>(name: &str, arg: Option<&'a str>) -> Result<&'a str, String> {
    match arg {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(format!("`{name}` needs an argument, as in `{name}:<value>`")),
    }
}

pub fn number<T>(what: &str, s: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    s.trim()
        .parse()
        .map_err(|err| format!("invalid {what} `{s}`: {err}"))
}

/// Parses a comma separated list of numbers.
pub fn list<T>(what: &str, s: &str) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    s.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| number(what, item))
        .collect()
}

/// Parses rows separated by `;`, each a comma separated list.
pub fn matrix<T>(what: &str, s: &str) -> Result<Vec<Vec<T>>, String>
where
    T: FromStr,
    T::Err: Display,
{
    s.split(';')
        .filter(|row| !row.trim().is_empty())
        .map(|row| list(what, row))
        .collect()
}
