// src/context.rs
//! Context extension traits + macros for error handling.
//!
//! `.context()` / `.with_context()` on any `Result` whose error converts into
//! [`Error`], the same on `Option`, plus `bail!` and `ensure!`.

use crate::error::{Error, Result};

/// `.context()` / `.with_context()` on any `Result`.
pub trait Context<T, E> {
    /// Eager context, use only when the message is cheap.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    /// Lazy context, the closure only runs on the error path.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[inline(always)]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(context))
    }

    #[inline(always)]
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(f()))
    }
}

/// `Option<T>` → `Result<T>` with a message.
pub trait OptionContext<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> OptionContext<T> for Option<T> {
    #[inline(always)]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.ok_or_else(|| Error::custom(context))
    }

    #[inline(always)]
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.ok_or_else(|| Error::custom(f()))
    }
}

// ====================== CONVENIENCE MACROS ======================

/// Early return with an error: `bail!("msg")`, `bail!(err)` or formatted.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::Error::custom($msg))
    };
    ($err:expr $(,)?) => {
        return Err(Into::<$crate::error::Error>::into($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::format(format_args!($fmt, $($arg)*)))
    };
}

/// Ensure a condition holds, else `bail!`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:literal $(,)?) => {
        if !($cond) {
            $crate::bail!($msg);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($fmt, $($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_side(text: &str) -> Result<u32> {
        let side: u32 = text
            .trim()
            .parse()
            .map_err(|_| Error::custom(format!("not a number: {text}")))?;
        ensure!(side > 0, "grid side must be positive, got {}", side);
        Ok(side)
    }

    #[test]
    fn test_ensure_formats_message() {
        assert_eq!(parse_side("50").ok(), Some(50));
        let err = parse_side("0").unwrap_err();
        assert_eq!(err.to_string(), "grid side must be positive, got 0");
    }

    #[test]
    fn test_ensure_with_literal_message() {
        fn check(ok: bool) -> Result<()> {
            ensure!(ok, "mask texture missing");
            Ok(())
        }
        assert!(check(true).is_ok());
        assert_eq!(check(false).unwrap_err().to_string(), "mask texture missing");
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u8> = None;
        let err = missing.context("no mesh primitive").unwrap_err();
        assert_eq!(err.to_string(), "no mesh primitive");
    }

    #[test]
    fn test_result_with_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.with_context(|| "reading config").unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().starts_with("reading config"));
    }
}
