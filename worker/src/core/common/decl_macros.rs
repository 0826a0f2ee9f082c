// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Shorthand for wrapping a value (or unit) in [`Ok`]. Reads better than `Ok(())` at the
/// tail of long `miette::Result` returning functions.
///
/// ```
/// use r3bl_worker::ok;
///
/// fn unit() -> miette::Result<()> { ok!() }
/// fn value() -> miette::Result<u8> { ok!(42) }
///
/// assert!(unit().is_ok());
/// assert_eq!(value().unwrap(), 42);
/// ```
#[macro_export]
macro_rules! ok {
    // No args.
    () => {
        Ok(())
    };
    // With arg.
    ($value:expr) => {
        Ok($value)
    };
}
