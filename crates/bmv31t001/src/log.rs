//! Log shim
//!
//! Forwards to `defmt` on hardware builds, to `tracing` on host builds, and
//! compiles to nothing otherwise. Format strings must stay within the common
//! subset of both backends: `{}` placeholders over integers, `bool` and
//! `&str` only.

#[cfg(feature = "defmt")]
macro_rules! log {
    (trace, $($arg:expr),*) => { defmt::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { defmt::debug!($($arg),*) };
    (info, $($arg:expr),*) => { defmt::info!($($arg),*) };
    (warn, $($arg:expr),*) => { defmt::warn!($($arg),*) };
    (error, $($arg:expr),*) => { defmt::error!($($arg),*) };
}

#[cfg(all(feature = "tracing", not(feature = "defmt")))]
macro_rules! log {
    (trace, $($arg:expr),*) => { tracing::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { tracing::debug!($($arg),*) };
    (info, $($arg:expr),*) => { tracing::info!($($arg),*) };
    (warn, $($arg:expr),*) => { tracing::warn!($($arg),*) };
    (error, $($arg:expr),*) => { tracing::error!($($arg),*) };
}

#[cfg(not(any(feature = "defmt", feature = "tracing")))]
macro_rules! log {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = &$arg; )* }};
}
