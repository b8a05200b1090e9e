#[cfg(not(test))]
#[cfg(feature = "log")]
macro_rules! inic_log {
    (trace, $($arg:expr),*) => { log::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { log::debug!($($arg),*) };
    (warn, $($arg:expr),*) => { log::warn!($($arg),*) };
}

#[cfg(any(test, not(feature = "log")))]
macro_rules! inic_log {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = $arg; )* }}
}

macro_rules! inic_trace {
    ($($arg:expr),*) => (inic_log!(trace, $($arg),*));
}

macro_rules! inic_debug {
    ($($arg:expr),*) => (inic_log!(debug, $($arg),*));
}

macro_rules! inic_warn {
    ($($arg:expr),*) => (inic_log!(warn, $($arg),*));
}
