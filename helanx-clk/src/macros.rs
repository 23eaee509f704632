// Logging shims: forward to defmt when the feature is enabled, otherwise only
// touch the arguments so they don't trip unused variable lints.

macro_rules! log_forward {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        defmt::$level!($fmt $(, $arg)*);
        #[cfg(not(feature = "defmt"))]
        {
            $(let _ = &$arg;)*
        }
    }};
}

macro_rules! debug {
    ($($t:tt)*) => {
        log_forward!(debug, $($t)*)
    };
}

macro_rules! info {
    ($($t:tt)*) => {
        log_forward!(info, $($t)*)
    };
}

macro_rules! warn {
    ($($t:tt)*) => {
        log_forward!(warn, $($t)*)
    };
}

macro_rules! error {
    ($($t:tt)*) => {
        log_forward!(error, $($t)*)
    };
}
