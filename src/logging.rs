//! Log macros that forward to defmt with the `defmt` feature and vanish without it.
//!
//! Host builds have no defmt global logger, so generic code logs through these.

macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        {
            ::defmt::debug!($($arg)*);
        }
    };
}

macro_rules! log_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        {
            ::defmt::info!($($arg)*);
        }
    };
}

macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        {
            ::defmt::warn!($($arg)*);
        }
    };
}
