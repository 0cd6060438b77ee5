//! Common error definitions.

use crate::clocks::ConfigError;

macro_rules! impl_from_error {
    ($error:ident) => {
        impl From<$error> for Error {
            fn from(error: $error) -> Self {
                Self::$error(error)
            }
        }
    };
}

/// Alias for Result<T, Error>.
pub type Result<T> = core::result::Result<T, Error>;

/// Collection of all errors that can occur.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Occurs when an expected change of a register doesn't happen in time.
    ///
    /// This is returned when a bounded loop exceeds its allotted iteration count. With the
    /// default `Spin` policy, the loop never gives up and this isn't returned.
    RegisterUnchanged,
    /// The clock configuration was rejected before any register was written.
    ConfigError(ConfigError),
    /// Clock speeds have already been published; setup ran twice.
    AlreadyConfigured,
}

impl_from_error!(ConfigError);
