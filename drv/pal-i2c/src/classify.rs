//! Hardware error classification
//!
//! The one place a raw hardware result is turned into a [`PalStatus`]. Every
//! call site that needs to report a refused transfer goes through
//! [`classify`].

use drv_pal_types::{HalError, I2cErrorCode, PalStatus};

/// Maps an I2C driver error to the status reported to the upper layer.
///
/// Only a still-pending previous transfer means the bus is busy; every other
/// code, including ones the driver does not define, is a failure.
pub fn classify(err: HalError) -> PalStatus {
    match err.i2c_code() {
        Some(I2cErrorCode::PreviousAsyncPending) => PalStatus::Busy,
        Some(
            I2cErrorCode::InvalidPin
            | I2cErrorCode::CanNotReachDataRate
            | I2cErrorCode::InvalidAddressSize
            | I2cErrorCode::TxRxBuffersEmpty
            | I2cErrorCode::PmCallback,
        ) => PalStatus::Failure,
        None => PalStatus::Failure,
    }
}
