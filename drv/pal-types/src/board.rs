//! Pin assignment of the reference board.

use crate::{I2cInterface, PortPin};

/// I2C data line
pub const I2C_SDA_PIN: PortPin = PortPin::new(6, 1);
/// I2C clock line
pub const I2C_SCL_PIN: PortPin = PortPin::new(6, 0);

/// Supply switch of the secure element
pub const PIN_VDD: PortPin = PortPin::new(6, 5);
/// Reset line of the secure element
pub const PIN_RESET: PortPin = PortPin::new(9, 0);

pub const I2C_INTERFACE: I2cInterface = I2cInterface {
    sda: I2C_SDA_PIN,
    scl: I2C_SCL_PIN,
};
