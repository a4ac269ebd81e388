//! Mediator configuration

use serde::{Deserialize, Serialize};

/// Maximum bit rate of the I2C master, in kHz
pub const PAL_I2C_MASTER_MAX_BITRATE_KHZ: u16 = 400;

/// Interrupt priority of the I2C master block
pub const PAL_I2C_MASTER_INTR_PRIO: u8 = 3;

/// What a second `init` does while the bus is already initialized.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReinitPolicy {
    /// Return `Failure`; the hardware is not touched.
    Reject,
    /// Return `Success`; the hardware is not touched.
    Accept,
}

/// Where the upper-layer callback runs for interrupt-driven completions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DispatchMode {
    /// From the interrupt handler itself.
    Direct,
    /// From the next call to `dispatch_pending`, made by foreground code.
    /// The bus stays busy until then.
    Deferred,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MediatorConfig {
    /// Ceiling for `set_bitrate`, and the rate the bus starts at.
    pub max_bitrate_khz: u16,
    pub interrupt_priority: u8,
    pub reinit: ReinitPolicy,
    pub dispatch: DispatchMode,
}

impl MediatorConfig {
    pub const fn new() -> Self {
        Self {
            max_bitrate_khz: PAL_I2C_MASTER_MAX_BITRATE_KHZ,
            interrupt_priority: PAL_I2C_MASTER_INTR_PRIO,
            reinit: ReinitPolicy::Reject,
            dispatch: DispatchMode::Direct,
        }
    }

    pub const fn with_reinit(mut self, reinit: ReinitPolicy) -> Self {
        self.reinit = reinit;
        self
    }

    pub const fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Bus frequency programmed by `init`.
    pub const fn frequency_hz(&self) -> u32 {
        self.max_bitrate_khz as u32 * 1000
    }
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
