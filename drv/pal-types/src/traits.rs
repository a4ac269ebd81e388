//! Hardware capabilities consumed by the PAL, and the callback contract it
//! exposes to the upper layer.
//!
//! The platform supplies implementations of [`I2cMasterHardware`] and
//! [`TimerHardware`] for its peripherals; the PAL drivers are generic over
//! them so the same mediation logic runs against real silicon and against
//! the mocks used in host tests.

use crate::{HalError, I2cEvents, PalI2cEvent, PortPin};
use serde::{Deserialize, Serialize};

/// Role the I2C block is configured for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum I2cRole {
    Master,
    Slave,
}

/// Configuration applied by [`I2cMasterHardware::configure`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct I2cBlockConfig {
    pub role: I2cRole,
    /// Own address; unused when the role is [`I2cRole::Master`].
    pub address: u8,
    pub frequency_hz: u32,
}

/// Direction of a single asynchronous transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Master to slave
    Write,
    /// Slave to master
    Read,
}

///
/// Interrupt-driven I2C master transfer primitive.
///
/// None of these methods may block. [`transfer_async`] only *starts* a
/// transfer; its outcome arrives later as a call to the registered
/// [`I2cEventSink`] from the block's interrupt.
///
/// Transfer buffers are `'static` because the hardware keeps using them
/// after `transfer_async` returns. Ownership goes back to the caller through
/// [`reclaim_buffer`] once the transfer has completed or been aborted, or in
/// the `Err` of `transfer_async` if the request was refused.
///
/// [`transfer_async`]: I2cMasterHardware::transfer_async
/// [`reclaim_buffer`]: I2cMasterHardware::reclaim_buffer
pub trait I2cMasterHardware {
    /// Claims the block and routes it to the given pins.
    fn init(&mut self, sda: PortPin, scl: PortPin) -> Result<(), HalError>;

    fn configure(&mut self, config: &I2cBlockConfig) -> Result<(), HalError>;

    /// Routes the block's interrupt to `sink`.
    fn register_callback(&mut self, sink: &'static dyn I2cEventSink);

    fn enable_events(&mut self, events: I2cEvents, priority: u8, enable: bool);

    /// Starts a transfer of the first `length` bytes of `buffer` to or from
    /// `address`.
    fn transfer_async(
        &mut self,
        address: u8,
        direction: Direction,
        buffer: &'static mut [u8],
        length: usize,
    ) -> Result<(), (HalError, &'static mut [u8])>;

    /// Stops the transfer in progress, if any.
    fn abort_async(&mut self);

    /// Returns the buffer of the last transfer once the hardware is done with
    /// it. For reads, the received bytes are in place.
    fn reclaim_buffer(&mut self) -> Option<&'static mut [u8]>;

    /// Reprograms the clock divider for `rate_hz`. Returns the rate actually
    /// achieved, or 0 if no divider satisfies the request.
    fn set_data_rate(&mut self, rate_hz: u32) -> u32;

    /// Releases the block.
    fn free(&mut self);
}

/// Receiver of I2C interrupt events.
pub trait I2cEventSink: Sync {
    fn on_hardware_event(&self, events: I2cEvents);
}

///
/// Upper-layer callback.
///
/// Invoked once per issued operation, either synchronously from the calling
/// context (rejections, `set_bitrate`) or from interrupt context (completion
/// of an accepted transfer). Implementations must not block. The receiver
/// (`&self`) is the upper layer's own context.
///
/// `buffer` hands back the buffer passed to `write`/`read`; it is `None` for
/// operations that carry no buffer.
pub trait UpperLayerHandler: Sync {
    fn handle_event(
        &self,
        event: PalI2cEvent,
        buffer: Option<&'static mut [u8]>,
    );
}

/// Counting direction of a hardware timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CountDirection {
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    pub compare_value: u32,
    /// Ticks per period; the terminal-count event fires once per period.
    pub period: u32,
    pub direction: CountDirection,
    pub is_compare: bool,
    pub is_continuous: bool,
    /// Initial counter value
    pub value: u32,
}

/// Free-running hardware counter.
pub trait TimerHardware {
    fn init(&mut self) -> Result<(), HalError>;

    fn configure(&mut self, config: &TimerConfig) -> Result<(), HalError>;

    fn register_callback(&mut self, sink: &'static dyn TimerEventSink);

    /// Enables (or disables) the terminal-count interrupt.
    fn enable_terminal_count_event(&mut self, priority: u8, enable: bool);

    fn start(&mut self) -> Result<(), HalError>;

    /// Current counter value, in ticks since the start of the period.
    fn read(&self) -> u32;

    fn free(&mut self);
}

/// Receiver of the timer's terminal-count interrupt.
pub trait TimerEventSink: Sync {
    fn on_terminal_count(&self);
}
