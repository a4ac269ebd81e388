/// Mock I2C master for host tests
///
/// Stands in for the interrupt-driven master block. It records every call the
/// mediator makes, refuses overlapping transfers the way real hardware does,
/// and lets a test inject failures. Completion interrupts are raised by the
/// test itself, through the sink the mediator registered.

use drv_pal_types::traits::{
    Direction, I2cBlockConfig, I2cEventSink, I2cMasterHardware,
};
use drv_pal_types::{HalError, I2cErrorCode, I2cEvents, PortPin};

/// One call into the mock, as seen by the test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HwCall {
    Init { sda: PortPin, scl: PortPin },
    Configure(I2cBlockConfig),
    RegisterCallback,
    EnableEvents { events: I2cEvents, priority: u8, enable: bool },
    Transfer { address: u8, direction: Direction, length: usize },
    Abort,
    SetDataRate(u32),
    Free,
}

pub struct MockI2cDriver {
    calls: heapless::Vec<HwCall, 32>,
    sink: Option<&'static dyn I2cEventSink>,
    /// Buffer held by the "hardware" while a transfer is in flight
    in_flight: Option<&'static mut [u8]>,
    /// Set between an accepted transfer and its reclaim
    pending: bool,
    init_error: Option<HalError>,
    configure_error: Option<HalError>,
    transfer_error: Option<HalError>,
    /// Highest rate the clock divider can produce
    max_rate_hz: u32,
    /// Bytes a read returns; empty means "address plus index"
    device_response: heapless::Vec<u8, 32>,
}

impl MockI2cDriver {
    pub fn new() -> Self {
        Self {
            calls: heapless::Vec::new(),
            sink: None,
            in_flight: None,
            pending: false,
            init_error: None,
            configure_error: None,
            transfer_error: None,
            max_rate_hz: 1_000_000,
            device_response: heapless::Vec::new(),
        }
    }

    /// Every call made so far, oldest first. Calls beyond the log's
    /// capacity are dropped.
    pub fn calls(&self) -> &[HwCall] {
        &self.calls
    }

    pub fn count(&self, f: impl Fn(&HwCall) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// The sink registered by `register_callback`; the test's stand-in for
    /// the interrupt vector.
    pub fn sink(&self) -> Option<&'static dyn I2cEventSink> {
        self.sink
    }

    pub fn is_transfer_pending(&self) -> bool {
        self.pending
    }

    pub fn fail_init(&mut self, err: HalError) {
        self.init_error = Some(err);
    }

    pub fn fail_configure(&mut self, err: HalError) {
        self.configure_error = Some(err);
    }

    /// Makes the next `transfer_async` refuse with `err`.
    pub fn fail_next_transfer(&mut self, err: HalError) {
        self.transfer_error = Some(err);
    }

    pub fn set_max_rate(&mut self, hz: u32) {
        self.max_rate_hz = hz;
    }

    /// Configure what the addressed device answers on reads
    pub fn set_device_response(&mut self, response: &[u8]) -> Result<(), ()> {
        self.device_response.clear();
        self.device_response.extend_from_slice(response)
    }

    fn log(&mut self, call: HwCall) {
        // A full log only loses the newest calls.
        let _ = self.calls.push(call);
    }
}

impl Default for MockI2cDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cMasterHardware for MockI2cDriver {
    fn init(&mut self, sda: PortPin, scl: PortPin) -> Result<(), HalError> {
        self.log(HwCall::Init { sda, scl });
        match self.init_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn configure(&mut self, config: &I2cBlockConfig) -> Result<(), HalError> {
        self.log(HwCall::Configure(*config));
        match self.configure_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn register_callback(&mut self, sink: &'static dyn I2cEventSink) {
        self.log(HwCall::RegisterCallback);
        self.sink = Some(sink);
    }

    fn enable_events(&mut self, events: I2cEvents, priority: u8, enable: bool) {
        self.log(HwCall::EnableEvents { events, priority, enable });
    }

    fn transfer_async(
        &mut self,
        address: u8,
        direction: Direction,
        buffer: &'static mut [u8],
        length: usize,
    ) -> Result<(), (HalError, &'static mut [u8])> {
        self.log(HwCall::Transfer { address, direction, length });

        if let Some(err) = self.transfer_error.take() {
            return Err((err, buffer));
        }
        if self.pending {
            return Err((I2cErrorCode::PreviousAsyncPending.into(), buffer));
        }
        if length == 0 {
            return Err((I2cErrorCode::TxRxBuffersEmpty.into(), buffer));
        }

        if direction == Direction::Read {
            let len = length.min(buffer.len());
            for (i, byte) in buffer[..len].iter_mut().enumerate() {
                *byte = match self.device_response.get(i) {
                    Some(b) => *b,
                    None if self.device_response.is_empty() => {
                        address.wrapping_add(i as u8)
                    }
                    None => 0,
                };
            }
        }

        self.in_flight = Some(buffer);
        self.pending = true;
        Ok(())
    }

    fn abort_async(&mut self) {
        self.log(HwCall::Abort);
        self.pending = false;
    }

    fn reclaim_buffer(&mut self) -> Option<&'static mut [u8]> {
        self.pending = false;
        self.in_flight.take()
    }

    fn set_data_rate(&mut self, rate_hz: u32) -> u32 {
        self.log(HwCall::SetDataRate(rate_hz));
        if rate_hz == 0 || rate_hz > self.max_rate_hz {
            0
        } else {
            rate_hz
        }
    }

    fn free(&mut self) {
        self.log(HwCall::Free);
        self.sink = None;
        self.pending = false;
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::boxed::Box;

    fn leak(bytes: &[u8]) -> &'static mut [u8] {
        Box::leak(Box::from(bytes))
    }

    #[test]
    fn test_read_fills_default_pattern() {
        let mut driver = MockI2cDriver::new();
        driver
            .transfer_async(0x30, Direction::Read, leak(&[0; 4]), 4)
            .unwrap();

        let buf = driver.reclaim_buffer().unwrap();
        assert_eq!(buf, &[0x30, 0x31, 0x32, 0x33]);
    }

    #[test]
    fn test_configured_response() {
        let mut driver = MockI2cDriver::new();
        driver.set_device_response(&[0x12, 0x34]).unwrap();
        driver
            .transfer_async(0x30, Direction::Read, leak(&[0xff; 3]), 3)
            .unwrap();

        assert_eq!(driver.reclaim_buffer().unwrap(), &[0x12, 0x34, 0x00]);
    }

    #[test]
    fn test_overlapping_transfer_refused() {
        let mut driver = MockI2cDriver::new();
        driver
            .transfer_async(0x30, Direction::Write, leak(&[1]), 1)
            .unwrap();

        let (err, buf) = driver
            .transfer_async(0x30, Direction::Write, leak(&[2]), 1)
            .unwrap_err();
        assert_eq!(err.i2c_code(), Some(I2cErrorCode::PreviousAsyncPending));
        assert_eq!(buf, &[2]);
    }

    #[test]
    fn test_injected_error_is_one_shot() {
        let mut driver = MockI2cDriver::new();
        driver.fail_next_transfer(I2cErrorCode::InvalidPin.into());

        assert!(driver
            .transfer_async(0x30, Direction::Write, leak(&[1]), 1)
            .is_err());
        assert!(driver
            .transfer_async(0x30, Direction::Write, leak(&[1]), 1)
            .is_ok());
        assert_eq!(
            driver.count(|c| matches!(c, HwCall::Transfer { .. })),
            2
        );
    }

    #[test]
    fn test_data_rate_limits() {
        let mut driver = MockI2cDriver::new();
        driver.set_max_rate(400_000);
        assert_eq!(driver.set_data_rate(100_000), 100_000);
        assert_eq!(driver.set_data_rate(1_000_000), 0);
        assert_eq!(driver.set_data_rate(0), 0);
    }
}
