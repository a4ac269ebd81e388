// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PAL GPIO output
//!
//! Thin wrapper around an `embedded-hal` output pin, used for the control
//! lines of the peripheral on the far end of the I2C bus (supply switch,
//! reset). A board that does not wire a line constructs the wrapper with
//! [`PalGpio::unconnected`]; every operation on it is then a no-op.

#![no_std]

use drv_pal_types::{PalStatus, PortPin};
use embedded_hal::digital::v2::OutputPin;
use pal_ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trace {
    None,
    Init(PortPin),
    InitFailed(PortPin),
    Unconnected(PortPin),
    Deinit(PortPin),
    Released { pin: PortPin, high: bool },
    WriteFailed { pin: PortPin, high: bool },
}

ringbuf!(Trace, 16, Trace::None);

pub struct PalGpio<P> {
    id: PortPin,
    pin: Option<P>,
    /// Set by a successful `init`, cleared by `deinit`
    driving: bool,
}

impl<P: OutputPin> PalGpio<P> {
    /// Wraps `pin`, which is known to the board as `id`.
    pub fn new(id: PortPin, pin: P) -> Self {
        Self {
            id,
            pin: Some(pin),
            driving: false,
        }
    }

    pub fn unconnected(id: PortPin) -> Self {
        Self {
            id,
            pin: None,
            driving: false,
        }
    }

    pub fn id(&self) -> PortPin {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.pin.is_some()
    }

    /// Drives the line to its initial, low, state.
    pub fn init(&mut self) -> PalStatus {
        let Some(pin) = self.pin.as_mut() else {
            ringbuf_entry!(Trace::Unconnected(self.id));
            return PalStatus::Failure;
        };

        match pin.set_low() {
            Ok(()) => {
                ringbuf_entry!(Trace::Init(self.id));
                self.driving = true;
                PalStatus::Success
            }
            Err(_) => {
                ringbuf_entry!(Trace::InitFailed(self.id));
                PalStatus::Failure
            }
        }
    }

    /// Stops driving the line: `set_high`/`set_low` are ignored until the
    /// next `init`. The pin itself stays owned by the wrapper until
    /// [`PalGpio::release`].
    pub fn deinit(&mut self) -> PalStatus {
        ringbuf_entry!(Trace::Deinit(self.id));
        self.driving = false;
        PalStatus::Success
    }

    pub fn set_high(&mut self) {
        self.drive(true);
    }

    pub fn set_low(&mut self) {
        self.drive(false);
    }

    fn drive(&mut self, high: bool) {
        if !self.driving {
            ringbuf_entry!(Trace::Released { pin: self.id, high });
            return;
        }
        let Some(pin) = self.pin.as_mut() else {
            return;
        };
        let result = if high { pin.set_high() } else { pin.set_low() };
        if result.is_err() {
            ringbuf_entry!(Trace::WriteFailed { pin: self.id, high });
        }
    }

    /// Gives the pin back.
    pub fn release(self) -> Option<P> {
        self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_pal_types::board::{PIN_RESET, PIN_VDD};

    extern crate std;
    use std::rc::Rc;
    use std::vec::Vec;
    use core::cell::RefCell;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Level {
        Low,
        High,
    }

    /// Pin that logs every level it is driven to.
    struct MockPin {
        log: Rc<RefCell<Vec<Level>>>,
        broken: bool,
    }

    impl OutputPin for MockPin {
        type Error = ();

        fn set_low(&mut self) -> Result<(), ()> {
            if self.broken {
                return Err(());
            }
            self.log.borrow_mut().push(Level::Low);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), ()> {
            if self.broken {
                return Err(());
            }
            self.log.borrow_mut().push(Level::High);
            Ok(())
        }
    }

    fn pin(broken: bool) -> (MockPin, Rc<RefCell<Vec<Level>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            MockPin {
                log: log.clone(),
                broken,
            },
            log,
        )
    }

    #[test]
    fn test_init_drives_low() {
        let (p, log) = pin(false);
        let mut gpio = PalGpio::new(PIN_VDD, p);

        assert_eq!(gpio.init(), PalStatus::Success);
        assert_eq!(*log.borrow(), [Level::Low]);
    }

    #[test]
    fn test_init_broken_pin() {
        let (p, _) = pin(true);
        let mut gpio = PalGpio::new(PIN_RESET, p);

        assert_eq!(gpio.init(), PalStatus::Failure);
    }

    #[test]
    fn test_unconnected() {
        let mut gpio = PalGpio::<MockPin>::unconnected(PIN_RESET);

        assert!(!gpio.is_connected());
        assert_eq!(gpio.init(), PalStatus::Failure);
        gpio.set_high();
        gpio.set_low();
        assert_eq!(gpio.deinit(), PalStatus::Success);
        assert!(gpio.release().is_none());
    }

    #[test]
    fn test_reset_pulse() {
        let (p, log) = pin(false);
        let mut gpio = PalGpio::new(PIN_RESET, p);

        assert_eq!(gpio.init(), PalStatus::Success);
        gpio.set_high();
        gpio.set_low();
        assert_eq!(gpio.deinit(), PalStatus::Success);

        assert_eq!(*log.borrow(), [Level::Low, Level::High, Level::Low]);
        assert_eq!(gpio.id(), PIN_RESET);
        assert!(gpio.release().is_some());
    }

    #[test]
    fn test_write_errors_are_swallowed() {
        let (p, log) = pin(false);
        let mut gpio = PalGpio::new(PIN_VDD, p);
        assert_eq!(gpio.init(), PalStatus::Success);

        // The pin starts failing after init.
        gpio.pin.as_mut().unwrap().broken = true;
        gpio.set_high();
        gpio.set_low();
        assert_eq!(*log.borrow(), [Level::Low]);
    }

    #[test]
    fn test_not_driven_after_deinit() {
        let (p, log) = pin(false);
        let mut gpio = PalGpio::new(PIN_VDD, p);

        assert_eq!(gpio.init(), PalStatus::Success);
        assert_eq!(gpio.deinit(), PalStatus::Success);
        gpio.set_high();
        gpio.set_low();
        assert_eq!(*log.borrow(), [Level::Low]);

        // A fresh init takes the line back.
        assert_eq!(gpio.init(), PalStatus::Success);
        gpio.set_high();
        assert_eq!(*log.borrow(), [Level::Low, Level::Low, Level::High]);
    }

    #[test]
    fn test_not_driven_before_init() {
        let (p, log) = pin(false);
        let mut gpio = PalGpio::new(PIN_RESET, p);

        gpio.set_high();
        assert!(log.borrow().is_empty());
    }
}
