// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PAL OS timer
//!
//! A time base built from a hardware counter ticking at 1 MHz with a period of
//! one second. The counter gives the position within the current second; the
//! terminal-count interrupt advances a seconds count. All times are `u32` and
//! wrap.

#![no_std]

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use drv_pal_types::traits::{
    CountDirection, TimerConfig, TimerEventSink, TimerHardware,
};
use drv_pal_types::{HalError, PalStatus};
use pal_ringbuf::*;

/// Counter ticks per period; at 1 MHz, one second.
pub const TIMER_PERIOD_US: u32 = 1_000_000;

/// Priority of the terminal-count interrupt
pub const TIMER_INTR_PRIO: u8 = 7;

pub const TIMER_CONFIG: TimerConfig = TimerConfig {
    compare_value: 0,
    period: TIMER_PERIOD_US,
    direction: CountDirection::Up,
    is_compare: false,
    is_continuous: true,
    value: 0,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trace {
    None,
    Init,
    InitFailed { code: u16 },
    Deinit,
}

ringbuf!(Trace, 8, Trace::None);

pub struct PalOsTimer<T> {
    hw: Mutex<RefCell<T>>,
    seconds: Mutex<Cell<u32>>,
}

impl<T: TimerHardware + Send + 'static> PalOsTimer<T> {
    pub const fn new(hw: T) -> Self {
        Self {
            hw: Mutex::new(RefCell::new(hw)),
            seconds: Mutex::new(Cell::new(0)),
        }
    }

    /// Configures the counter, hooks up the terminal-count interrupt and
    /// starts counting.
    pub fn init(&'static self) -> PalStatus {
        let result = critical_section::with(|cs| {
            self.bring_up(&mut self.hw.borrow_ref_mut(cs))
        });

        match result {
            Ok(()) => {
                ringbuf_entry!(Trace::Init);
                PalStatus::Success
            }
            Err(err) => {
                ringbuf_entry!(Trace::InitFailed { code: err.code() });
                PalStatus::Failure
            }
        }
    }

    fn bring_up(&'static self, hw: &mut T) -> Result<(), HalError> {
        hw.init()?;
        hw.configure(&TIMER_CONFIG)?;
        hw.register_callback(self);
        hw.enable_terminal_count_event(TIMER_INTR_PRIO, true);
        hw.start()
    }

    pub fn deinit(&self) -> PalStatus {
        critical_section::with(|cs| self.hw.borrow_ref_mut(cs).free());
        ringbuf_entry!(Trace::Deinit);
        PalStatus::Success
    }

    /// Terminal-count interrupt handler.
    pub fn on_terminal_count(&self) {
        critical_section::with(|cs| {
            let seconds = self.seconds.borrow(cs);
            seconds.set(seconds.get().wrapping_add(1));
        });
    }

    fn now(&self) -> (u32, u32) {
        critical_section::with(|cs| {
            let ticks = self.hw.borrow_ref(cs).read();
            (ticks, self.seconds.borrow(cs).get())
        })
    }

    pub fn get_time_in_microseconds(&self) -> u32 {
        let (ticks, seconds) = self.now();
        ticks.wrapping_add(seconds.wrapping_mul(1_000_000))
    }

    pub fn get_time_in_milliseconds(&self) -> u32 {
        let (ticks, seconds) = self.now();
        (ticks / 1000).wrapping_add(seconds.wrapping_mul(1000))
    }

    /// Spins until more than `milliseconds` have passed.
    pub fn delay_in_milliseconds(&self, milliseconds: u16) {
        let start = self.get_time_in_milliseconds();
        while self.get_time_in_milliseconds().wrapping_sub(start)
            <= u32::from(milliseconds)
        {
            core::hint::spin_loop();
        }
    }

    #[cfg(test)]
    fn set_seconds(&self, value: u32) {
        critical_section::with(|cs| self.seconds.borrow(cs).set(value));
    }
}

impl<T: TimerHardware + Send + 'static> TimerEventSink for PalOsTimer<T> {
    fn on_terminal_count(&self) {
        PalOsTimer::on_terminal_count(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_pal_types::I2cErrorCode;

    extern crate std;
    use std::boxed::Box;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Step {
        Init,
        Configure(TimerConfig),
        Register,
        Enable { priority: u8, enable: bool },
        Start,
        Free,
    }

    /// Counter that moves forward by `step` ticks before every read and raises
    /// the terminal-count interrupt when it rolls over.
    struct MockTimer {
        steps: heapless::Vec<Step, 8>,
        sink: Option<&'static dyn TimerEventSink>,
        ticks: Cell<u32>,
        step: u32,
        reads: Cell<u32>,
        fail_start: bool,
    }

    impl MockTimer {
        fn new(step: u32) -> Self {
            Self {
                steps: heapless::Vec::new(),
                sink: None,
                ticks: Cell::new(0),
                step,
                reads: Cell::new(0),
                fail_start: false,
            }
        }

        fn starting_at(step: u32, ticks: u32) -> Self {
            let t = Self::new(step);
            t.ticks.set(ticks);
            t
        }

        fn log(&mut self, step: Step) {
            let _ = self.steps.push(step);
        }
    }

    impl TimerHardware for MockTimer {
        fn init(&mut self) -> Result<(), HalError> {
            self.log(Step::Init);
            Ok(())
        }

        fn configure(&mut self, config: &TimerConfig) -> Result<(), HalError> {
            self.log(Step::Configure(*config));
            Ok(())
        }

        fn register_callback(&mut self, sink: &'static dyn TimerEventSink) {
            self.log(Step::Register);
            self.sink = Some(sink);
        }

        fn enable_terminal_count_event(&mut self, priority: u8, enable: bool) {
            self.log(Step::Enable { priority, enable });
        }

        fn start(&mut self) -> Result<(), HalError> {
            self.log(Step::Start);
            if self.fail_start {
                // Any module/code pair will do.
                Err(I2cErrorCode::InvalidPin.into())
            } else {
                Ok(())
            }
        }

        fn read(&self) -> u32 {
            self.reads.set(self.reads.get() + 1);
            let mut ticks = self.ticks.get() + self.step;
            if ticks >= TIMER_PERIOD_US {
                ticks -= TIMER_PERIOD_US;
                if let Some(sink) = self.sink {
                    sink.on_terminal_count();
                }
            }
            self.ticks.set(ticks);
            ticks
        }

        fn free(&mut self) {
            self.log(Step::Free);
            self.sink = None;
        }
    }

    type Timer = PalOsTimer<MockTimer>;

    fn timer(hw: MockTimer) -> &'static Timer {
        Box::leak(Box::new(PalOsTimer::new(hw)))
    }

    fn steps(t: &Timer) -> std::vec::Vec<Step> {
        critical_section::with(|cs| t.hw.borrow_ref(cs).steps.to_vec())
    }

    #[test]
    fn test_init_sequence() {
        let t = timer(MockTimer::new(1));

        assert_eq!(t.init(), PalStatus::Success);
        assert_eq!(
            steps(t),
            [
                Step::Init,
                Step::Configure(TIMER_CONFIG),
                Step::Register,
                Step::Enable {
                    priority: 7,
                    enable: true
                },
                Step::Start,
            ]
        );
    }

    #[test]
    fn test_init_start_failure() {
        let mut hw = MockTimer::new(1);
        hw.fail_start = true;
        let t = timer(hw);

        assert_eq!(t.init(), PalStatus::Failure);
    }

    #[test]
    fn test_deinit_frees() {
        let t = timer(MockTimer::new(1));
        assert_eq!(t.init(), PalStatus::Success);

        assert_eq!(t.deinit(), PalStatus::Success);
        assert_eq!(steps(t).last(), Some(&Step::Free));
        // Also fine without init.
        assert_eq!(timer(MockTimer::new(1)).deinit(), PalStatus::Success);
    }

    #[test]
    fn test_time_combines_counter_and_seconds() {
        let t = timer(MockTimer::starting_at(0, 250_000));
        t.set_seconds(3);

        assert_eq!(t.get_time_in_microseconds(), 3_250_000);
        assert_eq!(t.get_time_in_milliseconds(), 3_250);
    }

    #[test]
    fn test_terminal_count_advances_seconds() {
        let t = timer(MockTimer::new(0));
        assert_eq!(t.init(), PalStatus::Success);

        t.on_terminal_count();
        t.on_terminal_count();
        assert_eq!(t.get_time_in_milliseconds(), 2_000);
    }

    #[test]
    fn test_microseconds_wrap() {
        let t = timer(MockTimer::starting_at(0, 999_999));
        t.set_seconds(4294);

        // 4294 * 10^6 + 999_999 = 4_294_999_999, past u32::MAX.
        assert_eq!(t.get_time_in_microseconds(), 4_294_999_999u64 as u32);
    }

    #[test]
    fn test_delay_waits_past_deadline() {
        // 100 us per read.
        let t = timer(MockTimer::new(100));
        assert_eq!(t.init(), PalStatus::Success);

        let before = t.get_time_in_milliseconds();
        t.delay_in_milliseconds(5);
        let after = t.get_time_in_milliseconds();

        assert!(after.wrapping_sub(before) > 5);
    }

    #[test]
    fn test_delay_zero_returns() {
        let t = timer(MockTimer::new(1000));
        assert_eq!(t.init(), PalStatus::Success);

        t.delay_in_milliseconds(0);
        let reads =
            critical_section::with(|cs| t.hw.borrow_ref(cs).reads.get());
        // 1 ms per read: one read for the start, one to get past it.
        assert_eq!(reads, 2);
    }

    #[test]
    fn test_delay_across_wraparound() {
        // Millisecond time starts 1 ms short of wrapping.
        let t = timer(MockTimer::starting_at(500, 293_500));
        assert_eq!(t.init(), PalStatus::Success);
        t.set_seconds(4_294_967);
        assert_eq!(t.get_time_in_milliseconds(), u32::MAX - 1);

        t.delay_in_milliseconds(10);

        let now = t.get_time_in_milliseconds();
        assert!(now < 100, "time did not wrap: {now}");
    }
}
