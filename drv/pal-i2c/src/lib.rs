// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! I2C master transaction mediator
//!
//! The mediator owns one I2C master block and arbitrates it between
//! transactions: at most one transfer is in flight at any time. Transfers are
//! issued from foreground code, complete in the block's interrupt, and are
//! reported to the upper layer through the [`UpperLayerHandler`] carried in
//! the caller's [`I2cContext`] -- exactly once per issued operation.
//!
//! # Status versus event
//!
//! Every entry point returns a [`PalStatus`] describing whether the operation
//! was *issued*. The outcome of an accepted transfer arrives later as a
//! [`PalI2cEvent`]:
//!
//! | situation                              | status    | event            |
//! |----------------------------------------|-----------|------------------|
//! | context without hardware or handler    | `Failure` | none             |
//! | bus not initialized                    | `Failure` | `Error`, now     |
//! | a transaction is already in flight     | `Busy`    | `Busy`, now      |
//! | hardware refused the transfer          | see [`classify`] | `Error`, now |
//! | hardware accepted the transfer         | `Success` | from the interrupt |
//!
//! # Interrupt handling
//!
//! `init` registers the mediator itself as the block's [`I2cEventSink`]. The
//! handler gives an error flag precedence over completion flags: it aborts
//! the transfer and reports `Error`; otherwise a write- or read-complete flag
//! reports `Success`. The upper-layer callback always runs after the
//! mediator's critical section is released, so a callback may issue the next
//! transfer straight away. It must not block, since it may be running in
//! interrupt context; boards that cannot afford that select
//! [`DispatchMode::Deferred`] and call [`I2cMediator::dispatch_pending`] from
//! their main loop.
//!
//! There is no queue and no timeout. A transfer whose interrupt never arrives
//! leaves the bus busy; the caller recovers with `deinit`, which aborts it,
//! followed by a fresh `init`.

#![no_std]

use core::cell::RefCell;

use critical_section::Mutex;
use drv_pal_types::traits::{
    Direction, I2cBlockConfig, I2cEventSink, I2cMasterHardware, I2cRole,
    UpperLayerHandler,
};
use drv_pal_types::{
    BusState, HalError, I2cContext, I2cEvents, I2cInterface, PalI2cEvent,
    PalStatus,
};
use pal_ringbuf::*;

mod classify;
pub mod config;
#[cfg(any(test, feature = "mock"))]
pub mod mock_driver;

pub use classify::classify;
pub use config::{DispatchMode, MediatorConfig, ReinitPolicy};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trace {
    None,
    Init { sda: u8, scl: u8 },
    InitFailed { code: u16 },
    AlreadyInitialized,
    Deinit,
    DeinitAbort { addr: u8 },
    BadContext,
    NotInitialized,
    BusBusy { addr: u8 },
    BadLength { len: usize, capacity: usize },
    Issued { addr: u8, direction: Direction, len: usize },
    Refused { addr: u8, code: u16, status: PalStatus },
    Complete { addr: u8 },
    Error { addr: u8 },
    Spurious { events: u32 },
    Unhandled { events: u32 },
    Deferred { addr: u8 },
    Bitrate { requested: u16, applied: u16, achieved: u32 },
}

ringbuf!(Trace, 32, Trace::None);

/// Running counters, for debugging and for upper layers that want to report
/// bus health.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TransactionStats {
    /// Transfers accepted by the hardware
    pub issued: u32,
    /// Accepted transfers that completed successfully
    pub completed: u32,
    /// Accepted transfers that ended in an error interrupt
    pub failed: u32,
    /// Transfers the hardware refused to start
    pub refused: u32,
    /// Requests turned away because a transaction was in flight
    pub busy_rejections: u32,
    /// Interrupts that arrived with no transaction in flight
    pub spurious_interrupts: u32,
}

impl TransactionStats {
    const fn new() -> Self {
        Self {
            issued: 0,
            completed: 0,
            failed: 0,
            refused: 0,
            busy_rejections: 0,
            spurious_interrupts: 0,
        }
    }
}

/// The transaction in flight. Written once when the transfer is issued, taken
/// once by the interrupt handler.
#[derive(Copy, Clone)]
struct TransactionContext {
    slave_address: u8,
    upper_layer: &'static dyn UpperLayerHandler,
}

/// A resolved operation whose callback has not run yet.
struct Completion {
    upper_layer: &'static dyn UpperLayerHandler,
    event: PalI2cEvent,
    buffer: Option<&'static mut [u8]>,
}

impl Completion {
    fn deliver(self) {
        self.upper_layer.handle_event(self.event, self.buffer);
    }
}

struct State<H> {
    hw: H,
    initialized: bool,
    bus: BusState,
    current: Option<TransactionContext>,
    /// Outcome waiting for `dispatch_pending` in deferred mode
    pending: Option<Completion>,
    stats: TransactionStats,
}

/// Mediator for one I2C master block.
///
/// Meant to live in a `static` so that it can be registered with the
/// hardware's interrupt; all methods take `&self`.
pub struct I2cMediator<H> {
    config: MediatorConfig,
    state: Mutex<RefCell<State<H>>>,
}

impl<H: I2cMasterHardware + Send + 'static> I2cMediator<H> {
    pub const fn new(hw: H, config: MediatorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RefCell::new(State {
                hw,
                initialized: false,
                bus: BusState::Free,
                current: None,
                pending: None,
                stats: TransactionStats::new(),
            })),
        }
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    /// Brings up the master block on the pins named by `ctx` and starts
    /// listening for its interrupts.
    ///
    /// Fails if `ctx` names no hardware or if any configuration step fails.
    /// Calling it again while initialized is governed by
    /// [`MediatorConfig::reinit`] and never touches the hardware.
    pub fn init(&'static self, ctx: &I2cContext) -> PalStatus {
        let Some(itf) = ctx.hw else {
            ringbuf_entry!(Trace::BadContext);
            return PalStatus::Failure;
        };

        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);

            if state.initialized {
                ringbuf_entry!(Trace::AlreadyInitialized);
                return match self.config.reinit {
                    ReinitPolicy::Reject => PalStatus::Failure,
                    ReinitPolicy::Accept => PalStatus::Success,
                };
            }

            match self.bring_up(&mut state.hw, itf) {
                Ok(()) => {
                    ringbuf_entry!(Trace::Init {
                        sda: itf.sda.pin,
                        scl: itf.scl.pin
                    });
                    state.initialized = true;
                    state.bus = BusState::Free;
                    state.current = None;
                    state.pending = None;
                    PalStatus::Success
                }
                Err(err) => {
                    ringbuf_entry!(Trace::InitFailed { code: err.code() });
                    PalStatus::Failure
                }
            }
        })
    }

    fn bring_up(
        &'static self,
        hw: &mut H,
        itf: &I2cInterface,
    ) -> Result<(), HalError> {
        hw.init(itf.sda, itf.scl)?;

        let block = I2cBlockConfig {
            role: I2cRole::Master,
            address: 0,
            frequency_hz: self.config.frequency_hz(),
        };
        if let Err(err) = hw.configure(&block) {
            hw.free();
            return Err(err);
        }

        hw.register_callback(self);
        hw.enable_events(
            I2cEvents::MEDIATED,
            self.config.interrupt_priority,
            true,
        );
        Ok(())
    }

    /// Releases the master block.
    ///
    /// Always tears down. A transfer still in flight is aborted and its
    /// upper layer gets an `Error` callback; in deferred mode an outcome not
    /// yet dispatched is delivered as it stands. This is the way out for a
    /// caller whose transfer never raised its interrupt.
    pub fn deinit(&self, ctx: &I2cContext) -> PalStatus {
        if ctx.hw.is_none() {
            ringbuf_entry!(Trace::BadContext);
            return PalStatus::Failure;
        }

        let (status, orphan) = critical_section::with(|cs| {
            let mut guard = self.state.borrow_ref_mut(cs);
            let state = &mut *guard;

            if !state.initialized {
                ringbuf_entry!(Trace::NotInitialized);
                return (PalStatus::Failure, None);
            }

            let orphan = match (state.pending.take(), state.current.take()) {
                (Some(completion), _) => Some(completion),
                (None, Some(txn)) => {
                    ringbuf_entry!(Trace::DeinitAbort {
                        addr: txn.slave_address
                    });
                    state.hw.abort_async();
                    state.stats.failed = state.stats.failed.wrapping_add(1);
                    Some(Completion {
                        upper_layer: txn.upper_layer,
                        event: PalI2cEvent::Error,
                        buffer: state.hw.reclaim_buffer(),
                    })
                }
                (None, None) => None,
            };

            state.hw.enable_events(
                I2cEvents::MEDIATED,
                self.config.interrupt_priority,
                false,
            );
            state.hw.free();
            state.initialized = false;
            state.bus = BusState::Free;
            ringbuf_entry!(Trace::Deinit);
            (PalStatus::Success, orphan)
        });

        if let Some(completion) = orphan {
            completion.deliver();
        }
        status
    }

    /// Starts writing the first `length` bytes of `data` to
    /// `ctx.slave_address`. `data` comes back in the callback.
    pub fn write(
        &self,
        ctx: &I2cContext,
        data: &'static mut [u8],
        length: usize,
    ) -> PalStatus {
        self.transfer(ctx, Direction::Write, data, length)
    }

    /// Starts reading `length` bytes from `ctx.slave_address` into `buffer`,
    /// which comes back, filled, in the callback.
    pub fn read(
        &self,
        ctx: &I2cContext,
        buffer: &'static mut [u8],
        length: usize,
    ) -> PalStatus {
        self.transfer(ctx, Direction::Read, buffer, length)
    }

    fn transfer(
        &self,
        ctx: &I2cContext,
        direction: Direction,
        buffer: &'static mut [u8],
        length: usize,
    ) -> PalStatus {
        let (Some(_), Some(upper_layer)) = (ctx.hw, ctx.upper_layer) else {
            ringbuf_entry!(Trace::BadContext);
            return PalStatus::Failure;
        };
        let addr = ctx.slave_address;

        let (status, rejection) = critical_section::with(|cs| {
            let mut guard = self.state.borrow_ref_mut(cs);
            let state = &mut *guard;

            let reject = |event, buffer| Completion {
                upper_layer,
                event,
                buffer: Some(buffer),
            };

            if !state.initialized {
                ringbuf_entry!(Trace::NotInitialized);
                return (
                    PalStatus::Failure,
                    Some(reject(PalI2cEvent::Error, buffer)),
                );
            }
            if state.bus == BusState::Busy {
                ringbuf_entry!(Trace::BusBusy { addr });
                state.stats.busy_rejections =
                    state.stats.busy_rejections.wrapping_add(1);
                return (
                    PalStatus::Busy,
                    Some(reject(PalI2cEvent::Busy, buffer)),
                );
            }
            if length > buffer.len() {
                ringbuf_entry!(Trace::BadLength {
                    len: length,
                    capacity: buffer.len()
                });
                return (
                    PalStatus::Failure,
                    Some(reject(PalI2cEvent::Error, buffer)),
                );
            }

            state.current = Some(TransactionContext {
                slave_address: addr,
                upper_layer,
            });
            state.bus = BusState::Busy;

            match state.hw.transfer_async(addr, direction, buffer, length) {
                Ok(()) => {
                    ringbuf_entry!(Trace::Issued {
                        addr,
                        direction,
                        len: length
                    });
                    state.stats.issued = state.stats.issued.wrapping_add(1);
                    (PalStatus::Success, None)
                }
                Err((err, buffer)) => {
                    state.current = None;
                    state.bus = BusState::Free;
                    state.stats.refused = state.stats.refused.wrapping_add(1);

                    let status = classify(err);
                    ringbuf_entry!(Trace::Refused {
                        addr,
                        code: err.code(),
                        status
                    });
                    (status, Some(reject(PalI2cEvent::Error, buffer)))
                }
            }
        });

        if let Some(completion) = rejection {
            completion.deliver();
        }
        status
    }

    /// Sets the bus speed, clamped to [`MediatorConfig::max_bitrate_khz`].
    ///
    /// Synchronous: the handler in `ctx`, if any, is told the outcome before
    /// this returns. Refused with `Busy` while a transfer is in flight.
    pub fn set_bitrate(&self, ctx: &I2cContext, bitrate_khz: u16) -> PalStatus {
        if ctx.hw.is_none() {
            ringbuf_entry!(Trace::BadContext);
            return PalStatus::Failure;
        }

        let (status, event) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);

            if !state.initialized {
                ringbuf_entry!(Trace::NotInitialized);
                return (PalStatus::Failure, PalI2cEvent::Error);
            }
            if state.bus == BusState::Busy {
                ringbuf_entry!(Trace::BusBusy {
                    addr: ctx.slave_address
                });
                state.stats.busy_rejections =
                    state.stats.busy_rejections.wrapping_add(1);
                return (PalStatus::Busy, PalI2cEvent::Busy);
            }

            let applied = bitrate_khz.min(self.config.max_bitrate_khz);
            let achieved = state.hw.set_data_rate(u32::from(applied) * 1000);
            ringbuf_entry!(Trace::Bitrate {
                requested: bitrate_khz,
                applied,
                achieved
            });

            if achieved == 0 {
                (PalStatus::Failure, PalI2cEvent::Error)
            } else {
                (PalStatus::Success, PalI2cEvent::Success)
            }
        });

        if let Some(upper_layer) = ctx.upper_layer {
            upper_layer.handle_event(event, None);
        }
        status
    }

    /// Interrupt handler for the master block.
    ///
    /// Wired up by `init` through [`I2cEventSink`]; platforms that route the
    /// vector themselves may call it directly.
    pub fn on_interrupt(&self, events: I2cEvents) {
        let completion = critical_section::with(|cs| {
            let mut guard = self.state.borrow_ref_mut(cs);
            let state = &mut *guard;

            if !events.is_error() && !events.is_complete() {
                ringbuf_entry!(Trace::Unhandled {
                    events: events.bits()
                });
                return None;
            }

            let Some(txn) = state.current.take() else {
                ringbuf_entry!(Trace::Spurious {
                    events: events.bits()
                });
                state.stats.spurious_interrupts =
                    state.stats.spurious_interrupts.wrapping_add(1);
                return None;
            };
            let addr = txn.slave_address;

            let event = if events.is_error() {
                state.hw.abort_async();
                ringbuf_entry!(Trace::Error { addr });
                state.stats.failed = state.stats.failed.wrapping_add(1);
                PalI2cEvent::Error
            } else {
                ringbuf_entry!(Trace::Complete { addr });
                state.stats.completed = state.stats.completed.wrapping_add(1);
                PalI2cEvent::Success
            };

            let completion = Completion {
                upper_layer: txn.upper_layer,
                event,
                buffer: state.hw.reclaim_buffer(),
            };

            match self.config.dispatch {
                DispatchMode::Direct => {
                    state.bus = BusState::Free;
                    Some(completion)
                }
                DispatchMode::Deferred => {
                    ringbuf_entry!(Trace::Deferred { addr });
                    state.pending = Some(completion);
                    None
                }
            }
        });

        if let Some(completion) = completion {
            completion.deliver();
        }
    }

    /// Delivers an outcome recorded by the interrupt handler in deferred
    /// mode, freeing the bus. Returns whether there was one.
    pub fn dispatch_pending(&self) -> bool {
        let completion = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let completion = state.pending.take()?;
            state.bus = BusState::Free;
            Some(completion)
        });

        match completion {
            Some(completion) => {
                completion.deliver();
                true
            }
            None => false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).initialized)
    }

    pub fn bus_state(&self) -> BusState {
        critical_section::with(|cs| self.state.borrow_ref(cs).bus)
    }

    pub fn stats(&self) -> TransactionStats {
        critical_section::with(|cs| self.state.borrow_ref(cs).stats)
    }

    /// Runs `f` on the hardware with the mediator's state locked. `f` must
    /// not call back into the mediator.
    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs).hw))
    }
}

impl<H: I2cMasterHardware + Send + 'static> I2cEventSink for I2cMediator<H> {
    fn on_hardware_event(&self, events: I2cEvents) {
        self.on_interrupt(events);
    }
}
