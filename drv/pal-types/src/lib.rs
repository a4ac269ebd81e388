// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common types for the platform abstraction layer
//!
//! The PAL sits between a secure-element command stack and the platform's
//! hardware drivers. This crate holds the vocabulary both sides share: the
//! tri-state [`PalStatus`] returned by every PAL entry point, the
//! [`PalI2cEvent`] delivered to the upper layer when an I2C transaction
//! resolves, the packed hardware result word [`HalError`], and the traits
//! describing the hardware capabilities the PAL consumes (see [`traits`]).
//!
//! This crate works on both the host and embedded system, so it can be used in
//! host-side tests.

#![no_std]

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::{Deserialize, Serialize};

pub mod board;
pub mod traits;

/// Result of issuing a PAL operation.
///
/// This only ever describes whether an operation was *issued*; the outcome of
/// an accepted asynchronous I2C transfer is reported separately through
/// [`traits::UpperLayerHandler`].
#[derive(
    Copy, Clone, Debug, FromPrimitive, Eq, PartialEq, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum PalStatus {
    Success = 0x0000,
    /// Not recoverable for this attempt; the caller may retry later.
    Failure = 0x0001,
    /// The bus is engaged; retry once the current transaction resolves.
    Busy = 0x0002,
}

impl PalStatus {
    pub fn is_success(self) -> bool {
        self == PalStatus::Success
    }
}

/// Event code handed to the upper-layer callback.
#[derive(
    Copy, Clone, Debug, FromPrimitive, Eq, PartialEq, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum PalI2cEvent {
    Success = 0x0000,
    Error = 0x0001,
    Busy = 0x0002,
}

impl From<PalStatus> for PalI2cEvent {
    fn from(status: PalStatus) -> Self {
        match status {
            PalStatus::Success => PalI2cEvent::Success,
            PalStatus::Failure => PalI2cEvent::Error,
            PalStatus::Busy => PalI2cEvent::Busy,
        }
    }
}

/// Whether the I2C bus is engaged in a transfer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BusState {
    #[default]
    Free,
    Busy,
}

///
/// A GPIO port/pin pair, named the way the board schematics name them
/// (`P6_1` is pin 1 of port 6).
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortPin {
    pub port: u8,
    pub pin: u8,
}

impl PortPin {
    pub const fn new(port: u8, pin: u8) -> Self {
        Self { port, pin }
    }
}

impl core::fmt::Display for PortPin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "P{}_{}", self.port, self.pin)
    }
}

/// Hardware block a [`HalError`] originated from.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u16)]
pub enum HalModule {
    Gpio = 0x01,
    I2c = 0x02,
    Timer = 0x03,
}

///
/// Raw result word returned by a hardware driver.
///
/// The high half identifies the module that produced the error and the low
/// 16 bits carry the module-specific sub-code. Only the sub-code matters to
/// the PAL; for I2C it is interpreted through [`I2cErrorCode`].
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HalError(pub u32);

impl HalError {
    pub const fn new(module: HalModule, code: u16) -> Self {
        Self(((module as u32) << 16) | code as u32)
    }

    pub const fn i2c(code: I2cErrorCode) -> Self {
        Self::new(HalModule::I2c, code as u16)
    }

    /// The module-specific sub-code.
    pub const fn code(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn module(self) -> Option<HalModule> {
        HalModule::from_u16((self.0 >> 16) as u16)
    }

    /// The sub-code interpreted as an I2C driver error, if it is one of the
    /// codes the I2C driver defines.
    pub fn i2c_code(self) -> Option<I2cErrorCode> {
        I2cErrorCode::from_u16(self.code())
    }
}

impl From<I2cErrorCode> for HalError {
    fn from(code: I2cErrorCode) -> Self {
        HalError::i2c(code)
    }
}

/// Sub-codes reported by the I2C master driver.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u16)]
pub enum I2cErrorCode {
    /// Pin cannot be used for I2C
    InvalidPin = 0,
    /// Requested data rate cannot be reached
    CanNotReachDataRate = 1,
    /// Address size is not supported
    InvalidAddressSize = 2,
    /// Both transmit and receive buffers are empty
    TxRxBuffersEmpty = 3,
    /// A previous asynchronous transfer is still pending
    PreviousAsyncPending = 4,
    /// Power-management callback refused the transition
    PmCallback = 5,
}

bitflags! {
    /// Interrupt sources of the I2C master block. Several may be reported
    /// by one interrupt entry.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct I2cEvents: u32 {
        const MASTER_WR_IN_FIFO = 1 << 17;
        const MASTER_WR_CMPLT = 1 << 18;
        const MASTER_RD_CMPLT = 1 << 19;
        const MASTER_ERR = 1 << 20;
    }
}

impl I2cEvents {
    /// The sources the mediator subscribes to.
    pub const MEDIATED: I2cEvents = I2cEvents::MASTER_WR_CMPLT
        .union(I2cEvents::MASTER_RD_CMPLT)
        .union(I2cEvents::MASTER_ERR);

    pub fn is_error(self) -> bool {
        self.contains(I2cEvents::MASTER_ERR)
    }

    pub fn is_complete(self) -> bool {
        self.intersects(I2cEvents::MASTER_WR_CMPLT | I2cEvents::MASTER_RD_CMPLT)
    }
}

/// Pins carrying one I2C bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct I2cInterface {
    pub sda: PortPin,
    pub scl: PortPin,
}

///
/// Caller-owned description of an I2C peer, supplied on every PAL I2C call.
///
/// `hw` of `None` stands for a missing hardware configuration; every
/// operation rejects such a context without touching the bus or invoking a
/// callback. The handler, when present, receives exactly one event per
/// issued operation.
///
#[derive(Copy, Clone)]
pub struct I2cContext {
    pub hw: Option<&'static I2cInterface>,
    /// 7-bit address of the slave device
    pub slave_address: u8,
    pub upper_layer: Option<&'static dyn traits::UpperLayerHandler>,
}

impl I2cContext {
    pub const fn new(
        hw: &'static I2cInterface,
        slave_address: u8,
        upper_layer: &'static dyn traits::UpperLayerHandler,
    ) -> Self {
        Self {
            hw: Some(hw),
            slave_address,
            upper_layer: Some(upper_layer),
        }
    }
}

impl core::fmt::Debug for I2cContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("I2cContext")
            .field("hw", &self.hw)
            .field("slave_address", &self.slave_address)
            .field("upper_layer", &self.upper_layer.is_some())
            .finish()
    }
}
