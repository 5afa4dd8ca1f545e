//! Low-level driver for the GameCube disc interface (DI).
//!
//! The DI is the glue between the CPU and the drive's own microcontroller: the CPU writes a
//! command packet and an optional DMA target into a handful of registers, kicks the transfer and
//! gets an interrupt when the drive is done. This crate implements everything between "the caller
//! wants N bytes at this disc offset" and "the callback gets told how it went", including the
//! seek workaround needed by some drive firmware revisions.
//!
//! Everything the driver needs from the surrounding OS (registers, alarms, interrupt gating, the
//! system timer) goes through the [`dvd::Platform`] trait. [`dvd::sim::SimDrive`] provides an
//! in-memory implementation used by the tests and the demo binary.

#[macro_use]
extern crate log;

pub mod dvd;
pub mod error;
