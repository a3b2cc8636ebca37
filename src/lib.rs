//! Core protocol state machines for two firmware-update drivers: a PixArt
//! RF HID OTA updater and a Synaptics RMI updater spanning a HID register
//! bus (V5 protocol) and a legacy PS/2 serial bus.
//!
//! This crate deliberately excludes the host plugin layer, raw HID/serial
//! kernel I/O, and firmware container parsing — those live behind the
//! [`pixart::HidTransport`], [`rmi::RmiTransport`]/[`rmi::ps2::Ps2Channel`],
//! and [`firmware`] interfaces respectively.

pub mod error;
pub mod firmware;
pub mod orchestrate;
pub mod pixart;
pub mod rmi;

pub use error::{FuError, FuResult, ResultContext};
pub use firmware::{Firmware, RmiFirmware};
