#![no_std]

// CCD presence detection for the AP, EC, and Servo debug lines.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware reaches it only through the `DetectLine` and
// `UartControl` traits.

pub mod arbitration;
pub mod config;
pub mod detector;
pub mod hooks;
pub mod repl;
pub mod state;
pub mod status;
pub mod suite;
pub mod telemetry;
