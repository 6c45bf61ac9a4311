//! A Modbus server (slave) implementation using [Tokio](https://docs.rs/tokio)
//! and Rust's `async/await` syntax.
//!
//! # Features
//!
//! * Panic-free parsing
//! * TCP, TLS, and serial RTU transports, any number of each
//! * Interchangeable register bank storage
//! * Per-function-code handler overrides
//!
//! # Supported functions
//!
//! * Read Coils
//! * Read Discrete Inputs
//! * Read Holding Registers
//! * Read Input Registers
//! * Write Single Coil
//! * Write Single Register
//! * Write Multiple Coils
//! * Write Multiple Registers
//!
//! All requests are funneled through a single dispatcher task that owns the
//! register bank, so writes are atomic with respect to reads and no locking
//! is required in handlers or banks.

#![deny(
    non_ascii_idents,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces
)]
#![forbid(unsafe_code)]

/// register bank trait and the default in-memory implementation
pub mod bank;
/// public constant values related to the Modbus specification
pub mod constants;
/// controls decoding of wire traffic into the log
pub mod decode;
/// error types associated with receiving and decoding requests
pub mod error;
/// serial port settings
pub mod serial;
/// server API
pub mod server;
/// types used in requests and responses
pub mod types;

// internal modules
mod common;
mod exception;
mod tcp;

pub use common::frame::Frame;
pub use exception::ExceptionCode;
