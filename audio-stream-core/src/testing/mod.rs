//! Test doubles for code built on top of this crate.

pub mod mock_driver;

pub use mock_driver::{DriverCall, MockDriver, MockStream};
