//! Domain primitives shared by the storage and HTTP layers.
//!
//! Nothing in this crate performs network or database I/O.

pub mod error;
pub mod otp;
pub mod types;
pub mod users;
