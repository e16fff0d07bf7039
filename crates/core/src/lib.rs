//! Core value types and error taxonomy shared by every Conduit data-plane crate.
//!
//! This crate supplies the building blocks every protocol adapter and the
//! scheme rendering engine depend on:
//!
//! - [`PointValue`], the printable-string-or-array value that crosses every
//!   module boundary.
//! - [`GatewayError`], the closed error taxonomy that every adapter converts
//!   its protocol-specific failures into.
//! - Small parsing helpers shared by more than one adapter's point-id syntax.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod error;
pub mod parsing;
pub mod value;

pub use error::GatewayError;
pub use value::PointValue;
