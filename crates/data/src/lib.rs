//! The pluggable multi-protocol data-module abstraction, the module
//! registry and request dispatch, and the generic Change-of-Value
//! subscription fan-out every module with COV support builds on.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod controller;
pub mod module;
pub mod subscription;

pub use controller::DataController;
pub use module::{CovCallback, DataModule};
pub use subscription::SubscriptionTable;
