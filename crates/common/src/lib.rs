//! Logging initialization and configuration-loading plumbing shared across
//! the Conduit gateway's crates.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod config;
pub mod logging;
