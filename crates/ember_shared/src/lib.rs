//! # EMBER Shared
//!
//! Math types shared by every EMBER crate.
//!
//! ## CRITICAL RULE
//!
//! This crate holds plain data only. Anything that owns engine state
//! (pools, timers, scene nodes) belongs in `ember_core` or `ember_vfx`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod math;

pub use math::{Quaternion, Transform, Vec3};
