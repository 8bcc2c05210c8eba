//! # EMBER
//!
//! Host-side integration of the effect engine.
//!
//! ## Crates
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ ember_shared │────>│  ember_core  │────>│  ember_vfx   │
//! │  math types  │     │ pools/timers │     │ registry and │
//! └──────────────┘     └──────────────┘     │  directors   │
//!                                           └──────┬───────┘
//!                                                  v
//!                                           ┌──────────────┐
//!                                           │    ember     │
//!                                           │  FxLoop/demo │
//!                                           └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - `game_loop`: frame orchestration and statistics

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod game_loop;

pub use ember_core as core;
pub use ember_shared as shared;
pub use ember_vfx as vfx;

pub use game_loop::{EventTally, FrameStats, FrameStatsAccumulator, FxLoop};
