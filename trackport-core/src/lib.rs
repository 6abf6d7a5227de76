//! Conversion of sparse video annotation exports into MOTChallenge
//! sequences.
//!
//! [`core::partition`] splits an export into one unit per source video and
//! [`core::batch`] turns every unit into a sequence directory aligned to the
//! frames extracted from that video.

pub mod core;
pub mod models;
