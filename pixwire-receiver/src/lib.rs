//! # pixwire-receiver
//!
//! Runs the image pipeline behind a TCP listener and drains it with a
//! headless render loop. Also ships a `send` mode that streams image files
//! to a receiver, for testing a link end to end.
//!
//! ## Modes
//!
//! - **Receive** (default): listen, decode, render, log stats.
//! - **Send**: stream JPEG, LZ4 or RAW files at a fixed frame rate.

pub mod config;
pub mod render;
pub mod sender;
