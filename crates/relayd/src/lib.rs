//! ctaphid-relayd
//!
//! A privileged local bridge for CTAPHID authentication devices (hardware
//! security keys). The daemon listens on a secured local endpoint, answers
//! device enumeration queries, and relays raw HID reports bidirectionally
//! between a caller and one device per session.
//!
//! The binary lives in `main.rs`; the library target exists so the bridging
//! runtime can be exercised by the crate's integration tests with fake
//! device backends and in-memory connections.

pub mod config;
pub mod hid;
pub mod network;
pub mod service;
