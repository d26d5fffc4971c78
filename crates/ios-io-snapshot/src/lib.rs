//! Deterministic save-state encoding for IOS HLE devices.

pub mod io;
