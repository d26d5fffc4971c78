pub mod ipc;
pub mod state;
