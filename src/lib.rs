pub mod detection;
pub mod download;
pub mod executor;
pub mod ipc;
pub mod models;
pub mod updaters;
pub mod utils;
