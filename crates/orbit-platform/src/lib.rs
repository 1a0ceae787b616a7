//! Host-independent types and adapter traits for the Orbit console.

pub mod command;
pub mod config_files;
pub mod error;
pub mod logs;
pub mod network;
pub mod packages;
pub mod services;
pub mod system_info;
pub mod users;
pub mod validate;
