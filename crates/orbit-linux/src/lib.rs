// Linux/Ubuntu implementations

#[cfg(target_os = "linux")]
pub mod runner;

#[cfg(target_os = "linux")]
pub mod sampler;

#[cfg(target_os = "linux")]
pub mod metrics;

#[cfg(target_os = "linux")]
pub mod packages;

#[cfg(target_os = "linux")]
pub mod services;

#[cfg(target_os = "linux")]
pub mod network;

#[cfg(target_os = "linux")]
pub mod users;

#[cfg(target_os = "linux")]
pub mod logs;

#[cfg(target_os = "linux")]
pub mod config_files;

#[cfg(all(test, target_os = "linux"))]
mod testing;
