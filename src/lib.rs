#[cfg(feature = "api")]
pub mod api;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hosts;
pub mod repository;
pub mod tasks;
pub mod util;
pub mod worker;
