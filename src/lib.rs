pub mod analysis;
pub mod audio;
pub mod config;
pub mod db;
pub mod quantum;

/// Application name for XDG paths
pub const APP_NAME: &str = "splicer";
