pub mod clock;
pub mod cloudwatch;
pub mod collectors;
pub mod config;
pub mod errors;
pub mod graph;
pub mod plugin;
pub mod reporter;
