pub mod config;
pub mod errors;
pub mod lock;
pub mod logging;
