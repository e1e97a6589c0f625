pub mod accounting;
pub mod api;
pub mod clock;
pub mod config;
pub mod driver;
pub mod lifecycle;
pub mod server;
pub mod signals;
pub mod telemetry;
