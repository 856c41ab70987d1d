pub mod clock;
pub mod config;
pub mod metrics;
pub mod pki;
pub mod server;
pub mod shutdown;
pub mod telemetry;
