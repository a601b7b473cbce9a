mod routes;

pub mod app;
pub mod assistant;
pub mod codec;
pub mod config;
pub mod server;
pub mod session;
pub mod telemetry;

pub use app::start_app;
