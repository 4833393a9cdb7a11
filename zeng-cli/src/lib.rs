pub mod app;
pub mod telemetry;
pub mod ticker;

pub use app::run as run_app;
