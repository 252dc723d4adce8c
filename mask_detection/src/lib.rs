pub mod annotator;
pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod formatter;
pub mod frame;
pub mod labels;
pub mod prediction;
pub mod presenter;
pub mod scale;
pub mod server;
pub mod session;
pub mod stream;
pub mod telemetry;

mod routes;

pub use app::{run_image, serve};
