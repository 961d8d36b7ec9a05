mod codec;
mod detection;
mod detector;
mod model;
mod render;
mod routes;
mod server;

pub mod app;
pub mod config;

pub use app::start_app;
