mod routes;

pub mod app;
pub mod config;

pub use app::start_app;
