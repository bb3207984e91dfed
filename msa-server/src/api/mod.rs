//! HTTP API handlers

pub mod download;
pub mod health;
pub mod housekeeping;
pub mod progress;
pub mod upload;

pub use download::download_routes;
pub use health::health_routes;
pub use housekeeping::housekeeping_routes;
pub use progress::progress_routes;
pub use upload::upload_routes;
