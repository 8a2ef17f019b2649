//! Chest X-ray pneumonia classifier: ResNet-18 inference core plus a thin
//! actix-web adapter.

pub mod classifier;
pub mod config;
pub mod routes;

pub use classifier::{Classifier, Pipeline};
pub use config::AppConfig;
