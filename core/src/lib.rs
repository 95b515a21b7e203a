pub mod cache;
pub mod dates;
pub mod models;
pub mod normalize;
pub mod router;
pub mod service;
pub mod stats;
