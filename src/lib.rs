pub mod address;
pub mod boundaries;
pub mod config;
pub mod distance;
pub mod error;
pub mod fetch;
pub mod geocode;
pub mod map_layers;
pub mod pipeline;
pub mod records;
pub mod summary;
