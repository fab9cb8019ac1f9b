pub mod cache;
pub mod config;
pub mod fetch;
pub mod model;
pub mod registry;
pub mod sources;
