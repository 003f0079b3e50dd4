pub mod filters;
pub mod mapper;
pub mod models;
pub mod monitor;
pub mod settings;
