pub mod app;
pub mod cli;
pub mod config;
pub mod database;
pub mod enrich;
pub mod form;
pub mod locate;
pub mod map;
pub mod render;
pub mod types;
pub mod utils;
