pub mod cache;
pub mod comparison;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod resource;
pub mod routes;
pub mod server;
pub mod state;
