pub mod client;
pub mod config;
pub mod contracts;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod router;
pub mod services;
