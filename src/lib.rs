pub mod app;
pub mod auth;
pub mod config;
pub mod costs;
pub mod error;
pub mod gateway;
pub mod state;
pub mod store;
pub mod users;
