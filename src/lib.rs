pub mod app;
pub mod auth;
pub mod backend;
pub mod conversation;
pub mod errors;
pub mod issues;
pub mod loader;
pub mod logging;
pub mod models;
pub mod segment;
pub mod session;
