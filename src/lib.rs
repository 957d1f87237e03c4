pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod health;
pub mod json;
pub mod mailer;
pub mod memory;
pub mod metrics;
pub mod middleware;
pub mod movies;
pub mod permissions;
pub mod state;
pub mod users;
pub mod validation;
