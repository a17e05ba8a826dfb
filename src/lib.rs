//! Justitia - legal forum, chatbot and identity service
//!
//! This library provides the core functionality behind the Justitia server.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
