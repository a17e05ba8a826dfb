//! Database layer
//!
//! Persistence for the forum, chatbot and identity stores. SQLite is the
//! default backend; MySQL is selected through configuration.
//!
//! Repositories hold a [`DynDatabasePool`] and dispatch on
//! [`DatabasePool::backend`] to run the same query against either driver.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
