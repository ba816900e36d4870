// Library interface for the binary and the integration tests

pub mod auth;
pub mod backend;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod db;
pub mod editor;
pub mod error;
pub mod hosted;
pub mod list_view;
pub mod local;
pub mod media;
pub mod model;
pub mod relocate;
pub mod repository;
pub mod resources;
pub mod schema;
pub mod serve;

pub mod queries {
    pub mod ddl;
    pub mod metadata;
    pub mod records;
}

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
pub use error::{AdminError, Result};
