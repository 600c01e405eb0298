pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod portfolio;
pub mod quotes;
pub mod scorer;
pub mod state;
pub mod types;
