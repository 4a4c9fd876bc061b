pub mod csv_transfer;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod store;
