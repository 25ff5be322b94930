pub mod activities;
pub mod auth;
pub mod backup;
pub mod bills;
pub mod config;
pub mod constants;
pub mod database;
pub mod models;
pub mod recharges;
pub mod settlement;
pub mod utils;
