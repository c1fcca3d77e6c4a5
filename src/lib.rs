pub mod config;
pub mod db;
pub mod error;
pub mod log;
pub mod managers;
pub mod notice;
pub mod pages;
pub mod server;
pub mod services;
