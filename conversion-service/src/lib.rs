pub mod config;
pub mod converters;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
