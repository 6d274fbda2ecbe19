#[macro_use]
extern crate serde_derive;

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;
