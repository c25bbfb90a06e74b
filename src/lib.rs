pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod lock;
pub mod ports;
pub mod queue;
pub mod resilience;
pub mod services;
pub mod startup;
pub mod utils;
