pub mod chaos;
pub mod config;
pub mod handler;
pub mod honk;
pub mod mood;
pub mod persistence;
pub mod provocation;
pub mod runtime;
pub mod sampling;
pub mod state;
pub mod timers;
pub mod types;
