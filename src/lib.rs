pub mod app;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod interaction;
pub mod runner;
pub mod runtime;
pub mod shared;
pub mod store;
