pub mod catalog;
pub mod config;
pub mod engine;
pub mod index;
pub mod model;
pub mod notify;
pub mod observability;
pub mod rollover;
pub mod scheduler;
pub mod shell;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod testing;
