pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod mail;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;
