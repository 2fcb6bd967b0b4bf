pub mod admin;
pub mod comments;
pub mod config;
pub mod debounce;
pub mod docstore;
pub mod errors;
pub mod favorites;
pub mod football_api;
pub mod http_cache;
pub mod http_client;
pub mod leaderboard;
pub mod local_store;
pub mod navigation;
pub mod news;
pub mod predictions;
pub mod provider;
pub mod proxy;
pub mod rules;
pub mod session_cache;
pub mod state;
