pub mod config;
pub mod crawler;
pub mod http_client;
pub mod normalizer;
pub mod parser;
pub mod render;
pub mod writer;
