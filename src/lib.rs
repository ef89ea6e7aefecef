#![forbid(unsafe_code)]

pub mod app;
pub mod challenge;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod logging;
pub mod model;
pub mod next_link;
pub mod render;
pub mod store;
