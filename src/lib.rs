#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod import;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod paapi;
pub mod reconcile;
pub mod server;
pub mod signing;
pub mod store;
pub mod taxonomy;
pub mod throttle;
