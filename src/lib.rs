#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![deny(unexpected_cfgs)]

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod logging;
pub mod metrics;
pub mod server;
pub(crate) mod datasource;
