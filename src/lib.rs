pub mod app;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod index;
pub mod output;
pub mod plan;
pub mod registry;
pub mod regrid;
pub mod store;
pub mod template;
pub mod worker;
