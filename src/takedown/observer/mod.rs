pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod model;
pub mod query;
pub mod server;
pub mod store;
pub mod validation;

pub use error::{ObserverError, Rejection, Result};
