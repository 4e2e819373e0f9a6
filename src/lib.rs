//! Core library for the takedown-observer service.
//!
//! Clients report accounts they have seen taken down; the library validates
//! those reports, folds them into one record per account and serves the
//! aggregate for browsing and export. Input checks live in
//! [`takedown::observer::validation`], the dedup/merge rules in
//! [`takedown::observer::aggregate`], persistence in
//! [`takedown::observer::store`], read paths in [`takedown::observer::query`]
//! and [`takedown::observer::export`], and the HTTP surface in
//! [`takedown::observer::api`] and [`takedown::observer::server`].

pub mod takedown;

pub use takedown::observer::{
    ObserverError, Rejection, Result, aggregate, api, config, error, export, logging, model, query,
    server, store, validation,
};
