// src/collab/mod.rs

//! Contracts for external collaborators and the task operations built on
//! them. Implementations live with the caller; these modules only fix the
//! shape of the exchange.

pub mod database;
pub mod exchange;
pub mod resource;

pub use database::{
    Database, DatabaseFetch, DatabaseRefetch, DatabaseWrite, Identifiable, Identifier, StoreError,
    save_changes,
};
pub use exchange::{
    Exchange, ExchangeError, Fetched, Method, Request, Responder, Response, Transport, decode,
};
pub use resource::{InitializeResource, LoadDone, ResourceLoader, ResourceRegistry};
