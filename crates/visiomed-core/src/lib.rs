//! Core types and trait definitions for the VisioMed billing back office.
//!
//! This crate has no HTTP or database dependencies. It owns
//! the domain model, the store traits, and the pure decision logic: tariff
//! resolution, the identity model, the authorization gate, audit capture and
//! financial aggregation.

// Native `async fn` in traits; implementors return `Send` futures explicitly.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod authz;
pub mod billing;
pub mod error;
pub mod export;
pub mod identity;
pub mod patch;
pub mod reference;
pub mod report;
pub mod role;
pub mod store;
pub mod tariff;

pub use error::{Error, Result};
