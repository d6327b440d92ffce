pub mod action;
pub mod admin;
pub mod catalog;
pub mod config;
pub mod deposit;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod probe;
pub mod router;
pub mod runner;
pub mod session;
pub mod store;
pub mod transport;
pub mod validate;
pub mod workflow;
