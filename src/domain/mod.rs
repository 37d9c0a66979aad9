//! Core domain types and logic.

pub mod error;
pub mod indicator_row;
pub mod regime;
pub mod position;
pub mod vote;
pub mod consensus;
pub mod exit;
pub mod ledger;
pub mod metrics;
pub mod replay;
pub mod strategy;
pub mod engine;
