#![doc = "edition-courier-core: core logic library for edition-courier."]

//! This crate contains all data models, collaborator contracts and pipeline
//! logic for the courier: publication reconciliation, edition
//! deduplication, delivery preference resolution, archive upload policy and
//! the run orchestrator. Network transports and the CLI are not included
//! here.
//!
//! # Usage
//! Add this as a dependency for all shared pipeline, store and contract
//! code. Collaborator mocks are exported behind the `test-export-mocks`
//! feature for integration testing.

pub mod archive;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod model;
pub mod orchestrate;
pub mod preference;
pub mod reconcile;
pub mod store;
