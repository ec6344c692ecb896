// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod api;
pub mod store;
pub mod ledger;
pub mod protocol;
pub mod generation;
pub mod coordinator;
pub mod verifier;
pub mod scheduler;
pub mod network;
pub mod server;
