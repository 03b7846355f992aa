pub mod account;
pub mod config;
pub mod document;
pub mod error;
pub mod guard;
pub mod interaction;
pub mod ledger;
pub mod network;
pub mod orchestrator;
pub mod records;
pub mod selector;
pub mod storage;

#[cfg(test)]
mod testing;
