pub mod api;
pub mod config;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod source;
pub mod storage;
pub mod transfer;
