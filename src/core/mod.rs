pub mod command;
pub mod config;
pub mod ledger;
pub mod optimize;
pub mod relay;
pub mod security;
pub mod status;
pub mod terminal;
