pub mod api;
pub mod certificate;
pub mod cli;
pub mod error;
pub mod limiters;
pub mod network;
pub mod persistence;
pub mod settings;
