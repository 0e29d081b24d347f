//! Configuration module for the contact indexer.

pub mod dependencies;
pub mod settings;

pub use dependencies::Dependencies;
pub use settings::Settings;
