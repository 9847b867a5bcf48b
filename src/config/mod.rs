//! Configuration module for starql.
//!
//! Handles dialect selection, physical naming conventions and the store
//! location.

mod settings;

pub use settings::{
    expand_env_vars, QuerySettings, SchemaSettings, Settings, SettingsError, StoreSettings,
};
