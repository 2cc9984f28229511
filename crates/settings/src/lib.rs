//! 標題選項的持久化。 / Persistence for caption options.

pub mod keys;
pub mod store;

pub use keys::{apply_update, OptionKey, OptionKeyError};
pub use store::{OptionsStore, OptionsStoreError, StoredOptions, OPTIONS_VERSION};
