mod store;
mod types;

pub use store::{FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use types::{SettingKey, SettingValue, KEY_PREFIX};
