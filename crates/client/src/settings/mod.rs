pub mod state;

pub use state::{ClientSettings, GatewaySettings, SettingsError, SettingsStore, TypingSettings};
