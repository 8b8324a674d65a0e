// Configuration loading

pub mod settings;

pub use settings::{ConfigError, OutputSettings, RenderSettings, Settings};
