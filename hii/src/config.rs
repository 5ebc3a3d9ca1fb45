//! Runtime configuration for a [`Database`](crate::Database)

use alloc::string::String;
use alloc::sync::Arc;

use crate::form::DefaultValueSource;

/// Namespace prefix of keyword string packages
pub const UEFI_CONFIG_LANG: &str = "x-UEFI";

/// Fallback language for name/value store names
pub const DEFAULT_PLATFORM_LANGUAGE: &str = "en-US";

#[derive(Clone)]
pub struct DatabaseConfig {
    /// Language tried first when resolving name/value store names
    pub platform_language: String,
    /// Source of form default values; the default-setting pass is skipped when unset
    pub defaults: Option<Arc<dyn DefaultValueSource>>,
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform_language(mut self, language: &str) -> Self {
        self.platform_language = language.into();
        self
    }

    pub fn with_defaults(mut self, source: Arc<dyn DefaultValueSource>) -> Self {
        self.defaults = Some(source);
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            platform_language: DEFAULT_PLATFORM_LANGUAGE.into(),
            defaults: None,
        }
    }
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("platform_language", &self.platform_language)
            .field("defaults", &self.defaults.is_some())
            .finish()
    }
}
