//! Container settings.
//!
//! Settings can be built in code or deserialized from whatever
//! configuration the application already loads:
//!
//! ```
//! use sanduq_container::settings::ContainerSettings;
//!
//! let settings = ContainerSettings::default().allow_override(true);
//! assert!(settings.allow_override);
//! assert!(settings.close_on_drop);
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Let a second registration for a key replace the first instead of
    /// failing with `AlreadyRegistered`.
    pub allow_override: bool,

    /// Close a [`SyncContext`](crate::context::SyncContext)'s store when it
    /// is dropped. Release failures are logged, not returned.
    pub close_on_drop: bool,
}

impl ContainerSettings {
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    pub fn close_on_drop(mut self, close: bool) -> Self {
        self.close_on_drop = close;
        self
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_override: false,
            close_on_drop: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: ContainerSettings = serde_json::from_str(r#"{"allow_override": true}"#).unwrap();
        assert_eq!(
            settings,
            ContainerSettings {
                allow_override: true,
                close_on_drop: true,
            }
        );
    }

    #[test]
    fn empty_object_is_default() {
        let settings: ContainerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ContainerSettings::default());
    }
}
