use std::path::PathBuf;

use crate::{
    error::{Error, Result},
    settings::SettingsStore,
};

/// root of everything the applet keeps in the settings registry
pub const APPLET_DIR: &str = "/apps/alarm-clock";
/// every child of this directory is an alarm, named by its id
pub const ALARMS_DIR: &str = "/apps/alarm-clock/alarms";

pub const KEY_SHOW_LABEL: &str = "/apps/alarm-clock/show_label";
pub const KEY_LABEL_TYPE: &str = "/apps/alarm-clock/label_type";

pub const APP_NAME: &str = "Alarm Clock";
pub const UI_FILE: &str = "alarm-clock.ui.toml";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "alarm-clock").ok_or(Error::NoProjectDirs)
}

pub fn settings_path() -> Result<PathBuf> {
    let mut path = project_dirs()?.config_dir().to_path_buf();
    path.push("settings.toml");
    Ok(path)
}

pub fn data_path(name: &str) -> Result<PathBuf> {
    let mut path = project_dirs()?.data_dir().to_path_buf();
    path.push(name);
    Ok(path)
}

pub fn sounds_path() -> Result<PathBuf> {
    data_path("sounds")
}

#[must_use]
pub fn is_settings_present() -> bool {
    settings_path().is_ok_and(|path| path.exists())
}

/// what the status label next to the icon shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelType {
    #[default]
    AlarmTime,
    RemainingTime,
}

impl LabelType {
    #[must_use]
    pub const fn as_setting(self) -> &'static str {
        match self {
            Self::AlarmTime => "alarm-time",
            Self::RemainingTime => "remaining-time",
        }
    }

    /// unknown values fall back to the default
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        match value {
            "alarm-time" => Self::AlarmTime,
            "remaining-time" => Self::RemainingTime,
            other => {
                log::debug!("unknown label type {other:?}, using default");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub show_label: bool,
    pub label_type: LabelType,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_label: true,
            label_type: LabelType::default(),
        }
    }
}

impl Preferences {
    /// read the preferences, anything missing or of the wrong type keeps its default
    #[must_use]
    pub fn load(store: &SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            show_label: store
                .get_bool(KEY_SHOW_LABEL)
                .unwrap_or(defaults.show_label),
            label_type: store
                .get_string(KEY_LABEL_TYPE)
                .map_or(defaults.label_type, LabelType::from_setting),
        }
    }

    pub fn save(self, store: &mut SettingsStore) {
        store.set(KEY_SHOW_LABEL, self.show_label);
        store.set(KEY_LABEL_TYPE, self.label_type.as_setting());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_default_when_missing_or_mistyped() {
        let mut store = SettingsStore::new();
        assert_eq!(Preferences::load(&store), Preferences::default());

        store.set(KEY_SHOW_LABEL, "yes");
        store.set(KEY_LABEL_TYPE, "seconds");
        assert_eq!(Preferences::load(&store), Preferences::default());
    }

    #[test]
    fn preferences_round_trip_through_store() {
        let mut store = SettingsStore::new();
        let prefs = Preferences {
            show_label: false,
            label_type: LabelType::RemainingTime,
        };
        prefs.save(&mut store);
        assert_eq!(store.get_string(KEY_LABEL_TYPE), Some("remaining-time"));
        assert_eq!(Preferences::load(&store), prefs);
    }
}
