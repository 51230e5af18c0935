//! The presentational side of the applet.
//!
//! Everything visible is kept as plain state here and drawn by [`crate::gui`]. The
//! handlers that react to alarm signals live on [`Applet`] at the bottom of this file.

use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    alarm::{Alarm, AlarmList, AlarmType},
    communication::{AlarmId, Property},
    config::{self, LabelType, Preferences},
    error::{Error, Result},
    Applet,
};

pub const NOTIFICATION_BODY: &str = "You can snooze or stop alarms from the Alarm Clock menu.";
pub const NO_ALARM_LABEL: &str = "No alarm";

/// icon names and labels, loaded from the interface definition file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiDefinition {
    pub status_icon: String,
    pub alarm_icon: String,
    pub timer_icon: String,
    pub menu: MenuLabels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuLabels {
    pub snooze_all: String,
    pub stop_all: String,
    pub edit_alarms: String,
    pub preferences: String,
    pub about: String,
    pub quit: String,
}

impl Default for UiDefinition {
    fn default() -> Self {
        Self {
            status_icon: "alarm-clock".to_string(),
            alarm_icon: "alarm-clock".to_string(),
            timer_icon: "alarm-timer".to_string(),
            menu: MenuLabels::default(),
        }
    }
}

impl Default for MenuLabels {
    fn default() -> Self {
        Self {
            snooze_all: "Snooze all".to_string(),
            stop_all: "Stop all".to_string(),
            edit_alarms: "Edit alarms".to_string(),
            preferences: "Preferences".to_string(),
            about: "About".to_string(),
            quit: "Quit".to_string(),
        }
    }
}

impl UiDefinition {
    /// load the interface definition, falling back to the built in one
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path, e))
            .and_then(|contents| Ok(toml::from_str(&contents)?));
        match parsed {
            Ok(definition) => definition,
            Err(err) => {
                log::error!("Couldn't load the interface '{}'. {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(path, contents).map_err(|e| Error::io(path, e))
    }

    #[must_use]
    pub fn icon_for(&self, alarm_type: AlarmType) -> &str {
        match alarm_type {
            AlarmType::Clock => &self.alarm_icon,
            AlarmType::Timer => &self.timer_icon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub summary: String,
    pub body: String,
    pub icon: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// somewhere to send desktop notifications
pub trait Notifier {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// notifications through the desktop notification daemon
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        notify_rust::Notification::new()
            .appname(config::APP_NAME)
            .summary(&notification.summary)
            .body(&notification.body)
            .icon(&notification.icon)
            .show()
            .map(drop)
            .map_err(|e| NotifyError(e.to_string()))
    }
}

/// a blocking error message box
pub trait ErrorDialog {
    fn show_error(&self, message: &str, secondary: Option<&str>);
}

#[derive(Debug, Default)]
pub struct RfdErrorDialog;

impl ErrorDialog for RfdErrorDialog {
    fn show_error(&self, message: &str, secondary: Option<&str>) {
        let description = secondary.map_or_else(
            || message.to_string(),
            |secondary| format!("{message}\n\n{secondary}"),
        );
        rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Error)
            .set_title(config::APP_NAME)
            .set_description(description)
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusIcon {
    pub visible: bool,
    pub blinking: bool,
    pub tooltip: String,
    /// text shown next to the icon, `None` when hidden
    pub label: Option<String>,
    pub menu_visible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggle {
    pub sensitive: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actions {
    pub snooze_all: bool,
    pub stop_all: bool,
    /// mirrors whether the list window is shown
    pub toggle_list_window: bool,
    /// enable/disable the alarm selected in the list
    pub alarm_enabled: Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: AlarmId,
    pub alarm_type: AlarmType,
    pub time: String,
    pub remaining: Option<String>,
    pub message: String,
    pub active: bool,
    pub triggered: bool,
}

impl ListRow {
    #[must_use]
    pub fn new(alarm: &Alarm, now: DateTime<Local>) -> Self {
        Self {
            id: alarm.id,
            alarm_type: alarm.alarm_type,
            time: alarm.alarm_time().format("%H:%M:%S").to_string(),
            remaining: alarm
                .active
                .then(|| format_remaining(alarm.remaining(now))),
            message: alarm.message.clone(),
            active: alarm.active,
            triggered: alarm.triggered,
        }
    }
}

fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

#[derive(Debug, Default)]
pub struct ListWindow {
    pub visible: bool,
    pub rows: Vec<ListRow>,
    pub selected: Option<AlarmId>,
    /// asked to be raised above other windows
    pub present_requested: bool,
}

impl ListWindow {
    pub fn show(&mut self, alarms: &AlarmList, now: DateTime<Local>) {
        self.reload(alarms, now);
        if self.visible {
            self.present_requested = true;
        }
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn reload(&mut self, alarms: &AlarmList, now: DateTime<Local>) {
        self.rows = alarms.iter().map(|a| ListRow::new(a, now)).collect();
    }

    pub fn add_row(&mut self, alarm: &Alarm, now: DateTime<Local>) {
        self.rows.push(ListRow::new(alarm, now));
    }

    pub fn remove_row(&mut self, id: AlarmId) {
        self.rows.retain(|row| row.id != id);
        if self.selected == Some(id) {
            self.selected = None;
        }
    }

    pub fn update_row(&mut self, alarm: &Alarm, now: DateTime<Local>) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.id == alarm.id) {
            *row = ListRow::new(alarm, now);
        }
    }
}

/// the settings dialog edits one alarm at a time
#[derive(Debug, Default)]
pub struct SettingsDialog {
    alarm: Option<AlarmId>,
}

impl SettingsDialog {
    #[must_use]
    pub const fn alarm(&self) -> Option<AlarmId> {
        self.alarm
    }

    pub fn show(&mut self, id: AlarmId) {
        self.alarm = Some(id);
    }

    pub fn close(&mut self) {
        if let Some(id) = self.alarm.take() {
            log::debug!("closing settings dialog of alarm #{id}");
        }
    }
}

#[derive(Debug, Default)]
pub struct PreferencesDialog {
    pub visible: bool,
    /// preferences as edited, written back on apply
    pub draft: Preferences,
}

#[derive(Debug, Default)]
pub struct AboutDialog {
    pub visible: bool,
    pub program_name: String,
    pub title: String,
    pub version: String,
    pub present_requested: bool,
}

#[derive(Debug, Default)]
pub struct Ui {
    pub definition: UiDefinition,
    pub status_icon: StatusIcon,
    pub actions: Actions,
    pub list_window: ListWindow,
    pub settings_dialog: SettingsDialog,
    pub preferences_dialog: PreferencesDialog,
    pub about_dialog: AboutDialog,
}

impl Ui {
    #[must_use]
    pub fn new(definition: UiDefinition) -> Self {
        Self {
            definition,
            status_icon: StatusIcon {
                visible: true,
                ..StatusIcon::default()
            },
            ..Self::default()
        }
    }

    pub fn update_status(&mut self, n_triggered: u32) {
        self.status_icon.blinking = n_triggered > 0;
    }

    pub fn update_sensitive(&mut self, n_triggered: u32) {
        self.actions.snooze_all = n_triggered > 0;
        self.actions.stop_all = n_triggered > 0;
    }

    /// the enable toggle follows the alarm selected in the list
    pub fn update_enabled(&mut self, alarms: &AlarmList) {
        let selected = self.list_window.selected.and_then(|id| alarms.find(id));
        self.actions.alarm_enabled = match selected {
            Some(alarm) => Toggle {
                sensitive: true,
                active: alarm.active,
            },
            None => Toggle::default(),
        };
    }

    pub fn update_tooltip(&mut self, alarms: &AlarmList, now: DateTime<Local>) {
        self.status_icon.tooltip = tooltip(alarms, now);
    }

    pub fn update_label(
        &mut self,
        alarms: &AlarmList,
        preferences: Preferences,
        now: DateTime<Local>,
    ) {
        self.status_icon.label = preferences
            .show_label
            .then(|| label(alarms, preferences.label_type, now));
    }
}

/// summary of the active alarms, in pango markup
#[must_use]
pub fn tooltip(alarms: &AlarmList, now: DateTime<Local>) -> String {
    let mut tip = String::new();
    let mut count = 0;
    for alarm in alarms.iter().filter(|a| a.active) {
        count += 1;
        tip.push_str(&format!(
            "\n({}) <b>{}</b> @{} (-{})",
            alarm.alarm_type.letter(),
            alarm.message,
            alarm.alarm_time().format("%H:%M:%S"),
            format_remaining(alarm.remaining(now)),
        ));
    }
    if count > 0 {
        tip.insert_str(0, "Active alarms:");
    } else {
        tip.push_str("No active alarms");
    }
    tip.push_str("\n\nClick to snooze alarms");
    tip.push_str("\nDouble click to edit alarms");
    tip
}

/// the label for the alarm going off next
#[must_use]
pub fn label(alarms: &AlarmList, label_type: LabelType, now: DateTime<Local>) -> String {
    alarms
        .iter()
        .filter(|a| a.active)
        .min_by_key(|a| a.timestamp)
        .map_or_else(
            || NO_ALARM_LABEL.to_string(),
            |alarm| match label_type {
                LabelType::AlarmTime => alarm.alarm_time().format("%H:%M:%S").to_string(),
                LabelType::RemainingTime => format_remaining(alarm.remaining(now)),
            },
        )
}

// signal handlers
impl Applet {
    /// a property of an alarm changed, update whatever shows it
    pub(crate) fn alarm_changed(&mut self, id: AlarmId, property: Property, now: DateTime<Local>) {
        let Some(alarm) = self.alarms.find(id) else {
            return;
        };
        log::debug!("alarm '{}' {} changed", alarm.message, property.name());

        if property == Property::Active {
            self.ui.update_enabled(&self.alarms);
        }
        if self.ui.list_window.visible {
            self.ui.list_window.update_row(alarm, now);
        }
        if self.ui.settings_dialog.alarm() == Some(id) {
            // the open dialog keeps what the user is typing
            log::debug!("settings dialog of alarm #{id} left as is");
        }
        self.refresh_status(now);
    }

    pub(crate) fn alarm_triggered(&mut self, id: AlarmId, now: DateTime<Local>) {
        self.n_triggered += 1;
        if let Some(alarm) = self.alarms.find(id) {
            log::debug!("alarm '{}' triggered", alarm.message);
            let notification = Notification {
                summary: alarm.message.clone(),
                body: NOTIFICATION_BODY.to_string(),
                icon: self.ui.definition.icon_for(alarm.alarm_type).to_string(),
            };
            let sound = alarm.sound_file.clone().map(|path| (path, alarm.sound_loop));
            self.notification_show(&notification);
            if let Some((path, looped)) = sound {
                self.play_sound(id, path, looped);
            }
            if let Some(alarm) = self.alarms.find(id) {
                self.ui.list_window.update_row(alarm, now);
            }
        }
        self.ui.update_status(self.n_triggered);
        self.ui.update_sensitive(self.n_triggered);
    }

    pub(crate) fn alarm_cleared(&mut self, id: AlarmId, now: DateTime<Local>) {
        log::debug!("alarm #{id} cleared");
        match self.n_triggered.checked_sub(1) {
            Some(n) => self.n_triggered = n,
            None => log::warn!("alarm #{id} cleared while nothing was triggered"),
        }
        self.stop_sound(id);
        if let Some(alarm) = self.alarms.find(id) {
            self.ui.list_window.update_row(alarm, now);
        }
        self.ui.update_status(self.n_triggered);
        self.ui.update_sensitive(self.n_triggered);
    }

    pub(crate) fn notification_show(&self, notification: &Notification) {
        if let Err(err) = self.notifier.show(notification) {
            log::warn!("Failed to send notification: {err}");
        }
    }

    /// an alarm sound couldn't be played
    pub(crate) fn media_player_error(&self, uri: &str, message: &str) {
        log::error!("Could not play '{uri}': {message}");
        self.error_dialog
            .show_error("Could not play", Some(&format!("{uri}: {message}")));
    }

    pub(crate) fn refresh_status(&mut self, now: DateTime<Local>) {
        self.ui.update_tooltip(&self.alarms, now);
        self.ui.update_label(&self.alarms, self.preferences, now);
    }

    /// left click on the status icon
    pub fn status_activate(&mut self, now: DateTime<Local>) {
        if self.n_triggered > 0 {
            self.snooze_all(now);
        } else {
            self.toggle_list_window(now);
        }
    }

    /// right click on the status icon
    pub fn status_popup(&mut self) {
        self.ui.status_icon.menu_visible = true;
    }

    pub fn menu_edit(&mut self, now: DateTime<Local>) {
        self.ui.status_icon.menu_visible = false;
        if self.ui.actions.toggle_list_window {
            self.ui.list_window.show(&self.alarms, now);
        } else {
            self.set_list_window_visible(true, now);
        }
    }

    pub fn menu_preferences(&mut self) {
        self.ui.status_icon.menu_visible = false;
        self.ui.preferences_dialog.draft = self.preferences;
        self.ui.preferences_dialog.visible = true;
    }

    pub fn menu_about(&mut self) {
        self.ui.status_icon.menu_visible = false;
        let about = &mut self.ui.about_dialog;
        if about.visible {
            about.present_requested = true;
        } else {
            about.program_name = config::APP_NAME.to_string();
            about.title = format!("About {}", config::APP_NAME);
            about.version = env!("CARGO_PKG_VERSION").to_string();
            about.visible = true;
        }
    }

    pub fn toggle_list_window(&mut self, now: DateTime<Local>) {
        let visible = !self.ui.actions.toggle_list_window;
        self.set_list_window_visible(visible, now);
    }

    pub fn set_list_window_visible(&mut self, visible: bool, now: DateTime<Local>) {
        self.ui.actions.toggle_list_window = visible;
        if visible {
            self.ui.list_window.show(&self.alarms, now);
        } else {
            self.ui.list_window.hide();
        }
    }

    pub fn select_alarm(&mut self, id: Option<AlarmId>) {
        self.ui.list_window.selected = id.filter(|id| self.alarms.contains(*id));
        self.ui.update_enabled(&self.alarms);
    }
}
