//! Keeping the applet in step with the settings registry.
//!
//! [`alarms_dir_changed`] reconciles the alarm list whenever something under the alarms
//! directory changes, and [`watch_settings_file`] turns edits made to the settings file by
//! other processes (the CLI, a text editor) into a reload of the registry.

use std::{
    path::{Path, PathBuf},
    sync::mpsc::Sender,
    time::Duration,
};

use chrono::{DateTime, Local};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::{
    alarm::{self, Alarm},
    communication::{self, AlarmId, Message},
    config::ALARMS_DIR,
    error::{Error, Result},
    settings::{self, SettingsEntry},
    Applet,
};

/// what a change under the alarms directory did to the alarm list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// the key doesn't name an alarm
    Ignored,
    Added(AlarmId),
    Removed(AlarmId),
    /// a key of a known alarm changed, the alarm follows its own keys
    Updated(AlarmId),
    /// removal of an unknown alarm or creation of a known one
    Unchanged(AlarmId),
}

/// react to a change at or under the alarms directory
///
/// Only the first segment after the directory matters: it is the id of the alarm the key
/// belongs to. A change with a value for an unknown id creates that alarm, a removal for a
/// known id deletes it, closing its settings dialog first.
pub fn alarms_dir_changed(
    applet: &mut Applet,
    entry: &SettingsEntry,
    now: DateTime<Local>,
) -> Reconciled {
    log::debug!("alarms dir change: {}", entry.key);

    let Some(id) = settings::child_segment(ALARMS_DIR, &entry.key)
        .ok()
        .and_then(alarm::parse_alarm_id)
    else {
        return Reconciled::Ignored;
    };

    let found = applet.alarms.contains(id);
    match (found, &entry.value) {
        (true, None) => {
            log::debug!("alarm #{id} deleted");
            if applet.ui.settings_dialog.alarm() == Some(id) {
                applet.ui.settings_dialog.close();
            }
            applet.alarms_remove(id, now);
            Reconciled::Removed(id)
        }
        (false, Some(_)) => {
            log::debug!("alarm #{id} added");
            let alarm = Alarm::new(&mut applet.store, ALARMS_DIR, id, applet.sender.clone());
            applet.alarms_add(alarm, now);
            Reconciled::Added(id)
        }
        (true, Some(_)) => Reconciled::Updated(id),
        (false, None) => Reconciled::Unchanged(id),
    }
}

/// keeps the file watcher alive, dropping it stops watching
pub struct SettingsFileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

/// post [`Message::SettingsFileChanged`] whenever the file at `path` changes on disk
///
/// The directory is watched rather than the file so that editors replacing the file
/// don't end the watch.
pub fn watch_settings_file(path: &Path, sender: Sender<Message>) -> Result<SettingsFileWatcher> {
    let file = path.to_path_buf();
    let dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let mut debouncer = new_debouncer(
        Duration::from_millis(250),
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                if events.iter().any(|event| event.path == file) {
                    communication::send(&sender, Message::SettingsFileChanged);
                }
            }
            Err(err) => log::warn!("settings watcher error: {err:?}"),
        },
    )?;
    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)?;
    log::debug!("watching {} for changes", path.display());
    Ok(SettingsFileWatcher {
        _debouncer: debouncer,
    })
}
