#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

use std::{
    path::PathBuf,
    sync::mpsc::{channel, Receiver, Sender},
};

use alarm::{Alarm, AlarmList, AlarmType};
use chrono::{DateTime, Local};
use communication::{AlarmId, Message};
use config::{Preferences, ALARMS_DIR};
use settings::{ListenerId, SettingsStore};
use ui::{ErrorDialog, Notifier, Ui, UiDefinition};

pub mod alarm;
/// implementation of alarm editing for egui
pub mod alarm_edit;
pub mod communication;
pub mod config;
pub mod error;
pub mod gui;
pub mod settings;
pub mod sound;
pub mod ui;
pub mod watcher;

/// everything the applet owns, handed to every handler
pub struct Applet {
    store: SettingsStore,
    alarms: AlarmList,
    /// alarms ringing and waiting to be snoozed or stopped
    n_triggered: u32,
    preferences: Preferences,
    pub ui: Ui,
    notifier: Box<dyn Notifier>,
    error_dialog: Box<dyn ErrorDialog>,
    player: Option<Sender<sound::Command>>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    alarms_listener: Option<ListenerId>,
    preferences_listeners: Vec<ListenerId>,
}

impl Applet {
    #[must_use]
    pub fn new(
        store: SettingsStore,
        notifier: Box<dyn Notifier>,
        error_dialog: Box<dyn ErrorDialog>,
        definition: UiDefinition,
    ) -> Self {
        let (sender, receiver) = channel();
        Self {
            preferences: Preferences::load(&store),
            store,
            alarms: AlarmList::new(),
            n_triggered: 0,
            ui: Ui::new(definition),
            notifier,
            error_dialog,
            player: None,
            sender,
            receiver,
            alarms_listener: None,
            preferences_listeners: Vec::new(),
        }
    }

    /// a handle for anything outside the event loop that wants to post to it
    #[must_use]
    pub fn sender(&self) -> Sender<Message> {
        self.sender.clone()
    }

    pub fn set_player(&mut self, player: Sender<sound::Command>) {
        self.player = Some(player);
    }

    /// subscribe to the registry and load the alarms already in it
    pub fn start(&mut self, now: DateTime<Local>) {
        if self.alarms_listener.is_some() {
            return;
        }
        self.alarms_listener = Some(self.store.notify_add(ALARMS_DIR, self.sender.clone()));
        for key in [config::KEY_SHOW_LABEL, config::KEY_LABEL_TYPE] {
            let listener = self.store.notify_add(key, self.sender.clone());
            self.preferences_listeners.push(listener);
        }

        for id in alarm::stored_ids(&self.store, ALARMS_DIR) {
            let alarm = Alarm::new(&mut self.store, ALARMS_DIR, id, self.sender.clone());
            self.alarms_add(alarm, now);
        }
        log::debug!("started with {} alarms", self.alarms.len());
        self.refresh_status(now);
    }

    /// unsubscribe, silence everything and persist the registry
    pub fn stop(&mut self) -> error::Result<()> {
        if let Some(listener) = self.alarms_listener.take() {
            self.store.notify_remove(listener);
        }
        for listener in self.preferences_listeners.drain(..) {
            self.store.notify_remove(listener);
        }
        let mut ringing = Vec::new();
        for alarm in self.alarms.iter_mut() {
            alarm.unbind(&mut self.store);
            if alarm.triggered {
                ringing.push(alarm.id);
            }
        }
        for id in ringing {
            self.stop_sound(id);
        }
        self.store.save()
    }

    #[must_use]
    pub const fn alarms(&self) -> &AlarmList {
        &self.alarms
    }

    #[must_use]
    pub const fn store(&self) -> &SettingsStore {
        &self.store
    }

    #[must_use]
    pub const fn n_triggered(&self) -> u32 {
        self.n_triggered
    }

    #[must_use]
    pub const fn preferences(&self) -> Preferences {
        self.preferences
    }

    /// an alarm together with the registry it writes through to
    pub fn alarm_mut(&mut self, id: AlarmId) -> Option<(&mut Alarm, &mut SettingsStore)> {
        let alarm = self.alarms.find_mut(id)?;
        Some((alarm, &mut self.store))
    }

    pub fn save(&mut self) -> error::Result<()> {
        self.store.save()
    }

    /// write the registry out if anything changed since it was last written or read
    pub fn save_if_changed(&mut self) {
        if self.store.is_dirty() {
            if let Err(err) = self.store.save() {
                log::error!("couldn't save settings: {err}");
            }
        }
    }

    /// handle everything posted so far, including what handling it posts
    pub fn process_pending(&mut self, now: DateTime<Local>) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.dispatch(message, now);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, message: Message, now: DateTime<Local>) {
        match message {
            Message::ConfigChanged { listener, entry } => {
                if Some(listener) == self.alarms_listener {
                    watcher::alarms_dir_changed(self, &entry, now);
                } else if self.preferences_listeners.contains(&listener) {
                    self.preferences = Preferences::load(&self.store);
                    self.refresh_status(now);
                } else if let Some(alarm) = self.alarms.find_by_listener_mut(listener) {
                    alarm.apply_setting(&entry);
                }
            }
            Message::AlarmTriggered(id) => self.alarm_triggered(id, now),
            Message::AlarmCleared(id) => self.alarm_cleared(id, now),
            Message::AlarmPropertyChanged { alarm_id, property } => {
                self.alarm_changed(alarm_id, property, now);
            }
            Message::PlayerError { uri, message, .. } => self.media_player_error(&uri, &message),
            Message::SettingsFileChanged => {
                if let Err(err) = self.store.reload() {
                    log::warn!("couldn't reload settings: {err}");
                }
            }
        }
    }

    /// ring every alarm that is due
    pub fn tick(&mut self, now: DateTime<Local>) {
        for alarm in self.alarms.iter_mut().filter(|a| a.is_due(now)) {
            alarm.trigger();
        }
        if self.ui.list_window.visible {
            self.ui.list_window.reload(&self.alarms, now);
        }
        self.refresh_status(now);
    }

    pub(crate) fn alarms_add(&mut self, alarm: Alarm, now: DateTime<Local>) {
        let id = alarm.id;
        log::debug!("adding alarm #{id}");
        match self.alarms.add(alarm) {
            Ok(()) => {
                if let Some(alarm) = self.alarms.find(id) {
                    self.ui.list_window.add_row(alarm, now);
                }
            }
            Err(mut duplicate) => {
                log::warn!("alarm #{id} is already loaded");
                duplicate.unbind(&mut self.store);
            }
        }
        self.refresh_status(now);
    }

    pub(crate) fn alarms_remove(&mut self, id: AlarmId, now: DateTime<Local>) -> Option<Alarm> {
        debug_assert_ne!(
            self.ui.settings_dialog.alarm(),
            Some(id),
            "settings dialog still open for a removed alarm"
        );
        let mut alarm = self.alarms.remove(id)?;
        log::debug!("removing alarm #{id}");
        // a ringing alarm has to be balanced out before it goes
        alarm.clear();
        alarm.unbind(&mut self.store);
        self.ui.list_window.remove_row(id);
        self.ui.update_enabled(&self.alarms);
        self.refresh_status(now);
        Some(alarm)
    }

    /// the id a new alarm gets, one past the highest in use
    ///
    /// `None` once the highest possible id is taken
    #[must_use]
    pub fn next_alarm_id(&self) -> Option<AlarmId> {
        alarm::next_id(
            alarm::stored_ids(&self.store, ALARMS_DIR)
                .into_iter()
                .chain(self.alarms.ids()),
        )
    }

    /// create an alarm in the registry, it shows up once the change is processed
    pub fn create_alarm(&mut self, alarm_type: AlarmType) -> Option<AlarmId> {
        let Some(id) = self.next_alarm_id() else {
            log::warn!("no alarm id left, not creating a new {alarm_type}");
            return None;
        };
        alarm::write_new(&mut self.store, ALARMS_DIR, id, alarm_type);
        Some(id)
    }

    /// remove an alarm from the registry, it goes away once the change is processed
    pub fn delete_alarm(&mut self, id: AlarmId) {
        self.store
            .recursive_unset(&settings::join(ALARMS_DIR, &id.to_string()));
    }

    pub fn edit_alarm(&mut self, id: AlarmId) {
        if self.alarms.contains(id) {
            self.ui.settings_dialog.show(id);
        }
    }

    pub fn set_preferences(&mut self, preferences: Preferences) {
        preferences.save(&mut self.store);
    }

    pub fn snooze_all(&mut self, now: DateTime<Local>) {
        for alarm in self.alarms.iter_mut().filter(|a| a.triggered) {
            alarm.snooze(&mut self.store, now);
        }
    }

    pub fn stop_all(&mut self, now: DateTime<Local>) {
        for alarm in self.alarms.iter_mut().filter(|a| a.triggered) {
            alarm.stop(&mut self.store, now);
        }
    }

    /// flip the active state of the alarm selected in the list
    pub fn toggle_selected_enabled(&mut self, now: DateTime<Local>) {
        let Some(id) = self.ui.list_window.selected else {
            return;
        };
        if let Some(active) = self.alarms.find(id).map(|alarm| !alarm.active) {
            self.set_alarm_active(id, active, now);
        }
    }

    /// (de)activate an alarm, deactivating silences it first
    pub fn set_alarm_active(&mut self, id: AlarmId, active: bool, now: DateTime<Local>) {
        let Some(alarm) = self.alarms.find_mut(id) else {
            return;
        };
        if !active {
            alarm.stop(&mut self.store, now);
        }
        alarm.set_active(&mut self.store, active, now);
    }

    pub(crate) fn play_sound(&self, alarm_id: AlarmId, path: PathBuf, looped: bool) {
        if let Some(player) = &self.player {
            communication::send(
                player,
                sound::Command::Play {
                    alarm_id,
                    path,
                    looped,
                },
            );
        }
    }

    pub(crate) fn stop_sound(&self, alarm_id: AlarmId) {
        if let Some(player) = &self.player {
            communication::send(player, sound::Command::Stop(alarm_id));
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone};

    use super::testing::applet_with;
    use super::*;
    use crate::ui::NOTIFICATION_BODY;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 1, h, m, 0)
            .single()
            .unwrap()
    }

    fn started(ids: &[AlarmId]) -> (Applet, testing::Recorder) {
        let mut store = SettingsStore::new();
        for id in ids {
            alarm::write_new(&mut store, ALARMS_DIR, *id, AlarmType::Clock);
        }
        let (mut applet, recorder) = applet_with(store);
        applet.start(at(6, 0));
        applet.process_pending(at(6, 0));
        (applet, recorder)
    }

    #[test]
    fn start_loads_existing_alarms() {
        let (applet, _) = started(&[3, 1]);
        assert_eq!(applet.alarms().ids(), vec![1, 3]);
        assert_eq!(applet.next_alarm_id(), Some(4));
    }

    #[test]
    fn highest_id_taken_creates_nothing() {
        let (mut applet, _) = started(&[AlarmId::MAX]);
        {
            let (alarm, store) = applet.alarm_mut(AlarmId::MAX).unwrap();
            alarm.set_message(store, "Keep me");
        }
        applet.process_pending(at(6, 0));

        assert_eq!(applet.next_alarm_id(), None);
        assert_eq!(applet.create_alarm(AlarmType::Timer), None);
        applet.process_pending(at(6, 0));

        let alarm = applet.alarms().find(AlarmId::MAX).unwrap();
        assert_eq!(alarm.message, "Keep me");
        assert_eq!(alarm.alarm_type, AlarmType::Clock);
    }

    #[test]
    fn startup_survives_hand_edited_extremes() {
        let mut store = SettingsStore::new();
        alarm::write_new(&mut store, ALARMS_DIR, 1, AlarmType::Timer);
        store.set("/apps/alarm-clock/alarms/1/active", true);
        store.set("/apps/alarm-clock/alarms/1/timestamp", i64::MAX / 2);
        store.set("/apps/alarm-clock/alarms/1/timer", i64::MAX);
        store.set("/apps/alarm-clock/alarms/1/snooze", i64::MIN);
        store.set(config::KEY_LABEL_TYPE, "remaining-time");
        let (mut applet, _) = applet_with(store);

        applet.start(at(6, 0));
        applet.process_pending(at(6, 0));
        applet.set_list_window_visible(true, at(6, 0));
        applet.tick(at(6, 0));

        assert!(applet.ui.status_icon.tooltip.contains("@23:59:59"));
        assert!(applet.ui.status_icon.label.is_some());
        assert_eq!(applet.ui.list_window.rows.len(), 1);
        assert_eq!(applet.alarms().find(1).map(|a| a.snooze_mins), Some(1));
    }

    #[test]
    fn removing_with_dialog_open_is_caught() {
        let (mut applet, _) = started(&[1]);
        applet.edit_alarm(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            applet.alarms_remove(1, at(6, 0));
        }));
        assert_eq!(result.is_err(), cfg!(debug_assertions));
    }

    #[test]
    fn unchecking_a_ringing_alarm_silences_it() {
        let (mut applet, _) = started(&[1]);
        applet.set_alarm_active(1, true, at(6, 0));
        applet.alarm_mut(1).unwrap().0.trigger();
        applet.process_pending(at(6, 0));
        assert_eq!(applet.n_triggered(), 1);

        applet.set_alarm_active(1, false, at(6, 0));
        applet.process_pending(at(6, 0));
        assert_eq!(applet.n_triggered(), 0);
        assert!(applet.alarms().find(1).is_some_and(|a| !a.active));
    }

    #[test]
    fn saving_keeps_alarms_written_by_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut store = SettingsStore::open(&path).unwrap();
        alarm::write_new(&mut store, ALARMS_DIR, 1, AlarmType::Clock);
        store.save().unwrap();
        let (mut applet, _) = applet_with(SettingsStore::open(&path).unwrap());
        applet.start(at(6, 0));

        // a new alarm lands on disk before the file watcher reports it
        let mut other = SettingsStore::open(&path).unwrap();
        alarm::write_new(&mut other, ALARMS_DIR, 2, AlarmType::Timer);
        other.save().unwrap();

        applet.set_alarm_active(1, true, at(6, 0));
        applet.save_if_changed();
        applet.process_pending(at(6, 0));

        assert_eq!(applet.alarms().ids(), vec![1, 2]);
        let saved = SettingsStore::open(&path).unwrap();
        assert_eq!(alarm::stored_ids(&saved, ALARMS_DIR), vec![1, 2]);
        assert_eq!(saved.get_bool("/apps/alarm-clock/alarms/1/active"), Some(true));
    }

    #[test]
    fn created_and_deleted_alarms_flow_through_registry() {
        let (mut applet, _) = started(&[]);
        let id = applet.create_alarm(AlarmType::Timer).unwrap();
        assert!(applet.alarms().is_empty());
        applet.process_pending(at(6, 0));
        assert_eq!(applet.alarms().ids(), vec![id]);
        assert_eq!(
            applet.alarms().find(id).map(|a| a.alarm_type),
            Some(AlarmType::Timer)
        );

        applet.delete_alarm(id);
        applet.process_pending(at(6, 0));
        assert!(applet.alarms().is_empty());
    }

    #[test]
    fn due_alarm_notifies_and_blinks_until_stopped() {
        let (mut applet, recorder) = started(&[1]);
        {
            let (alarm, store) = applet.alarm_mut(1).unwrap();
            alarm.set_message(store, "Wake up");
            alarm.set_time(store, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
            alarm.set_active(store, true, at(6, 0));
        }
        applet.process_pending(at(6, 0));

        applet.tick(at(6, 59));
        applet.process_pending(at(6, 59));
        assert_eq!(applet.n_triggered(), 0);

        applet.tick(at(7, 0));
        applet.process_pending(at(7, 0));
        assert_eq!(applet.n_triggered(), 1);
        assert!(applet.ui.status_icon.blinking);
        assert!(applet.ui.actions.snooze_all);
        assert_eq!(
            recorder.notifications.borrow().as_slice(),
            [ui::Notification {
                summary: "Wake up".to_string(),
                body: NOTIFICATION_BODY.to_string(),
                icon: "alarm-clock".to_string(),
            }]
        );

        applet.stop_all(at(7, 0));
        applet.process_pending(at(7, 0));
        assert_eq!(applet.n_triggered(), 0);
        assert!(!applet.ui.status_icon.blinking);
        assert!(!applet.ui.actions.stop_all);
    }

    #[test]
    fn failed_notification_is_not_fatal() {
        let mut store = SettingsStore::new();
        alarm::write_new(&mut store, ALARMS_DIR, 1, AlarmType::Timer);
        let recorder = testing::Recorder {
            fail_notifications: true,
            ..testing::Recorder::default()
        };
        let mut applet = Applet::new(
            store,
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
            UiDefinition::default(),
        );
        applet.start(at(6, 0));
        applet.alarm_mut(1).unwrap().0.trigger();
        applet.process_pending(at(6, 0));
        assert_eq!(applet.n_triggered(), 1);
        assert_eq!(recorder.notifications.borrow()[0].icon, "alarm-timer");
    }

    #[test]
    fn removing_a_ringing_alarm_balances_the_count() {
        let (mut applet, _) = started(&[1, 2]);
        applet.alarm_mut(1).unwrap().0.trigger();
        applet.alarm_mut(2).unwrap().0.trigger();
        applet.process_pending(at(6, 0));
        assert_eq!(applet.n_triggered(), 2);

        applet.delete_alarm(2);
        applet.process_pending(at(6, 0));
        assert_eq!(applet.n_triggered(), 1);
        assert!(applet.ui.status_icon.blinking);
    }

    #[test]
    fn status_click_snoozes_or_toggles_list() {
        let (mut applet, _) = started(&[1]);
        applet.status_activate(at(6, 0));
        assert!(applet.ui.list_window.visible);
        assert!(applet.ui.actions.toggle_list_window);
        applet.status_activate(at(6, 0));
        assert!(!applet.ui.list_window.visible);

        applet.alarm_mut(1).unwrap().0.trigger();
        applet.process_pending(at(6, 0));
        applet.status_activate(at(6, 0));
        applet.process_pending(at(6, 0));
        assert_eq!(applet.n_triggered(), 0);
        assert!(!applet.ui.list_window.visible);
        assert!(applet.alarms().find(1).is_some_and(|a| a.active));
    }

    #[test]
    fn menu_edit_shows_list_and_about_is_presented_once_open() {
        let (mut applet, _) = started(&[1]);
        applet.status_popup();
        assert!(applet.ui.status_icon.menu_visible);
        applet.menu_edit(at(6, 0));
        assert!(applet.ui.list_window.visible);
        assert!(!applet.ui.list_window.present_requested);
        applet.menu_edit(at(6, 0));
        assert!(applet.ui.list_window.present_requested);

        applet.menu_about();
        assert!(applet.ui.about_dialog.visible);
        assert_eq!(applet.ui.about_dialog.title, "About Alarm Clock");
        assert!(!applet.ui.about_dialog.present_requested);
        applet.menu_about();
        assert!(applet.ui.about_dialog.present_requested);
    }

    #[test]
    fn enabled_toggle_follows_selection() {
        let (mut applet, _) = started(&[1]);
        applet.select_alarm(Some(1));
        assert_eq!(
            applet.ui.actions.alarm_enabled,
            ui::Toggle {
                sensitive: true,
                active: false
            }
        );
        applet.toggle_selected_enabled(at(6, 0));
        applet.process_pending(at(6, 0));
        assert!(applet.ui.actions.alarm_enabled.active);

        applet.select_alarm(Some(9));
        assert!(!applet.ui.actions.alarm_enabled.sensitive);
    }

    #[test]
    fn preference_changes_update_label() {
        let (mut applet, _) = started(&[]);
        assert_eq!(
            applet.ui.status_icon.label.as_deref(),
            Some(ui::NO_ALARM_LABEL)
        );
        applet.set_preferences(Preferences {
            show_label: false,
            label_type: config::LabelType::RemainingTime,
        });
        applet.process_pending(at(6, 0));
        assert!(!applet.preferences().show_label);
        assert_eq!(applet.ui.status_icon.label, None);
    }

    #[test]
    fn player_errors_open_error_dialog() {
        let (mut applet, recorder) = started(&[]);
        applet
            .sender()
            .send(Message::PlayerError {
                alarm_id: 1,
                uri: "/tmp/ring.ogg".to_string(),
                message: "unsupported format".to_string(),
            })
            .unwrap();
        applet.process_pending(at(6, 0));
        assert_eq!(
            recorder.errors.borrow().as_slice(),
            [(
                "Could not play".to_string(),
                Some("/tmp/ring.ogg: unsupported format".to_string())
            )]
        );
    }

    #[test]
    fn triggered_alarm_with_sound_starts_and_stops_player() {
        let (mut applet, _) = started(&[1]);
        let (tx, rx) = channel();
        applet.set_player(tx);
        {
            let (alarm, store) = applet.alarm_mut(1).unwrap();
            alarm.set_sound_file(store, Some(PathBuf::from("/tmp/ring.ogg")));
            alarm.trigger();
        }
        applet.process_pending(at(6, 0));
        applet.stop_all(at(6, 0));
        applet.process_pending(at(6, 0));

        let commands: Vec<sound::Command> = rx.try_iter().collect();
        assert_eq!(
            commands,
            vec![
                sound::Command::Play {
                    alarm_id: 1,
                    path: PathBuf::from("/tmp/ring.ogg"),
                    looped: true,
                },
                sound::Command::Stop(1),
            ]
        );
    }
}
