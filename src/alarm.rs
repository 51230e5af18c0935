use std::{fmt, path::PathBuf, sync::mpsc::Sender};

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};

use crate::{
    communication::{self, AlarmId, Message, Property},
    settings::{self, ListenerId, SettingsEntry, SettingsStore, SettingsValue},
};

pub const DEFAULT_MESSAGE: &str = "Alarm!";
pub const DEFAULT_TIMER_SECS: i64 = 300;
pub const DEFAULT_SNOOZE_MINS: i64 = 5;
/// timers are shorter than a day
pub const MAX_TIMER_SECS: i64 = 24 * 3600 - 1;
pub const MAX_SNOOZE_MINS: i64 = 24 * 60;

/// parse an alarm directory name, alarms are named by a plain decimal id
#[must_use]
pub fn parse_alarm_id(segment: &str) -> Option<AlarmId> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// the ids of the alarms stored under `dir`, in ascending order
#[must_use]
pub fn stored_ids(store: &SettingsStore, dir: &str) -> Vec<AlarmId> {
    let mut ids: Vec<AlarmId> = store
        .children(dir)
        .iter()
        .filter_map(|segment| parse_alarm_id(segment))
        .collect();
    ids.sort_unstable();
    ids
}

/// one past the highest of `ids`, `None` if that would overflow
#[must_use]
pub fn next_id(ids: impl IntoIterator<Item = AlarmId>) -> Option<AlarmId> {
    ids.into_iter().max().map_or(Some(0), |id| id.checked_add(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmType {
    /// goes off at a time of day
    #[default]
    Clock,
    /// counts down from when it was started
    Timer,
}

impl AlarmType {
    #[must_use]
    pub const fn as_setting(self) -> &'static str {
        match self {
            Self::Clock => "alarm",
            Self::Timer => "timer",
        }
    }

    #[must_use]
    pub fn from_setting(value: &str) -> Option<Self> {
        match value {
            "alarm" => Some(Self::Clock),
            "timer" => Some(Self::Timer),
            _ => None,
        }
    }

    /// letter used in the tooltip
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Clock => 'A',
            Self::Timer => 'T',
        }
    }
}

impl fmt::Display for AlarmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clock => "Alarm",
            Self::Timer => "Timer",
        })
    }
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S").ok()
}

/// write a fresh, inactive alarm with default values to `<dir>/<id>`
pub fn write_new(store: &mut SettingsStore, dir: &str, id: AlarmId, alarm_type: AlarmType) {
    let dir = settings::join(dir, &id.to_string());
    let key = |property: Property| settings::join(&dir, property.name());
    store.set(&key(Property::Type), alarm_type.as_setting());
    store.set(&key(Property::Message), DEFAULT_MESSAGE);
    store.set(&key(Property::Time), format_time(NaiveTime::MIN));
    store.set(&key(Property::Timer), DEFAULT_TIMER_SECS);
    store.set(&key(Property::Snooze), DEFAULT_SNOOZE_MINS);
    store.set(&key(Property::SoundLoop), true);
    store.set(&key(Property::Active), false);
}

/// an alarm or timer bound to `<dir>/<id>` in the settings registry
///
/// setters write through to the registry, the registry echoing the change back through
/// [`Alarm::apply_setting`] is then a no-op.
#[derive(Debug)]
pub struct Alarm {
    pub id: AlarmId,
    dir: String,
    pub message: String,
    pub alarm_type: AlarmType,
    pub active: bool,
    pub time: NaiveTime,
    /// length of a timer in seconds
    pub timer: i64,
    /// unix time the alarm goes off next, only meaningful while active
    pub timestamp: i64,
    pub snooze_mins: i64,
    pub sound_file: Option<PathBuf>,
    pub sound_loop: bool,
    pub triggered: bool,
    listener: Option<ListenerId>,
    sender: Sender<Message>,
}

impl Alarm {
    /// bind to `<dir>/<id>`, loading whatever the registry already holds
    pub fn new(
        store: &mut SettingsStore,
        dir: &str,
        id: AlarmId,
        sender: Sender<Message>,
    ) -> Self {
        let mut alarm = Self {
            id,
            dir: settings::join(dir, &id.to_string()),
            message: DEFAULT_MESSAGE.to_string(),
            alarm_type: AlarmType::default(),
            active: false,
            time: NaiveTime::MIN,
            timer: DEFAULT_TIMER_SECS,
            timestamp: 0,
            snooze_mins: DEFAULT_SNOOZE_MINS,
            sound_file: None,
            sound_loop: true,
            triggered: false,
            listener: None,
            sender,
        };
        for property in Property::ALL {
            if let Some(value) = store.get(&alarm.key(property)).cloned() {
                alarm.load(property, &value);
            }
        }
        alarm.listener = Some(store.notify_add(&alarm.dir, alarm.sender.clone()));
        alarm
    }

    /// the directory holding this alarm's keys
    #[must_use]
    pub fn dir(&self) -> &str {
        &self.dir
    }

    #[must_use]
    pub fn key(&self, property: Property) -> String {
        settings::join(&self.dir, property.name())
    }

    #[must_use]
    pub const fn listener(&self) -> Option<ListenerId> {
        self.listener
    }

    /// stop listening to the registry, done when the alarm leaves the applet
    pub fn unbind(&mut self, store: &mut SettingsStore) {
        if let Some(listener) = self.listener.take() {
            store.notify_remove(listener);
        }
    }

    /// set a field from a registry value, returns whether anything changed
    fn load(&mut self, property: Property, value: &SettingsValue) -> bool {
        let id = self.id;
        macro_rules! update {
            ($field:expr, $new:expr) => {
                match $new {
                    Some(new) if new != $field => {
                        $field = new;
                        true
                    }
                    Some(_) => false,
                    None => {
                        log::debug!(
                            "ignoring {} = {value} for alarm #{id}, wrong type",
                            property.name()
                        );
                        false
                    }
                }
            };
        }
        match property {
            Property::Message => update!(self.message, value.as_str().map(str::to_string)),
            Property::Type => update!(
                self.alarm_type,
                value.as_str().and_then(AlarmType::from_setting)
            ),
            Property::Active => update!(self.active, value.as_bool()),
            Property::Time => update!(self.time, value.as_str().and_then(parse_time)),
            Property::Timer => update!(
                self.timer,
                value.as_int().map(|secs| secs.clamp(1, MAX_TIMER_SECS))
            ),
            Property::Timestamp => update!(self.timestamp, value.as_int()),
            Property::Snooze => update!(
                self.snooze_mins,
                value.as_int().map(|mins| mins.clamp(1, MAX_SNOOZE_MINS))
            ),
            Property::SoundFile => update!(
                self.sound_file,
                value
                    .as_str()
                    .map(|s| (!s.is_empty()).then(|| PathBuf::from(s)))
            ),
            Property::SoundLoop => update!(self.sound_loop, value.as_bool()),
        }
    }

    /// react to a change of one of this alarm's own keys
    ///
    /// returns the property that changed, if any
    pub fn apply_setting(&mut self, entry: &SettingsEntry) -> Option<Property> {
        let name = settings::child_segment(&self.dir, &entry.key).ok()?;
        let property = Property::from_name(name)?;
        // a removed key is handled by the alarms directory watcher
        let value = entry.value.as_ref()?;
        if self.load(property, value) {
            self.emit_changed(property);
            Some(property)
        } else {
            None
        }
    }

    fn emit_changed(&self, property: Property) {
        communication::send(
            &self.sender,
            Message::AlarmPropertyChanged {
                alarm_id: self.id,
                property,
            },
        );
    }

    fn set(&mut self, store: &mut SettingsStore, property: Property, value: SettingsValue) {
        if self.load(property, &value) {
            store.set(&self.key(property), value);
            self.emit_changed(property);
        }
    }

    pub fn set_message(&mut self, store: &mut SettingsStore, message: &str) {
        self.set(store, Property::Message, message.into());
    }

    pub fn set_type(&mut self, store: &mut SettingsStore, alarm_type: AlarmType) {
        self.set(store, Property::Type, alarm_type.as_setting().into());
    }

    pub fn set_time(&mut self, store: &mut SettingsStore, time: NaiveTime) {
        self.set(store, Property::Time, format_time(time).into());
    }

    pub fn set_timer(&mut self, store: &mut SettingsStore, secs: i64) {
        self.set(store, Property::Timer, secs.clamp(1, MAX_TIMER_SECS).into());
    }

    pub fn set_snooze(&mut self, store: &mut SettingsStore, mins: i64) {
        self.set(store, Property::Snooze, mins.clamp(1, MAX_SNOOZE_MINS).into());
    }

    pub fn set_sound_file(&mut self, store: &mut SettingsStore, path: Option<PathBuf>) {
        let value = path.map_or_else(String::new, |p| p.to_string_lossy().into_owned());
        self.set(store, Property::SoundFile, value.into());
    }

    /// (de)activate the alarm, activating schedules it relative to `now`
    pub fn set_active(&mut self, store: &mut SettingsStore, active: bool, now: DateTime<Local>) {
        if active {
            let timestamp = self.next_timestamp(now);
            self.set(store, Property::Timestamp, timestamp.into());
        }
        self.set(store, Property::Active, active.into());
    }

    /// when the alarm would go off if activated at `now`
    #[must_use]
    pub fn next_timestamp(&self, now: DateTime<Local>) -> i64 {
        match self.alarm_type {
            AlarmType::Timer => now.timestamp().saturating_add(self.timer),
            AlarmType::Clock => next_occurrence(now, self.time).timestamp(),
        }
    }

    /// time left until the alarm goes off, zero once due
    #[must_use]
    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        let secs = self.timestamp.saturating_sub(now.timestamp()).max(0);
        Duration::try_seconds(secs).unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.active && !self.triggered && self.timestamp <= now.timestamp()
    }

    /// local time the alarm goes off next
    #[must_use]
    pub fn alarm_time(&self) -> NaiveTime {
        match Local.timestamp_opt(self.timestamp, 0).single() {
            Some(at) if self.active => at.time(),
            _ => match self.alarm_type {
                AlarmType::Clock => self.time,
                AlarmType::Timer => u32::try_from(self.timer.rem_euclid(24 * 3600))
                    .ok()
                    .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, 0))
                    .unwrap_or(NaiveTime::MIN),
            },
        }
    }

    /// start ringing, does nothing if already ringing
    pub fn trigger(&mut self) {
        if self.triggered {
            return;
        }
        log::debug!("alarm #{} '{}' triggered", self.id, self.message);
        self.triggered = true;
        communication::send(&self.sender, Message::AlarmTriggered(self.id));
    }

    /// stop ringing, only announced if the alarm was ringing
    pub fn clear(&mut self) {
        if !self.triggered {
            return;
        }
        self.triggered = false;
        communication::send(&self.sender, Message::AlarmCleared(self.id));
    }

    /// ring again `snooze_mins` after `now`
    pub fn snooze(&mut self, store: &mut SettingsStore, now: DateTime<Local>) {
        if !self.triggered {
            return;
        }
        self.clear();
        let timestamp = now
            .timestamp()
            .saturating_add(self.snooze_mins.saturating_mul(60));
        self.set(store, Property::Timestamp, timestamp.into());
        self.set(store, Property::Active, true.into());
    }

    /// stop ringing for good, timers are spent and alarms wait for tomorrow
    pub fn stop(&mut self, store: &mut SettingsStore, now: DateTime<Local>) {
        self.clear();
        match self.alarm_type {
            AlarmType::Timer => self.set(store, Property::Active, false.into()),
            AlarmType::Clock if self.active => {
                let timestamp = next_occurrence(now, self.time).timestamp();
                self.set(store, Property::Timestamp, timestamp.into());
            }
            AlarmType::Clock => {}
        }
    }
}

/// the first `time` of day strictly after `now`
fn next_occurrence(now: DateTime<Local>, time: NaiveTime) -> DateTime<Local> {
    let mut day = now.date_naive();
    loop {
        // skip times that don't exist on a day, e.g. inside a DST gap
        if let Some(at) = Local.from_local_datetime(&day.and_time(time)).earliest() {
            if at > now {
                return at;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => return now,
        }
    }
}

/// the applet's alarms in the order they were added, at most one per id
#[derive(Debug, Default)]
pub struct AlarmList {
    alarms: Vec<Alarm>,
}

impl AlarmList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// add an alarm, handing it back if one with the same id is already present
    pub fn add(&mut self, alarm: Alarm) -> Result<(), Alarm> {
        if self.contains(alarm.id) {
            return Err(alarm);
        }
        self.alarms.push(alarm);
        Ok(())
    }

    pub fn remove(&mut self, id: AlarmId) -> Option<Alarm> {
        let index = self.alarms.iter().position(|a| a.id == id)?;
        Some(self.alarms.remove(index))
    }

    #[must_use]
    pub fn contains(&self, id: AlarmId) -> bool {
        self.find(id).is_some()
    }

    #[must_use]
    pub fn find(&self, id: AlarmId) -> Option<&Alarm> {
        self.alarms.iter().find(|a| a.id == id)
    }

    pub fn find_mut(&mut self, id: AlarmId) -> Option<&mut Alarm> {
        self.alarms.iter_mut().find(|a| a.id == id)
    }

    pub fn find_by_listener_mut(&mut self, listener: ListenerId) -> Option<&mut Alarm> {
        self.alarms
            .iter_mut()
            .find(|a| a.listener == Some(listener))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Alarm> {
        self.alarms.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Alarm> {
        self.alarms.iter_mut()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<AlarmId> {
        self.alarms.iter().map(|a| a.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }
}

impl<'a> IntoIterator for &'a AlarmList {
    type Item = &'a Alarm;
    type IntoIter = std::slice::Iter<'a, Alarm>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, Receiver};

    use super::*;
    use crate::config::ALARMS_DIR;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local
            .from_local_datetime(
                &chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(h, m, s)
                    .unwrap(),
            )
            .single()
            .unwrap()
    }

    fn setup() -> (SettingsStore, Sender<Message>, Receiver<Message>) {
        let (tx, rx) = channel();
        (SettingsStore::new(), tx, rx)
    }

    #[test]
    fn alarm_ids_are_plain_decimals() {
        assert_eq!(parse_alarm_id("0"), Some(0));
        assert_eq!(parse_alarm_id("42"), Some(42));
        assert_eq!(parse_alarm_id(""), None);
        assert_eq!(parse_alarm_id("-1"), None);
        assert_eq!(parse_alarm_id("+1"), None);
        assert_eq!(parse_alarm_id("alarm1"), None);
        assert_eq!(parse_alarm_id("99999999999"), None);
    }

    #[test]
    fn new_alarm_loads_existing_values() {
        let (mut store, tx, _rx) = setup();
        store.set("/apps/alarm-clock/alarms/4/message", "Tea");
        store.set("/apps/alarm-clock/alarms/4/type", "timer");
        store.set("/apps/alarm-clock/alarms/4/timer", 180_i64);
        store.set("/apps/alarm-clock/alarms/4/time", "not a time");

        let alarm = Alarm::new(&mut store, ALARMS_DIR, 4, tx);
        assert_eq!(alarm.message, "Tea");
        assert_eq!(alarm.alarm_type, AlarmType::Timer);
        assert_eq!(alarm.timer, 180);
        assert_eq!(alarm.time, NaiveTime::MIN);
        assert!(!alarm.active);
        assert_eq!(alarm.dir(), "/apps/alarm-clock/alarms/4");
    }

    #[test]
    fn setters_write_through_and_announce_once() {
        let (mut store, tx, rx) = setup();
        let mut alarm = Alarm::new(&mut store, ALARMS_DIR, 1, tx);
        let listener = alarm.listener();

        alarm.set_message(&mut store, "Wake up");
        alarm.set_message(&mut store, "Wake up");
        assert_eq!(
            store.get_string("/apps/alarm-clock/alarms/1/message"),
            Some("Wake up")
        );

        let messages: Vec<Message> = rx.try_iter().collect();
        let changed = messages
            .iter()
            .filter(|m| matches!(m, Message::AlarmPropertyChanged { .. }))
            .count();
        assert_eq!(changed, 1);

        // the registry echo carries the value we already hold
        for message in messages {
            if let Message::ConfigChanged { listener: l, entry } = message {
                assert_eq!(Some(l), listener);
                assert_eq!(alarm.apply_setting(&entry), None);
            }
        }
    }

    #[test]
    fn external_changes_update_fields() {
        let (mut store, tx, rx) = setup();
        let mut alarm = Alarm::new(&mut store, ALARMS_DIR, 2, tx);
        let entry = SettingsEntry {
            key: "/apps/alarm-clock/alarms/2/active".to_string(),
            value: Some(true.into()),
        };
        assert_eq!(alarm.apply_setting(&entry), Some(Property::Active));
        assert!(alarm.active);
        assert!(rx.try_iter().any(|m| m
            == Message::AlarmPropertyChanged {
                alarm_id: 2,
                property: Property::Active
            }));

        let unknown = SettingsEntry {
            key: "/apps/alarm-clock/alarms/2/volume".to_string(),
            value: Some(3_i64.into()),
        };
        assert_eq!(alarm.apply_setting(&unknown), None);
    }

    #[test]
    fn activation_schedules_by_type() {
        let (mut store, tx, _rx) = setup();
        let now = at(8, 0, 0);

        let mut clock = Alarm::new(&mut store, ALARMS_DIR, 1, tx.clone());
        clock.set_time(&mut store, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        clock.set_active(&mut store, true, now);
        assert_eq!(clock.remaining(now), Duration::hours(23) + Duration::minutes(30));

        let mut timer = Alarm::new(&mut store, ALARMS_DIR, 2, tx);
        timer.set_type(&mut store, AlarmType::Timer);
        timer.set_timer(&mut store, 90);
        timer.set_active(&mut store, true, now);
        assert_eq!(timer.remaining(now), Duration::seconds(90));
        assert!(!timer.is_due(now));
        assert!(timer.is_due(at(8, 1, 30)));
    }

    #[test]
    fn hand_edited_extremes_are_clamped() {
        let (mut store, tx, _rx) = setup();
        let now = at(8, 0, 0);
        store.set("/apps/alarm-clock/alarms/1/type", "timer");
        store.set("/apps/alarm-clock/alarms/1/active", true);
        store.set("/apps/alarm-clock/alarms/1/timestamp", i64::MAX / 2);
        store.set("/apps/alarm-clock/alarms/1/timer", i64::MAX);
        store.set("/apps/alarm-clock/alarms/1/snooze", i64::MAX);

        let mut alarm = Alarm::new(&mut store, ALARMS_DIR, 1, tx);
        assert_eq!(alarm.timer, MAX_TIMER_SECS);
        assert_eq!(alarm.snooze_mins, MAX_SNOOZE_MINS);
        assert!(alarm.remaining(now) > Duration::days(365));
        assert_eq!(alarm.alarm_time(), NaiveTime::from_hms_opt(23, 59, 59).unwrap());

        alarm.timestamp = i64::MIN;
        assert_eq!(alarm.remaining(now), Duration::zero());
        assert_eq!(
            alarm.apply_setting(&SettingsEntry {
                key: "/apps/alarm-clock/alarms/1/timer".to_string(),
                value: Some((-5_i64).into()),
            }),
            Some(Property::Timer)
        );
        assert_eq!(alarm.timer, 1);

        alarm.set_active(&mut store, true, now);
        assert_eq!(alarm.remaining(now), Duration::seconds(1));
        alarm.trigger();
        alarm.snooze(&mut store, now);
        assert_eq!(alarm.remaining(now), Duration::minutes(MAX_SNOOZE_MINS));
    }

    #[test]
    fn trigger_and_clear_are_balanced() {
        let (mut store, tx, rx) = setup();
        let mut alarm = Alarm::new(&mut store, ALARMS_DIR, 7, tx);
        alarm.clear();
        alarm.trigger();
        alarm.trigger();
        alarm.clear();
        alarm.clear();
        let signals: Vec<Message> = rx
            .try_iter()
            .filter(|m| {
                matches!(m, Message::AlarmTriggered(_) | Message::AlarmCleared(_))
            })
            .collect();
        assert_eq!(
            signals,
            vec![Message::AlarmTriggered(7), Message::AlarmCleared(7)]
        );
    }

    #[test]
    fn snooze_and_stop_reschedule() {
        let (mut store, tx, _rx) = setup();
        let now = at(7, 30, 0);

        let mut alarm = Alarm::new(&mut store, ALARMS_DIR, 1, tx.clone());
        alarm.set_time(&mut store, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        alarm.set_active(&mut store, true, at(7, 0, 0));
        assert!(alarm.is_due(now));
        alarm.trigger();
        alarm.snooze(&mut store, now);
        assert!(!alarm.triggered);
        assert_eq!(alarm.remaining(now), Duration::minutes(5));

        alarm.trigger();
        alarm.stop(&mut store, now);
        assert!(alarm.active);
        assert_eq!(alarm.remaining(now), Duration::hours(24));

        let mut timer = Alarm::new(&mut store, ALARMS_DIR, 2, tx);
        timer.set_type(&mut store, AlarmType::Timer);
        timer.set_active(&mut store, true, now);
        timer.trigger();
        timer.stop(&mut store, now);
        assert!(!timer.active);
        assert_eq!(store.get_bool("/apps/alarm-clock/alarms/2/active"), Some(false));
    }

    #[test]
    fn list_keeps_ids_unique_and_order() {
        let (mut store, tx, _rx) = setup();
        let mut list = AlarmList::new();
        for id in [3, 1, 2] {
            assert!(list.add(Alarm::new(&mut store, ALARMS_DIR, id, tx.clone())).is_ok());
        }
        assert!(list.add(Alarm::new(&mut store, ALARMS_DIR, 1, tx)).is_err());
        assert_eq!(list.ids(), vec![3, 1, 2]);

        assert_eq!(list.remove(1).map(|a| a.id), Some(1));
        assert!(list.remove(1).is_none());
        assert_eq!(list.ids(), vec![3, 2]);
    }
}
