use std::{fmt, sync::mpsc::Sender};

use crate::settings::{ListenerId, SettingsEntry};

/// identifier of an alarm, the name of its directory under the alarms dir
pub type AlarmId = u32;

/// everything that reaches the applet's event loop
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// a key at or under a subscribed directory changed
    ConfigChanged {
        listener: ListenerId,
        entry: SettingsEntry,
    },
    AlarmTriggered(AlarmId),
    AlarmCleared(AlarmId),
    AlarmPropertyChanged {
        alarm_id: AlarmId,
        property: Property,
    },
    // the sound of an alarm couldn't be played
    PlayerError {
        alarm_id: AlarmId,
        uri: String,
        message: String,
    },
    /// the settings file was edited by someone else
    SettingsFileChanged,
}

/// send a message to a loop on the other end of `sender`
///
/// the loop going away means the applet is shutting down so there is no one left to tell
pub fn send<T: fmt::Debug>(sender: &Sender<T>, message: T) {
    if let Err(err) = sender.send(message) {
        log::debug!("dropping message, receiver is gone: {:?}", err.0);
    }
}

/// the properties of an alarm, named like the keys they are stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Message,
    Type,
    Active,
    Time,
    Timer,
    Timestamp,
    Snooze,
    SoundFile,
    SoundLoop,
}

impl Property {
    pub const ALL: [Self; 9] = [
        Self::Message,
        Self::Type,
        Self::Active,
        Self::Time,
        Self::Timer,
        Self::Timestamp,
        Self::Snooze,
        Self::SoundFile,
        Self::SoundLoop,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Type => "type",
            Self::Active => "active",
            Self::Time => "time",
            Self::Timer => "timer",
            Self::Timestamp => "timestamp",
            Self::Snooze => "snooze",
            Self::SoundFile => "sound_file",
            Self::SoundLoop => "sound_loop",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}
