//! Hierarchical settings registry.
//!
//! Keys are absolute `/` separated paths such as `/apps/alarm-clock/alarms/3/message`.
//! Anyone interested in a part of the tree subscribes to a directory with
//! [`SettingsStore::notify_add`] and receives a [`Message::ConfigChanged`] for every
//! key at or under it that changes. Removals are delivered with no value.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
    sync::mpsc::Sender,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    communication::{self, Message},
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SettingsValue {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SettingsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for SettingsValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingsValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SettingsValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SettingsValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// a single change: the full key and its new value, `None` when it was removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEntry {
    pub key: String,
    pub value: Option<SettingsValue>,
}

pub type ListenerId = u64;

#[derive(Debug)]
struct Subscription {
    id: ListenerId,
    dir: String,
    sender: Sender<Message>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("{key} is not under {dir}")]
    OutsideDir { key: String, dir: String },
    #[error("{key} has no child segment")]
    NoChild { key: String },
}

/// join a directory and a child name into a key
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

#[must_use]
pub fn is_at_or_under(key: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    key.strip_prefix(dir)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// the path segment immediately following `dir`, up to the next separator
///
/// `child_segment("/a/b", "/a/b/c/d") == Ok("c")`
pub fn child_segment<'a>(dir: &str, key: &'a str) -> Result<&'a str, KeyError> {
    let dir = dir.trim_end_matches('/');
    let rest = key
        .strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| KeyError::OutsideDir {
            key: key.to_string(),
            dir: dir.to_string(),
        })?;
    match rest.split('/').next() {
        Some(segment) if !segment.is_empty() => Ok(segment),
        _ => Err(KeyError::NoChild {
            key: key.to_string(),
        }),
    }
}

#[derive(Debug, Default)]
pub struct SettingsStore {
    values: BTreeMap<String, SettingsValue>,
    subscriptions: Vec<Subscription>,
    next_listener: ListenerId,
    // where the store is persisted, in memory only if none
    path: Option<PathBuf>,
    // keys changed here that the file doesn't have yet
    pending: BTreeSet<String>,
    // the file as last read or written
    on_disk: Option<FileStamp>,
}

/// modification time and length, enough to notice someone else wrote the file
type FileStamp = (SystemTime, u64);

fn stamp(path: &Path) -> Option<FileStamp> {
    let metadata = std::fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

impl SettingsStore {
    /// an empty store that is never written to disk
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// open the store persisted at `path`, a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = read_values(&path)?;
        Ok(Self {
            values,
            on_disk: stamp(&path),
            path: Some(path),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// whether there are changes the file doesn't have yet
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// whether someone else wrote the file since we last read or wrote it
    #[must_use]
    pub fn changed_on_disk(&self) -> bool {
        self.path
            .as_deref()
            .is_some_and(|path| stamp(path) != self.on_disk)
    }

    /// write the store out
    ///
    /// Edits another process made to the file in the meantime are merged in first, our own
    /// unsaved keys win over theirs.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if self.changed_on_disk() {
            log::debug!("{} changed on disk, merging before save", path.display());
            self.reload()?;
        }
        let contents = toml::to_string(&self.values)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&path, contents).map_err(|e| Error::io(&path, e))?;
        log::debug!("saved {} settings to {}", self.values.len(), path.display());
        self.pending.clear();
        self.on_disk = stamp(&path);
        Ok(())
    }

    /// re-read the file and notify about every key that differs from what we hold
    ///
    /// keys changed here and not saved yet keep their value
    pub fn reload(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let fresh = read_values(&path)?;
        let removed: Vec<String> = self
            .values
            .keys()
            .filter(|key| !fresh.contains_key(*key) && !self.pending.contains(*key))
            .cloned()
            .collect();
        for key in removed {
            self.apply(&key, None);
        }
        for (key, value) in fresh {
            if !self.pending.contains(&key) {
                self.apply(&key, Some(value));
            }
        }
        self.on_disk = stamp(&path);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SettingsValue> {
        self.values.get(key)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(SettingsValue::as_bool)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(SettingsValue::as_int)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingsValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingsValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// set `key`, subscribers only hear about it if the value actually changed
    pub fn set(&mut self, key: &str, value: impl Into<SettingsValue>) {
        if self.apply(key, Some(value.into())) {
            self.pending.insert(key.to_string());
        }
    }

    pub fn unset(&mut self, key: &str) {
        if self.apply(key, None) {
            self.pending.insert(key.to_string());
        }
    }

    /// change the value held for `key` and notify, returns whether anything changed
    fn apply(&mut self, key: &str, value: Option<SettingsValue>) -> bool {
        let changed = match &value {
            Some(value) if self.values.get(key) == Some(value) => false,
            Some(value) => {
                self.values.insert(key.to_string(), value.clone());
                true
            }
            None => self.values.remove(key).is_some(),
        };
        if changed {
            self.notify(key, value);
        }
        changed
    }

    /// remove `dir` and everything under it
    pub fn recursive_unset(&mut self, dir: &str) {
        let keys: Vec<String> = self
            .values
            .keys()
            .filter(|key| is_at_or_under(key, dir))
            .cloned()
            .collect();
        for key in keys {
            self.unset(&key);
        }
    }

    /// the distinct child segments directly under `dir`, sorted
    #[must_use]
    pub fn children(&self, dir: &str) -> Vec<String> {
        self.values
            .keys()
            .filter_map(|key| child_segment(dir, key).ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// subscribe to changes at or under `dir`
    pub fn notify_add(&mut self, dir: &str, sender: Sender<Message>) -> ListenerId {
        self.next_listener += 1;
        let id = self.next_listener;
        self.subscriptions.push(Subscription {
            id,
            dir: dir.trim_end_matches('/').to_string(),
            sender,
        });
        log::debug!("listener {id} watching {dir}");
        id
    }

    pub fn notify_remove(&mut self, id: ListenerId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    fn notify(&self, key: &str, value: Option<SettingsValue>) {
        for subscription in self
            .subscriptions
            .iter()
            .filter(|s| is_at_or_under(key, &s.dir))
        {
            communication::send(
                &subscription.sender,
                Message::ConfigChanged {
                    listener: subscription.id,
                    entry: SettingsEntry {
                        key: key.to_string(),
                        value: value.clone(),
                    },
                },
            );
        }
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, SettingsValue>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}
