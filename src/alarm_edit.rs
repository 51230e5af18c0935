use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveTime, Timelike};
use eframe::egui::{self, TextEdit, Widget, Window};

use crate::{
    alarm::{Alarm, AlarmType},
    communication::AlarmId,
    settings::SettingsStore,
};

pub enum EditingState {
    Cancelled,
    Editing,
    Done,
}

/// what the settings dialog is editing, copied from the alarm when it was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEditor {
    pub id: AlarmId,
    message: String,
    alarm_type: AlarmType,
    // time of day for alarms, length for timers
    hour: u8,
    minute: u8,
    second: u8,
    hour_string: String,
    minute_string: String,
    second_string: String,
    snooze_mins: i64,
    sound: Option<PathBuf>,
}

impl From<&Alarm> for AlarmEditor {
    fn from(alarm: &Alarm) -> Self {
        let (hour, minute, second) = match alarm.alarm_type {
            AlarmType::Clock => (alarm.time.hour(), alarm.time.minute(), alarm.time.second()),
            AlarmType::Timer => {
                let secs = u32::try_from(alarm.timer.clamp(0, 24 * 3600 - 1)).unwrap_or(0);
                (secs / 3600, secs / 60 % 60, secs % 60)
            }
        };
        let [hour, minute, second] = [hour, minute, second].map(|n| u8::try_from(n).unwrap_or(0));
        Self {
            id: alarm.id,
            message: alarm.message.clone(),
            alarm_type: alarm.alarm_type,
            hour,
            minute,
            second,
            hour_string: hour.to_string(),
            minute_string: minute.to_string(),
            second_string: second.to_string(),
            snooze_mins: alarm.snooze_mins,
            sound: alarm.sound_file.clone(),
        }
    }
}

impl AlarmEditor {
    #[must_use]
    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
        )
        .unwrap_or(NaiveTime::MIN)
    }

    #[must_use]
    pub fn timer_secs(&self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second)
    }

    /// write the edits to the alarm, an active alarm is rescheduled
    pub fn apply(&self, alarm: &mut Alarm, store: &mut SettingsStore, now: DateTime<Local>) {
        alarm.set_message(store, &self.message);
        alarm.set_type(store, self.alarm_type);
        match self.alarm_type {
            AlarmType::Clock => alarm.set_time(store, self.time()),
            AlarmType::Timer => alarm.set_timer(store, self.timer_secs()),
        }
        alarm.set_snooze(store, self.snooze_mins);
        alarm.set_sound_file(store, self.sound.clone());
        if alarm.active {
            alarm.set_active(store, true, now);
        }
    }

    pub fn render(&mut self, ctx: &egui::Context) -> EditingState {
        let mut ret = EditingState::Editing;
        let mut open = true;
        // if no message set we need way to differentiate between different alarms
        Window::new(format!("editing {} {}", self.alarm_type, self.message))
            .id(egui::Id::new(("alarm settings", self.id)))
            .open(&mut open)
            .show(ctx, |ui| {
                ui.text_edit_singleline(&mut self.message);
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.alarm_type, AlarmType::Clock, "Alarm");
                    ui.selectable_value(&mut self.alarm_type, AlarmType::Timer, "Timer");
                });
                self.render_time_editor(ui);
                ui.add(
                    egui::Slider::new(&mut self.snooze_mins, 1..=60)
                        .suffix(" min")
                        .text("snooze"),
                );
                self.render_sound_editor(ui);
                ui.horizontal(|ui| {
                    if ui.button("done").clicked() {
                        ret = EditingState::Done;
                    } else if ui.button("cancel").clicked() {
                        ret = EditingState::Cancelled;
                    }
                });
            });
        if !open {
            ret = EditingState::Cancelled;
        }
        ret
    }

    fn render_time_editor(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            render_unit_selector(ui, "Hour", &mut self.hour, &mut self.hour_string, 23);
            render_unit_selector(ui, "Minute", &mut self.minute, &mut self.minute_string, 59);
            render_unit_selector(ui, "Second", &mut self.second, &mut self.second_string, 59);
        });
    }

    fn render_sound_editor(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(
                self.sound
                    .as_ref()
                    .map_or_else(|| "no sound".to_string(), |p| p.display().to_string()),
            );
            if ui.button("Custom").clicked() {
                if let Some(path) = pick_sound() {
                    self.sound = Some(path);
                }
            }
            if self.sound.is_some() && ui.button("x").on_hover_text("no sound").clicked() {
                self.sound = None;
            }
        });
    }
}

fn render_unit_selector(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut u8,
    text: &mut String,
    max: u8,
) {
    ui.vertical(|ui| {
        ui.label(label);
        if ui.button("Up").clicked() && *value < max {
            *value += 1;
            *text = value.to_string();
        }
        if TextEdit::singleline(text)
            .desired_width(20.0)
            .char_limit(2)
            .ui(&mut *ui)
            .lost_focus()
        {
            // keep the old value if the text isn't a number
            if let Ok(parsed_value) = text.parse::<u8>() {
                *value = parsed_value.min(max);
            }
            *text = value.to_string();
        }
        if ui.button("Down").clicked() && *value > 0 {
            *value -= 1;
            *text = value.to_string();
        }
    });
}

fn pick_sound() -> Option<PathBuf> {
    // TODO: rfd with gnome opens Recents not audio folder
    // https://github.com/PolyMeilex/rfd/issues/237
    let file_dialog = rfd::FileDialog::new()
        .set_title("Pick alarm sound")
        .add_filter("audio", &["mp3", "ogg", "oga", "wav", "flac"]);
    let file_dialog = match directories::UserDirs::new()
        .and_then(|u| u.audio_dir().map(Path::to_path_buf))
    {
        Some(audio_path) => file_dialog.set_directory(audio_path),
        None => file_dialog,
    };
    file_dialog.pick_file()
}
