use chrono::{DateTime, Local, Timelike};
use eframe::egui::{
    self, Button, CentralPanel, Context, Grid, Layout, ScrollArea, TopBottomPanel, Window,
};

use crate::{
    alarm::AlarmType,
    alarm_edit::{AlarmEditor, EditingState},
    config::{self, LabelType},
    Applet,
};

/// how often the window wakes up to check for due alarms
const TICK: std::time::Duration = std::time::Duration::from_millis(500);

/// draws the applet state, every click goes back through [`Applet`]
pub struct AppletWindow {
    applet: Applet,
    editor: Option<AlarmEditor>,
}

impl AppletWindow {
    #[must_use]
    pub const fn new(applet: Applet) -> Self {
        Self {
            applet,
            editor: None,
        }
    }

    fn render_status(&mut self, ctx: &Context, now: DateTime<Local>) {
        TopBottomPanel::top("status_icon").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let status = &self.applet.ui.status_icon;
                if !status.visible {
                    return;
                }
                // blink by alternating the icon every second
                let icon = if status.blinking && now.second() % 2 == 0 {
                    "🔔"
                } else {
                    "⏰"
                };
                let tooltip = status.tooltip.replace("<b>", "").replace("</b>", "");
                let response = ui
                    .add(Button::new(icon).frame(false))
                    .on_hover_text(tooltip);
                if let Some(label) = &status.label {
                    ui.label(label);
                }
                if response.double_clicked() {
                    self.applet.menu_edit(now);
                } else if response.clicked() {
                    self.applet.status_activate(now);
                } else if response.secondary_clicked() {
                    self.applet.status_popup();
                }
                ui.with_layout(Layout::right_to_left(egui::Align::Min), |ui| {
                    if ui.button("☰").on_hover_text("menu").clicked() {
                        self.applet.status_popup();
                    }
                });
            });
        });
    }

    fn render_menu(&mut self, ctx: &Context, now: DateTime<Local>) {
        if !self.applet.ui.status_icon.menu_visible {
            return;
        }
        let labels = self.applet.ui.definition.menu.clone();
        let actions = self.applet.ui.actions;
        let mut open = true;
        Window::new(config::APP_NAME)
            .id(egui::Id::new("status_menu"))
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                if ui
                    .add_enabled(actions.snooze_all, Button::new(labels.snooze_all))
                    .clicked()
                {
                    self.applet.snooze_all(now);
                }
                if ui
                    .add_enabled(actions.stop_all, Button::new(labels.stop_all))
                    .clicked()
                {
                    self.applet.stop_all(now);
                }
                ui.separator();
                if ui.button(labels.edit_alarms).clicked() {
                    self.applet.menu_edit(now);
                }
                if ui.button(labels.preferences).clicked() {
                    self.applet.menu_preferences();
                }
                if ui.button(labels.about).clicked() {
                    self.applet.menu_about();
                }
                ui.separator();
                if ui.button(labels.quit).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        if !open {
            self.applet.ui.status_icon.menu_visible = false;
        }
    }

    fn render_list_window(&mut self, ctx: &Context, now: DateTime<Local>) {
        if !self.applet.ui.list_window.visible {
            return;
        }
        let mut open = true;
        let mut window = Window::new("Alarms").id(egui::Id::new("alarm_list"));
        if std::mem::take(&mut self.applet.ui.list_window.present_requested) {
            window = window.current_pos(ctx.screen_rect().center());
        }
        window.open(&mut open).show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("+").on_hover_text("add alarm").clicked() {
                    self.add_alarm(AlarmType::Clock, now);
                }
                if ui.button("+⏳").on_hover_text("add timer").clicked() {
                    self.add_alarm(AlarmType::Timer, now);
                }
                let toggle = self.applet.ui.actions.alarm_enabled;
                let text = if toggle.active { "disable" } else { "enable" };
                if ui.add_enabled(toggle.sensitive, Button::new(text)).clicked() {
                    self.applet.toggle_selected_enabled(now);
                }
            });
            ScrollArea::vertical().show(ui, |ui| {
                Grid::new("alarms").striped(true).show(ui, |ui| {
                    self.list_rows(ui, now);
                });
            });
        });
        if !open {
            self.applet.set_list_window_visible(false, now);
        }
    }

    /// create an alarm and select it once it shows up in the list
    fn add_alarm(&mut self, alarm_type: AlarmType, now: DateTime<Local>) {
        if let Some(id) = self.applet.create_alarm(alarm_type) {
            self.applet.process_pending(now);
            self.applet.select_alarm(Some(id));
        }
    }

    fn list_rows(&mut self, ui: &mut egui::Ui, now: DateTime<Local>) {
        let rows = self.applet.ui.list_window.rows.clone();
        let selected = self.applet.ui.list_window.selected;
        for row in rows {
            let mut active = row.active;
            if ui.checkbox(&mut active, "").changed() {
                self.applet.set_alarm_active(row.id, active, now);
            }
            let icon = if row.triggered {
                "🔔"
            } else if row.alarm_type == AlarmType::Timer {
                "⏳"
            } else {
                "⏰"
            };
            if ui
                .selectable_label(selected == Some(row.id), format!("{icon} {}", row.message))
                .clicked()
            {
                self.applet.select_alarm(Some(row.id));
            }
            ui.label(&row.time);
            ui.label(row.remaining.as_deref().map_or_else(String::new, |r| format!("-{r}")));
            if ui.button("edit").clicked() {
                self.applet.edit_alarm(row.id);
            }
            if ui.button("x").on_hover_text("delete alarm").clicked() {
                self.applet.delete_alarm(row.id);
            }
            ui.end_row();
        }
    }

    fn render_settings_dialog(&mut self, ctx: &Context, now: DateTime<Local>) {
        let Some(id) = self.applet.ui.settings_dialog.alarm() else {
            self.editor = None;
            return;
        };
        if self.editor.as_ref().map(|e| e.id) != Some(id) {
            self.editor = self.applet.alarms().find(id).map(AlarmEditor::from);
        }
        let Some(editor) = &mut self.editor else {
            self.applet.ui.settings_dialog.close();
            return;
        };
        match editor.render(ctx) {
            EditingState::Done => {
                if let Some((alarm, store)) = self.applet.alarm_mut(id) {
                    editor.apply(alarm, store, now);
                }
                self.applet.ui.settings_dialog.close();
                self.editor = None;
            }
            EditingState::Cancelled => {
                self.applet.ui.settings_dialog.close();
                self.editor = None;
            }
            EditingState::Editing => {}
        }
    }

    fn render_preferences(&mut self, ctx: &Context) {
        if !self.applet.ui.preferences_dialog.visible {
            return;
        }
        let mut open = true;
        let mut apply = false;
        Window::new("Preferences")
            .open(&mut open)
            .show(ctx, |ui| {
                let draft = &mut self.applet.ui.preferences_dialog.draft;
                ui.checkbox(&mut draft.show_label, "show label");
                ui.horizontal(|ui| {
                    ui.add_enabled_ui(draft.show_label, |ui| {
                        ui.selectable_value(
                            &mut draft.label_type,
                            LabelType::AlarmTime,
                            "alarm time",
                        );
                        ui.selectable_value(
                            &mut draft.label_type,
                            LabelType::RemainingTime,
                            "remaining time",
                        );
                    });
                });
                apply = ui.button("apply").clicked();
            });
        if apply {
            let draft = self.applet.ui.preferences_dialog.draft;
            self.applet.set_preferences(draft);
        }
        if !open || apply {
            self.applet.ui.preferences_dialog.visible = false;
        }
    }

    fn render_about(&mut self, ctx: &Context) {
        let about = &mut self.applet.ui.about_dialog;
        if !about.visible {
            return;
        }
        let mut open = true;
        let mut window = Window::new(about.title.clone())
            .id(egui::Id::new("about_dialog"))
            .collapsible(false);
        if std::mem::take(&mut about.present_requested) {
            window = window.current_pos(ctx.screen_rect().center());
        }
        window.open(&mut open).show(ctx, |ui| {
            ui.heading(&about.program_name);
            ui.label(format!("version {}", about.version));
            ui.label(env!("CARGO_PKG_DESCRIPTION"));
        });
        if !open {
            about.visible = false;
        }
    }
}

impl eframe::App for AppletWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Local::now();
        self.applet.tick(now);
        self.applet.process_pending(now);
        // keep time keeping and blinking going without input
        ctx.request_repaint_after(TICK);

        self.render_status(ctx, now);
        self.render_menu(ctx, now);
        self.render_list_window(ctx, now);
        self.render_settings_dialog(ctx, now);
        self.render_preferences(ctx);
        self.render_about(ctx);
        CentralPanel::default().show(ctx, |ui| {
            if self.applet.alarms().is_empty() {
                ui.label("No alarms yet, open the list to add one.");
            }
        });

        // apply what the clicks above changed before the next frame
        self.applet.process_pending(now);
        self.applet.save_if_changed();
    }
}

impl Drop for AppletWindow {
    fn drop(&mut self) {
        if let Err(err) = self.applet.stop() {
            log::error!("couldn't save settings: {err}");
        }
    }
}
