use std::{error::Error, sync::mpsc::channel};

use alarm_clock_applet::{
    alarm::{self, Alarm, AlarmType},
    config::{self, Preferences, ALARMS_DIR},
    gui::AppletWindow,
    settings::{self, SettingsStore},
    sound,
    ui::{DesktopNotifier, RfdErrorDialog, UiDefinition},
    watcher, Applet,
};
use chrono::{Local, NaiveTime, Timelike};
use clap::{Parser, Subcommand};
use eframe::{egui::ViewportBuilder, run_native};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write the default settings and interface definition
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// add an active alarm, or a timer when `--timer` is given
    NewAlarm {
        message: String,
        /// HH:MM[:SS], the time of day or the length of the timer
        time: String,
        #[clap(long, short)]
        timer: bool,
    },
    RemoveAlarm {
        id: u32,
    },
    List,
}

fn parse_time(time: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
}

fn main() -> Result<(), Box<dyn Error>> {
    if let Err(err) = simple_file_logger::init_logger!("alarm_clock_applet") {
        eprintln!("couldn't initialize logger: {err}");
    }

    let args = Args::parse();
    match args.command {
        Some(Command::Init { force }) => {
            if force || !config::is_settings_present() {
                let mut store = SettingsStore::open(config::settings_path()?)?;
                Preferences::default().save(&mut store);
                store.save()?;
                UiDefinition::default().save(&config::data_path(config::UI_FILE)?)?;
                let sounds = config::sounds_path()?;
                std::fs::create_dir_all(&sounds)?;
                log::info!("initialized settings, put alarm sounds in {}", sounds.display());
            } else {
                println!("settings already exist, use --force to overwrite them");
            }
        }
        Some(Command::NewAlarm {
            message,
            time,
            timer,
        }) => {
            let time = parse_time(&time)?;
            let mut store = SettingsStore::open(config::settings_path()?)?;
            let id = alarm::next_id(alarm::stored_ids(&store, ALARMS_DIR))
                .ok_or("no alarm id left")?;
            let alarm_type = if timer { AlarmType::Timer } else { AlarmType::Clock };
            alarm::write_new(&mut store, ALARMS_DIR, id, alarm_type);

            // nobody runs an event loop here, the running applet picks the alarm up from the file
            let (tx, _rx) = channel();
            let mut alarm = Alarm::new(&mut store, ALARMS_DIR, id, tx);
            alarm.set_message(&mut store, &message);
            match alarm_type {
                AlarmType::Clock => alarm.set_time(&mut store, time),
                AlarmType::Timer => {
                    alarm.set_timer(&mut store, i64::from(time.num_seconds_from_midnight()));
                }
            }
            alarm.set_active(&mut store, true, Local::now());
            store.save()?;
            println!("added {alarm_type} #{id} at {}", alarm.alarm_time().format("%H:%M:%S"));
        }
        Some(Command::RemoveAlarm { id }) => {
            let mut store = SettingsStore::open(config::settings_path()?)?;
            if !alarm::stored_ids(&store, ALARMS_DIR).contains(&id) {
                return Err(format!("no alarm #{id}").into());
            }
            store.recursive_unset(&settings::join(ALARMS_DIR, &id.to_string()));
            store.save()?;
        }
        Some(Command::List) => {
            let mut store = SettingsStore::open(config::settings_path()?)?;
            let (tx, _rx) = channel();
            for id in alarm::stored_ids(&store, ALARMS_DIR) {
                let alarm = Alarm::new(&mut store, ALARMS_DIR, id, tx.clone());
                println!(
                    "#{id} {} {} {}{}",
                    alarm.alarm_type,
                    alarm.alarm_time().format("%H:%M:%S"),
                    alarm.message,
                    if alarm.active { "" } else { " (inactive)" },
                );
            }
        }
        None => run_applet()?,
    }
    Ok(())
}

fn run_applet() -> Result<(), Box<dyn Error>> {
    let settings_path = config::settings_path()?;
    let store = SettingsStore::open(&settings_path)?;
    let definition = UiDefinition::load(&config::data_path(config::UI_FILE)?);
    let mut applet = Applet::new(
        store,
        Box::new(DesktopNotifier),
        Box::new(RfdErrorDialog),
        definition,
    );

    // the watcher has to live as long as the window
    let watched = watcher::watch_settings_file(&settings_path, applet.sender());
    let _settings_watcher = match watched {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            log::warn!("not watching {} for changes: {err}", settings_path.display());
            None
        }
    };
    applet.set_player(sound::spawn_player(applet.sender()));
    applet.start(Local::now());

    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title(config::APP_NAME)
            .with_inner_size([360.0, 240.0]),
        ..Default::default()
    };
    run_native(
        config::APP_NAME,
        native_options,
        Box::new(|_| Ok(Box::new(AppletWindow::new(applet)))),
    )
    .map_err(|e| e.into())
}
