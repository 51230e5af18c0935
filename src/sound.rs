use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::mpsc::{channel, Receiver, Sender},
    thread,
};

use rodio::{Decoder, OutputStream, Sink, Source};

use crate::communication::{self, AlarmId, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play {
        alarm_id: AlarmId,
        path: PathBuf,
        looped: bool,
    },
    Stop(AlarmId),
}

/// start the thread that plays alarm sounds
///
/// failures are posted back to the event loop as [`Message::PlayerError`],
/// the thread ends once every sender is dropped
#[must_use]
pub fn spawn_player(events: Sender<Message>) -> Sender<Command> {
    let (tx, rx) = channel();
    thread::spawn(move || run(&rx, &events));
    tx
}

fn run(commands: &Receiver<Command>, events: &Sender<Message>) {
    let stream = match rodio::OutputStreamBuilder::open_default_stream() {
        Ok(stream) => Some(stream),
        Err(err) => {
            log::error!("couldn't open audio output: {err}");
            None
        }
    };
    let mut sinks: HashMap<AlarmId, Sink> = HashMap::new();

    while let Ok(command) = commands.recv() {
        match command {
            Command::Play {
                alarm_id,
                path,
                looped,
            } => match play(stream.as_ref(), &path, looped) {
                Ok(sink) => {
                    log::debug!("alarm #{alarm_id} playing {}", path.display());
                    if let Some(old) = sinks.insert(alarm_id, sink) {
                        old.stop();
                    }
                }
                Err(message) => communication::send(
                    events,
                    Message::PlayerError {
                        alarm_id,
                        uri: path.display().to_string(),
                        message,
                    },
                ),
            },
            Command::Stop(alarm_id) => {
                if let Some(sink) = sinks.remove(&alarm_id) {
                    log::debug!("alarm #{alarm_id} stopped playing");
                    sink.stop();
                }
            }
        }
    }
}

fn play(stream: Option<&OutputStream>, path: &Path, looped: bool) -> Result<Sink, String> {
    let stream = stream.ok_or_else(|| "no audio output available".to_string())?;
    let file = File::open(path).map_err(|e| e.to_string())?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    let sink = Sink::connect_new(stream.mixer());
    if looped {
        sink.append(source.repeat_infinite());
    } else {
        sink.append(source);
    }
    sink.play();
    Ok(sink)
}
