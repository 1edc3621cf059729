use crossterm::event;
use std::sync::mpsc::{self, Receiver};

#[derive(Debug)]
pub enum InputMessage {
    Event(crossterm::event::Event),
    ReadError(String),
}

pub type InputReceiver = Receiver<InputMessage>;

/// Blocking terminal reads run on their own thread so a frame never waits
/// on the keyboard.
pub fn spawn_input_thread() -> InputReceiver {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("input".into())
        .spawn(move || loop {
            match event::read() {
                Ok(ev) => {
                    if tx.send(InputMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(%err, "terminal read failed");
                    let _ = tx.send(InputMessage::ReadError(err.to_string()));
                    break;
                }
            }
        })
        .map_err(|err| tracing::error!(%err, "could not start input thread"))
        .ok();
    rx
}
