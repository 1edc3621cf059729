pub mod state;
pub mod thread;

use crate::error::AppResult;
use crate::render::AppState;
use crossterm::event::{Event, KeyEventKind};
use state::{action_for_key, Action};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

pub fn drain_input_events(
    app_state: &mut AppState,
    input_rx: &Receiver<thread::InputMessage>,
) -> AppResult<bool> {
    loop {
        match input_rx.try_recv() {
            Ok(thread::InputMessage::Event(event)) => {
                handle_input_event(app_state, event);
                if app_state.input_state.quit_requested {
                    return Ok(true);
                }
            }
            Ok(thread::InputMessage::ReadError(err)) => {
                return Err(format!("Input thread read failed: {err}").into());
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                return Err("Input channel disconnected".into());
            }
        }
    }

    Ok(app_state.input_state.quit_requested)
}

fn speak_say_text(app_state: &mut AppState) {
    let text = app_state.say_text.clone();
    match app_state.speech.speak(&text, Instant::now()) {
        Ok(()) => app_state.set_status(format!("speaking {} chars", text.chars().count())),
        Err(err) => {
            if err.is_rejection() {
                tracing::info!(%err, "speak rejected");
            } else {
                tracing::warn!(%err, "speak failed");
            }
            app_state.set_status(err.to_string());
        }
    }
}

fn save_face_snapshot(app_state: &mut AppState) {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
    let path = app_state.snapshot_dir.join(format!("face-{stamp}.png"));
    match app_state.face.save_snapshot(&path) {
        Ok(()) => app_state.set_status(format!("saved {}", path.display())),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "snapshot failed");
            app_state.set_status(format!("snapshot failed: {err}"));
        }
    }
}

pub fn apply_action(app_state: &mut AppState, action: Action) {
    let cfg = &mut app_state.config;
    match action {
        Action::Quit => app_state.input_state.quit_requested = true,
        Action::ToggleHud => app_state.show_hud = !app_state.show_hud,
        Action::TogglePause => app_state.paused = !app_state.paused,
        Action::ToggleFace => app_state.show_face = !app_state.show_face,
        Action::Speed(factor) => cfg.nudge_speed(factor),
        Action::Density(delta) => cfg.nudge_density(delta),
        Action::Trail(delta) => cfg.nudge_trail(delta),
        Action::Persistence(delta) => cfg.nudge_persistence(delta),
        Action::Hue(degrees) => cfg.rotate_hue(degrees),
        Action::FontSize(delta) => cfg.nudge_font_size(delta),
        Action::Glow(delta) => cfg.nudge_glow(delta),
        Action::DepthInfluence(delta) => cfg.nudge_depth_influence(delta),
        Action::NextSource => {
            let next = app_state.source_index + 1;
            app_state.select_source(next);
        }
        Action::ResetSource => app_state.select_source(0),
        Action::Speak => speak_say_text(app_state),
        Action::StopSpeech => app_state.speech.stop(Instant::now()),
        Action::Snapshot => save_face_snapshot(app_state),
    }
}

pub fn handle_input_event(app_state: &mut AppState, event: Event) {
    match event {
        Event::Key(key_event) => {
            if !matches!(key_event.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                return;
            }
            if let Some(action) = action_for_key(key_event.code) {
                tracing::debug!(?action, "key action");
                apply_action(app_state, action);
            }
        }
        Event::Resize(cols, rows) => {
            tracing::debug!(cols, rows, "terminal resized");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::make_state;
    use crossterm::event::{KeyCode, KeyEvent, KeyEventState, KeyModifiers};
    use std::sync::mpsc;

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    #[test]
    fn drain_consumes_all_queued_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(thread::InputMessage::Event(key('D'))).expect("send D");
        tx.send(thread::InputMessage::Event(key('H'))).expect("send H");

        let mut app = make_state();
        let density = app.config.density;
        let quit = drain_input_events(&mut app, &rx).expect("drain should succeed");
        assert!(!quit);
        assert!(app.config.density > density);
        assert!((app.config.color_hue - 155.0).abs() < 1e-4);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn quit_stops_draining() {
        let (tx, rx) = mpsc::channel();
        tx.send(thread::InputMessage::Event(key('q'))).expect("send q");
        tx.send(thread::InputMessage::Event(key('D'))).expect("send D");
        let mut app = make_state();
        assert!(drain_input_events(&mut app, &rx).expect("drain"));
        assert!(rx.try_recv().is_ok(), "events after quit stay queued");
    }

    #[test]
    fn read_errors_end_the_loop() {
        let (tx, rx) = mpsc::channel();
        tx.send(thread::InputMessage::ReadError("boom".into())).expect("send");
        let mut app = make_state();
        assert!(drain_input_events(&mut app, &rx).is_err());
        drop(tx);
        assert!(drain_input_events(&mut app, &rx).is_err());
    }

    #[test]
    fn releases_are_ignored() {
        let mut app = make_state();
        let release = KeyEvent {
            code: KeyCode::Char(' '),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        handle_input_event(&mut app, Event::Key(release));
        assert!(!app.paused);
        handle_input_event(&mut app, key(' '));
        assert!(app.paused);
    }

    #[test]
    fn speak_then_stop_drives_the_timeline() {
        let mut app = make_state();
        handle_input_event(&mut app, key('s'));
        assert!(app.speech.is_playing());
        handle_input_event(&mut app, key('s'));
        assert!(app.status.as_ref().is_some_and(|s| s.text.contains("already")));
        handle_input_event(&mut app, key('x'));
        assert!(!app.speech.is_playing());
    }

    #[test]
    fn empty_say_text_is_rejected() {
        let mut app = make_state();
        app.say_text = "   ".into();
        handle_input_event(&mut app, key('s'));
        assert!(!app.speech.is_playing());
        assert!(app.status.is_some());
    }

    #[test]
    fn source_keys_cycle_and_reset() {
        let mut app = make_state();
        handle_input_event(&mut app, key('n'));
        assert_eq!(app.source_index, 1);
        handle_input_event(&mut app, key('n'));
        assert_eq!(app.source_index, 0);
        handle_input_event(&mut app, key('n'));
        handle_input_event(&mut app, key('r'));
        assert_eq!(app.source_index, 0);
        assert!(app.sources.is_live_face());
    }
}
