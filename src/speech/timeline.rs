use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use super::engine::{char_duration, EngineEvent, EngineFailure, SpeechEngine, Utterance, SPEECH_RATE};
use super::log::TtsLog;
use super::viseme::{classify, classify_isolated, is_pause, Viseme, VisemeEvent};
use super::voice::{select_voice, Language};
use crate::error::SpeechError;

/// Mouth position when speech starts.
const START_ENERGY: f32 = 0.25;
/// Pauses advance the clock by this share of a character.
const PAUSE_FRACTION: f32 = 0.3;
/// Lower bound on reported duration, per character.
const MIN_PER_CHAR: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOutcome {
    pub duration: Duration,
    pub method: &'static str,
}

/// Timed fallback events for `text`, as offsets from the start of speech.
/// Characters are classified without neighbours; pauses emit nothing.
pub fn fallback_schedule(text: &str, rate: f32) -> Vec<(Duration, VisemeEvent)> {
    let per_char = char_duration(text, rate);
    let pause = per_char.mul_f32(PAUSE_FRACTION);
    let mut offset = Duration::ZERO;
    let mut out = Vec::new();
    for ch in text.chars() {
        if is_pause(ch) {
            offset += pause;
            continue;
        }
        out.push((offset, classify_isolated(ch).into()));
        offset += per_char;
    }
    out
}

/// Event for an engine boundary at `char_index`, with neighbour context.
pub fn boundary_event(chars: &[char], char_index: usize) -> Option<VisemeEvent> {
    let ch = *chars.get(char_index)?;
    if ch.is_whitespace() {
        return None;
    }
    let prev = char_index.checked_sub(1).and_then(|i| chars.get(i)).copied();
    let next = chars.get(char_index + 1).copied();
    Some(classify(ch, prev, next).into())
}

#[derive(Debug)]
struct Scheduled {
    at: Instant,
    event: VisemeEvent,
}

#[derive(Debug)]
struct ActiveUtterance {
    text: String,
    chars: Vec<char>,
    requested: Instant,
    started: Option<Instant>,
    pending: VecDeque<Scheduled>,
}

impl ActiveUtterance {
    fn outcome(&self, now: Instant, method: &'static str) -> SpeechOutcome {
        let elapsed = now.saturating_duration_since(self.started.unwrap_or(self.requested));
        let floor = MIN_PER_CHAR * self.chars.len() as u32;
        SpeechOutcome {
            duration: elapsed.max(floor),
            method,
        }
    }
}

/// Drives a speech engine and turns its progress into viseme events.
///
/// Boundary callbacks and the estimated schedule both feed the same channel;
/// the consumer keeps whichever arrived last.
pub struct SpeechTimeline {
    engine: Option<Box<dyn SpeechEngine>>,
    language: Language,
    events: Sender<VisemeEvent>,
    active: Option<ActiveUtterance>,
    finished: Option<Result<SpeechOutcome, SpeechError>>,
    log: Option<TtsLog>,
}

impl SpeechTimeline {
    pub fn new(
        engine: Option<Box<dyn SpeechEngine>>,
        language: Language,
        events: Sender<VisemeEvent>,
    ) -> Self {
        Self {
            engine,
            language,
            events,
            active: None,
            finished: None,
            log: None,
        }
    }

    pub fn with_log(mut self, log: TtsLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn engine_name(&self) -> Option<&'static str> {
        self.engine.as_ref().map(|e| e.name())
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.text.as_str())
    }

    fn emit(&self, event: VisemeEvent) {
        // A dropped receiver just means nobody is watching the face.
        let _ = self.events.send(event);
    }

    /// Start speaking `text`. Rejections leave all state untouched.
    #[tracing::instrument(skip(self, now), fields(chars = text.chars().count()))]
    pub fn speak(&mut self, text: &str, now: Instant) -> Result<(), SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }
        if self.active.is_some() {
            return Err(SpeechError::AlreadyPlaying);
        }
        let engine = self.engine.as_mut().ok_or(SpeechError::EngineUnavailable)?;

        if engine.is_speaking() {
            engine.cancel();
            // The interrupt belongs to the old utterance.
            let _ = engine.poll_events(now);
        }

        let language = self.language.resolve(text);
        let voice = select_voice(engine.voices(), language).cloned();
        match &voice {
            Some(v) => tracing::debug!(voice = %v.name, lang = %v.lang, "voice selected"),
            None => tracing::debug!("no voice list; using engine default"),
        }
        engine.speak(&Utterance::new(text, language, voice))?;

        if let Some(log) = &self.log {
            log.record(engine.name(), language.tag(), text);
        }
        self.active = Some(ActiveUtterance {
            text: text.to_string(),
            chars: text.chars().collect(),
            requested: now,
            started: None,
            pending: VecDeque::new(),
        });
        Ok(())
    }

    /// Advance to `now`. Returns the result of the current utterance exactly
    /// once, when it completes.
    pub fn poll(&mut self, now: Instant) -> Option<Result<SpeechOutcome, SpeechError>> {
        if let Some(done) = self.finished.take() {
            return Some(done);
        }
        let engine_events = match (self.engine.as_mut(), self.active.is_some()) {
            (Some(engine), true) => engine.poll_events(now),
            _ => return None,
        };

        for event in engine_events {
            match event {
                EngineEvent::Started => self.on_started(now),
                EngineEvent::Boundary { char_index } => {
                    let next = self
                        .active
                        .as_ref()
                        .and_then(|a| boundary_event(&a.chars, char_index));
                    if let Some(ev) = next {
                        self.emit(ev);
                    }
                }
                EngineEvent::Ended | EngineEvent::Failed(EngineFailure::Interrupted) => {
                    return self.complete(now, None);
                }
                EngineEvent::Failed(EngineFailure::Other(reason)) => {
                    tracing::warn!(%reason, "speech synthesis failed");
                    return self.complete(now, Some(SpeechError::Synthesis(reason)));
                }
            }
        }

        self.deliver_due(now);
        None
    }

    fn on_started(&mut self, now: Instant) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.started = Some(now);
        active.pending = fallback_schedule(&active.text, SPEECH_RATE)
            .into_iter()
            .map(|(offset, event)| Scheduled {
                at: now + offset,
                event,
            })
            .collect();
        tracing::debug!(scheduled = active.pending.len(), "speech started");
        self.emit(VisemeEvent::new(Viseme::A, START_ENERGY));
    }

    fn deliver_due(&mut self, now: Instant) {
        let mut due = Vec::new();
        if let Some(active) = self.active.as_mut() {
            while active.pending.front().is_some_and(|s| s.at <= now) {
                if let Some(s) = active.pending.pop_front() {
                    due.push(s.event);
                }
            }
        }
        for event in due {
            self.emit(event);
        }
    }

    fn complete(
        &mut self,
        now: Instant,
        error: Option<SpeechError>,
    ) -> Option<Result<SpeechOutcome, SpeechError>> {
        let active = self.active.take()?;
        let method = self.engine_name().unwrap_or("none");
        self.emit(VisemeEvent::closed());
        match error {
            Some(err) => Some(Err(err)),
            None => {
                let outcome = active.outcome(now, method);
                tracing::info!(secs = outcome.duration.as_secs_f32(), method, "speech finished");
                Some(Ok(outcome))
            }
        }
    }

    /// Cancel playback, drop pending events and close the mouth. Safe to call
    /// at any time, any number of times.
    pub fn stop(&mut self, now: Instant) {
        if let Some(engine) = self.engine.as_mut() {
            engine.cancel();
            let _ = engine.poll_events(now);
        }
        if let Some(done) = self.complete(now, None) {
            self.finished = Some(done);
        } else {
            self.emit(VisemeEvent::closed());
        }
    }
}
