use clap::ValueEnum;
use std::collections::VecDeque;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use super::viseme::is_cjk;
use super::voice::{Language, Voice};
use crate::error::SpeechError;

/// Fixed delivery settings: slow and low.
pub const SPEECH_RATE: f32 = 0.8;
pub const SPEECH_PITCH: f32 = 0.6;

const LATIN_CHAR_MS: f32 = 85.0;
const CJK_CHAR_MS: f32 = 150.0;

/// Estimated time per character at the given rate.
pub fn char_duration(text: &str, rate: f32) -> Duration {
    let base = if text.chars().any(is_cjk) {
        CJK_CHAR_MS
    } else {
        LATIN_CHAR_MS
    };
    Duration::from_micros((base * 1000.0 / rate.max(0.1)).round() as u64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub language: Language,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
}

impl Utterance {
    pub fn new(text: &str, language: Language, voice: Option<Voice>) -> Self {
        Self {
            text: text.to_string(),
            language,
            voice,
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    /// Preempted by a cancel or a newer utterance.
    Interrupted,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Started,
    Boundary { char_index: usize },
    Ended,
    Failed(EngineFailure),
}

/// A text-to-speech backend. Progress is reported by polling, once per frame.
pub trait SpeechEngine: Send {
    fn name(&self) -> &'static str;
    fn voices(&self) -> &[Voice];
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError>;
    fn cancel(&mut self);
    fn is_speaking(&self) -> bool;
    fn poll_events(&mut self, now: Instant) -> Vec<EngineEvent>;
}

// --- Simulated engine ---

#[derive(Debug)]
struct SimulatedRun {
    chars: usize,
    per_char: Duration,
    started: Option<Instant>,
    next_boundary: usize,
}

/// Silent engine on a virtual clock: starts on the first poll after `speak`
/// and ends once every character's estimated duration has elapsed.
#[derive(Debug)]
pub struct SimulatedEngine {
    voices: Vec<Voice>,
    boundaries: bool,
    run: Option<SimulatedRun>,
    queued: VecDeque<EngineEvent>,
}

impl SimulatedEngine {
    pub fn new(boundaries: bool) -> Self {
        Self {
            voices: vec![
                Voice::new("sim-en", "Simulated English Male", "en-US"),
                Voice::new("sim-zh", "Simulated Mandarin Male", "zh-CN"),
            ],
            boundaries,
            run: None,
            queued: VecDeque::new(),
        }
    }
}

impl SpeechEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn voices(&self) -> &[Voice] {
        &self.voices
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        self.cancel();
        self.run = Some(SimulatedRun {
            chars: utterance.text.chars().count(),
            per_char: char_duration(&utterance.text, utterance.rate),
            started: None,
            next_boundary: 0,
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if self.run.take().is_some() {
            self.queued.push_back(EngineEvent::Failed(EngineFailure::Interrupted));
        }
    }

    fn is_speaking(&self) -> bool {
        self.run.is_some()
    }

    fn poll_events(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut out: Vec<EngineEvent> = self.queued.drain(..).collect();
        let Some(run) = self.run.as_mut() else {
            return out;
        };

        let started = match run.started {
            Some(t) => t,
            None => {
                run.started = Some(now);
                out.push(EngineEvent::Started);
                now
            }
        };

        let elapsed = now.saturating_duration_since(started);
        if self.boundaries {
            while run.next_boundary < run.chars
                && run.per_char * run.next_boundary as u32 <= elapsed
            {
                out.push(EngineEvent::Boundary {
                    char_index: run.next_boundary,
                });
                run.next_boundary += 1;
            }
        }
        if elapsed >= run.per_char * run.chars as u32 {
            out.push(EngineEvent::Ended);
            self.run = None;
        }
        out
    }
}

// --- espeak-ng engine ---

pub fn is_espeak_on_path() -> bool {
    Command::new("espeak-ng")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn normalize_espeak_lang(code: &str) -> String {
    if code.starts_with("cmn") {
        "zh-CN".to_string()
    } else if code == "yue" {
        "zh-yue".to_string()
    } else {
        code.to_string()
    }
}

/// Parse the table printed by `espeak-ng --voices`.
pub fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let [_, lang, age_gender, name, ..] = cols.as_slice() else {
                return None;
            };
            let gender = match age_gender.rsplit('/').next() {
                Some("M") => " Male",
                Some("F") => " Female",
                _ => "",
            };
            Some(Voice::new(
                *lang,
                format!("{}{gender}", name.replace('_', " ")),
                normalize_espeak_lang(lang),
            ))
        })
        .collect()
}

/// Drives the system `espeak-ng` binary, one child process per utterance.
/// Emits no boundary events.
pub struct EspeakEngine {
    voices: Vec<Voice>,
    child: Option<Child>,
    queued: VecDeque<EngineEvent>,
}

impl EspeakEngine {
    pub fn detect() -> Result<Self, SpeechError> {
        let out = Command::new("espeak-ng")
            .arg("--voices")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        if !out.status.success() {
            return Err(SpeechError::Synthesis(format!(
                "espeak-ng --voices exited with {}",
                out.status
            )));
        }
        let voices = parse_espeak_voices(&String::from_utf8_lossy(&out.stdout));
        tracing::info!(voices = voices.len(), "espeak-ng engine ready");
        Ok(Self {
            voices,
            child: None,
            queued: VecDeque::new(),
        })
    }

    fn kill_child(&mut self) -> bool {
        let Some(mut child) = self.child.take() else {
            return false;
        };
        let _ = child.kill();
        let _ = child.wait();
        true
    }
}

impl SpeechEngine for EspeakEngine {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn voices(&self) -> &[Voice] {
        &self.voices
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        self.cancel();
        let voice = match (&utterance.voice, utterance.language) {
            (Some(v), _) => v.id.clone(),
            (None, Language::Zh) => "cmn".to_string(),
            (None, _) => "en-us".to_string(),
        };
        let wpm = (175.0 * utterance.rate).round() as u32;
        let pitch = (50.0 * utterance.pitch).round() as u32;

        let child = Command::new("espeak-ng")
            .arg("-v")
            .arg(&voice)
            .arg("-s")
            .arg(wpm.to_string())
            .arg("-p")
            .arg(pitch.to_string())
            .arg("--")
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        tracing::debug!(voice, wpm, pitch, "espeak-ng spawned");

        self.child = Some(child);
        self.queued.push_back(EngineEvent::Started);
        Ok(())
    }

    fn cancel(&mut self) {
        if self.kill_child() {
            self.queued.push_back(EngineEvent::Failed(EngineFailure::Interrupted));
        }
    }

    fn is_speaking(&self) -> bool {
        self.child.is_some()
    }

    fn poll_events(&mut self, _now: Instant) -> Vec<EngineEvent> {
        let mut out: Vec<EngineEvent> = self.queued.drain(..).collect();
        let Some(child) = self.child.as_mut() else {
            return out;
        };
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                self.child = None;
                out.push(if status.success() {
                    EngineEvent::Ended
                } else if status.code().is_none() {
                    // Terminated by a signal.
                    EngineEvent::Failed(EngineFailure::Interrupted)
                } else {
                    EngineEvent::Failed(EngineFailure::Other(format!(
                        "espeak-ng exited with {status}"
                    )))
                });
            }
            Err(err) => {
                self.kill_child();
                out.push(EngineEvent::Failed(EngineFailure::Other(err.to_string())));
            }
        }
        out
    }
}

impl Drop for EspeakEngine {
    fn drop(&mut self) {
        self.kill_child();
    }
}

// --- Selection ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EngineKind {
    /// espeak-ng when installed, otherwise simulated
    #[default]
    Auto,
    Espeak,
    Simulated,
}

/// Build the configured engine. `None` leaves the timeline without an
/// engine, so every `speak` is rejected.
pub fn create_engine(kind: EngineKind, sim_boundaries: bool) -> Option<Box<dyn SpeechEngine>> {
    match kind {
        EngineKind::Simulated => Some(Box::new(SimulatedEngine::new(sim_boundaries))),
        EngineKind::Espeak => match EspeakEngine::detect() {
            Ok(engine) => Some(Box::new(engine)),
            Err(err) => {
                tracing::warn!(error = %err, "espeak-ng unavailable; speech disabled");
                None
            }
        },
        EngineKind::Auto => {
            if is_espeak_on_path() {
                if let Ok(engine) = EspeakEngine::detect() {
                    return Some(Box::new(engine));
                }
            }
            tracing::info!("no system synthesizer found; using simulated speech");
            Some(Box::new(SimulatedEngine::new(sim_boundaries)))
        }
    }
}
