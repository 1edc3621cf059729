use image::RgbaImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::time::Instant;

use super::{DepthField, ResampleThrottle};
use crate::config::LIVE_FACE_SOURCE;
use crate::error::SourceError;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepthSourceSpec {
    LiveFace,
    Video(PathBuf),
    Image(PathBuf),
}

impl DepthSourceSpec {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == LIVE_FACE_SOURCE {
            return Self::LiveFace;
        }
        let path = PathBuf::from(raw);
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video(path)
        } else {
            Self::Image(path)
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::LiveFace => "live-face".to_string(),
            Self::Video(p) | Self::Image(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Pending,
    Ready,
    Failed(String),
}

impl SourceState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

pub fn load_image(path: &Path) -> Result<RgbaImage, SourceError> {
    let img = image::open(path).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgba8())
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), SourceError> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| SourceError::Probe(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(SourceError::Probe(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| SourceError::Probe(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| SourceError::Probe("no video stream found".into()))?;
    match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(SourceError::Probe("missing video dimensions".into())),
    }
}

/// Looping video decoded by a system `ffmpeg` child into raw RGBA frames.
pub struct VideoStream {
    child: Child,
    frames: Receiver<RgbaImage>,
    latest: Option<RgbaImage>,
    ended: bool,
}

impl VideoStream {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !is_ffmpeg_on_path() {
            return Err(SourceError::FfmpegMissing);
        }
        let (width, height) = probe_dimensions(path)?;

        let mut child = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-stream_loop", "-1", "-re", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-an", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Probe("failed to open ffmpeg stdout".into()))?;

        let (tx, rx): (SyncSender<RgbaImage>, Receiver<RgbaImage>) = mpsc::sync_channel(2);
        let frame_len = width as usize * height as usize * 4;
        std::thread::spawn(move || loop {
            let mut buf = vec![0u8; frame_len];
            if stdout.read_exact(&mut buf).is_err() {
                break;
            }
            let Some(frame) = RgbaImage::from_raw(width, height, buf) else {
                break;
            };
            match tx.try_send(frame) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => break,
            }
        });

        tracing::info!(path = %path.display(), width, height, "video depth source opened");
        Ok(Self {
            child,
            frames: rx,
            latest: None,
            ended: false,
        })
    }

    /// Drain the channel, keeping only the newest frame. Returns true when a
    /// new frame arrived since the last call.
    pub fn pump(&mut self) -> bool {
        let mut fresh = false;
        loop {
            match self.frames.try_recv() {
                Ok(frame) => {
                    self.latest = Some(frame);
                    fresh = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.ended = true;
                    break;
                }
            }
        }
        fresh
    }

    pub fn latest(&self) -> Option<&RgbaImage> {
        self.latest.as_ref()
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

enum ActiveSource {
    None,
    LiveFace,
    Image(RgbaImage),
    Video(VideoStream),
}

/// Owns the active depth source and feeds the [`DepthField`] from it.
pub struct DepthSourceHost {
    spec: Option<DepthSourceSpec>,
    active: ActiveSource,
    state: SourceState,
    throttle: ResampleThrottle,
    viewport: (usize, usize),
}

impl Default for DepthSourceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthSourceHost {
    pub fn new() -> Self {
        Self {
            spec: None,
            active: ActiveSource::None,
            state: SourceState::Pending,
            throttle: ResampleThrottle::default(),
            viewport: (0, 0),
        }
    }

    pub fn spec(&self) -> Option<&DepthSourceSpec> {
        self.spec.as_ref()
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    pub fn is_live_face(&self) -> bool {
        matches!(self.active, ActiveSource::LiveFace)
    }

    /// Tear down the current source, then open `spec`. The depth buffer is
    /// cleared so stale data never outlives its source.
    pub fn switch(&mut self, spec: DepthSourceSpec, field: &mut DepthField) {
        self.active = ActiveSource::None;
        field.clear();
        self.throttle.reset();
        self.state = SourceState::Pending;

        self.active = match &spec {
            DepthSourceSpec::LiveFace => ActiveSource::LiveFace,
            DepthSourceSpec::Image(path) => match load_image(path) {
                Ok(img) => {
                    tracing::info!(path = %path.display(), w = img.width(), h = img.height(), "depth image loaded");
                    self.state = SourceState::Ready;
                    ActiveSource::Image(img)
                }
                Err(err) => {
                    tracing::warn!(%err, "depth image unavailable");
                    self.state = SourceState::Failed(err.to_string());
                    ActiveSource::None
                }
            },
            DepthSourceSpec::Video(path) => match VideoStream::open(path) {
                Ok(stream) => ActiveSource::Video(stream),
                Err(err) => {
                    tracing::warn!(%err, "video depth source unavailable");
                    self.state = SourceState::Failed(err.to_string());
                    ActiveSource::None
                }
            },
        };
        self.spec = Some(spec);

        if let ActiveSource::Image(img) = &self.active {
            if self.viewport.0 > 0 && self.viewport.1 > 0 {
                field.resample(img, self.viewport.0, self.viewport.1);
            }
        }
    }

    /// Record a viewport change. Static images are resampled immediately;
    /// streaming sources pick the new size up on their next tick.
    pub fn resize(&mut self, width: usize, height: usize, field: &mut DepthField) {
        if self.viewport == (width, height) {
            return;
        }
        self.viewport = (width, height);
        self.throttle.reset();
        if let ActiveSource::Image(img) = &self.active {
            field.resample(img, width, height);
        }
    }

    /// Per-frame hook. `live_face` is the face renderer's published snapshot.
    pub fn tick(&mut self, now: Instant, live_face: Option<&RgbaImage>, field: &mut DepthField) {
        let (w, h) = self.viewport;
        if w == 0 || h == 0 {
            return;
        }
        match &mut self.active {
            ActiveSource::None | ActiveSource::Image(_) => {}
            ActiveSource::LiveFace => {
                let Some(frame) = live_face else {
                    return;
                };
                if self.throttle.ready(now) {
                    field.resample(frame, w, h);
                    self.state = SourceState::Ready;
                }
            }
            ActiveSource::Video(stream) => {
                stream.pump();
                if stream.has_ended() && stream.latest().is_none() {
                    self.state = SourceState::Failed("video stream ended before first frame".into());
                    self.active = ActiveSource::None;
                    return;
                }
                if let Some(frame) = stream.latest() {
                    if self.throttle.ready(now) {
                        field.resample(frame, w, h);
                        self.state = SourceState::Ready;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::Duration;

    #[test]
    fn parse_classifies_sources() {
        assert_eq!(DepthSourceSpec::parse("tts-live-face"), DepthSourceSpec::LiveFace);
        assert_eq!(
            DepthSourceSpec::parse("clips/depth-map-video.MP4"),
            DepthSourceSpec::Video(PathBuf::from("clips/depth-map-video.MP4"))
        );
        assert_eq!(
            DepthSourceSpec::parse("depth-default.png"),
            DepthSourceSpec::Image(PathBuf::from("depth-default.png"))
        );
        assert_eq!(
            DepthSourceSpec::parse("no-extension"),
            DepthSourceSpec::Image(PathBuf::from("no-extension"))
        );
    }

    #[test]
    fn missing_image_is_a_failed_terminal_state() {
        let mut host = DepthSourceHost::new();
        let mut field = DepthField::new();
        host.resize(16, 16, &mut field);
        host.switch(
            DepthSourceSpec::Image(PathBuf::from("/no/such/depth.png")),
            &mut field,
        );
        assert!(matches!(host.state(), SourceState::Failed(_)));
        assert!(field.dimensions().is_none());
        assert_eq!(field.query(3.0, 3.0), 0.5);
    }

    #[test]
    fn live_face_resamples_on_throttled_cadence() {
        let mut host = DepthSourceHost::new();
        let mut field = DepthField::new();
        host.switch(DepthSourceSpec::LiveFace, &mut field);
        host.resize(8, 8, &mut field);
        assert_eq!(host.state(), &SourceState::Pending);

        let white = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let black = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let t0 = Instant::now();

        host.tick(t0, Some(&white), &mut field);
        assert_eq!(host.state(), &SourceState::Ready);
        assert_eq!(field.query(2.0, 2.0), 1.0);

        host.tick(t0 + Duration::from_millis(5), Some(&black), &mut field);
        assert_eq!(field.query(2.0, 2.0), 1.0, "throttled tick must not resample");

        host.tick(t0 + Duration::from_millis(50), Some(&black), &mut field);
        assert_eq!(field.query(2.0, 2.0), 0.0);
    }

    #[test]
    fn switching_clears_previous_depth() {
        let mut host = DepthSourceHost::new();
        let mut field = DepthField::new();
        host.switch(DepthSourceSpec::LiveFace, &mut field);
        host.resize(4, 4, &mut field);
        let white = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        host.tick(Instant::now(), Some(&white), &mut field);
        assert!(field.dimensions().is_some());

        host.switch(
            DepthSourceSpec::Image(PathBuf::from("/no/such/other.png")),
            &mut field,
        );
        assert!(field.dimensions().is_none());
        assert!(!host.is_live_face());
    }
}
