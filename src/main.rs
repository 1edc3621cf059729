use clap::Parser;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;

mod config;
mod depth;
mod error;
mod face;
mod input;
mod math;
mod rain;
mod render;
mod speech;
mod telemetry;
mod terminal_setup;

use config::{GlyphSet, RainConfig};
use depth::source::{load_image, DepthSourceHost, DepthSourceSpec};
use depth::DepthField;
use error::AppResult;
use face::procedural::{generate_demo_face, DEMO_FACE_SIZE};
use face::{detect_mouth_region, FaceWarpRenderer, MouthRegion, FULL_FPS, LITE_FPS};
use rain::canvas::CellCanvas;
use rain::RainSimulation;
use render::frame::run_app_loop;
use render::AppState;
use speech::log::{parse_day, TtsLog};
use speech::{create_engine, EngineKind, Language, SpeechTimeline};
use terminal_setup::{cleanup_terminal, enter_terminal, install_panic_hook};

const DEFAULT_SAY: &str = "Form is emptiness, emptiness is form. 色不异空，空不异色。";

#[derive(Debug, Parser)]
#[command(
    name = "depthrain",
    version,
    about = "Depth-modulated digital rain with a talking-face depth source"
)]
struct Cli {
    /// JSON rain config; flags below override its fields
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, help = "Fall speed [default: 2.6]")]
    speed: Option<f32>,
    #[arg(long, help = "Column density, 0.2..1.8 [default: 1.25]")]
    density: Option<f32>,
    #[arg(long, help = "Glyph size in px [default: 16]")]
    font_size: Option<f32>,
    #[arg(long, help = "Glow behind the head, 0..1 [default: 0.5]")]
    glow: Option<f32>,
    #[arg(long, help = "Trail length factor [default: 0.8]")]
    trail: Option<f32>,
    #[arg(long, help = "Trail persistence, 0..1 [default: 0.5]")]
    persistence: Option<f32>,
    #[arg(long, help = "Glyph change rate [default: 0.6]")]
    glyph_speed: Option<f32>,
    #[arg(long, help = "Depth influence on glyph size [default: 0.9]")]
    depth_influence: Option<f32>,
    #[arg(long, help = "Trail hue in degrees [default: 140]")]
    color_hue: Option<f32>,
    #[arg(long, help = "Glyph set [default: Heart Sutra characters]")]
    glyphs: Option<String>,

    /// Depth source: image path, video path or "tts-live-face". Repeat to
    /// build a list cycled with `n`.
    #[arg(long = "depth", value_name = "SOURCE")]
    depth: Vec<String>,

    #[arg(long, value_enum, default_value_t = EngineKind::Auto)]
    engine: EngineKind,
    /// Let the simulated engine fire per-character boundary events
    #[arg(long)]
    sim_boundaries: bool,
    #[arg(long, value_enum, default_value_t = Language::Auto)]
    language: Language,
    /// Text spoken when `s` is pressed
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_SAY)]
    say: String,
    /// Speak `--say` once at startup
    #[arg(long)]
    say_now: bool,

    /// Face photo for the talking head (procedural face if omitted)
    #[arg(long, value_name = "IMAGE")]
    face: Option<PathBuf>,
    /// Mouth region in photo pixels: cx,cy,w,h
    #[arg(long, value_name = "CX,CY,W,H", conflicts_with = "detect_mouth")]
    mouth: Option<String>,
    /// Locate the mouth automatically from the photo
    #[arg(long)]
    detect_mouth: bool,
    /// Halve the face render rate
    #[arg(long)]
    lite: bool,
    /// Directory for face snapshots
    #[arg(long, value_name = "DIR", default_value = ".")]
    snapshot_dir: PathBuf,

    /// Keep a daily JSON log of spoken text in DIR
    #[arg(long, value_name = "DIR")]
    tts_log_dir: Option<PathBuf>,
    /// Print the speech log for YYYY-MM-DD and exit
    #[arg(long, value_name = "DATE")]
    dump_log: Option<String>,

    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn build_config(cli: &Cli) -> AppResult<RainConfig> {
    let mut cfg = match cli.config.as_deref() {
        Some(path) => RainConfig::load(path)?,
        None => RainConfig::default(),
    };
    let overrides = [
        (cli.speed, &mut cfg.speed),
        (cli.density, &mut cfg.density),
        (cli.font_size, &mut cfg.font_size),
        (cli.glow, &mut cfg.glow),
        (cli.trail, &mut cfg.trail),
        (cli.persistence, &mut cfg.persistence),
        (cli.glyph_speed, &mut cfg.glyph_speed),
        (cli.depth_influence, &mut cfg.depth_influence),
        (cli.color_hue, &mut cfg.color_hue),
    ];
    for (value, field) in overrides {
        if let Some(v) = value {
            *field = v;
        }
    }
    if let Some(glyphs) = cli.glyphs.as_deref() {
        cfg.glyphs = GlyphSet::new(glyphs);
    }
    if let Some(first) = cli.depth.first() {
        cfg.depth_url = first.clone();
    }
    Ok(cfg)
}

fn depth_sources(cli: &Cli, cfg: &RainConfig) -> Vec<DepthSourceSpec> {
    if cli.depth.is_empty() {
        return vec![DepthSourceSpec::parse(&cfg.depth_url)];
    }
    cli.depth.iter().map(|raw| DepthSourceSpec::parse(raw)).collect()
}

fn load_face(cli: &Cli) -> AppResult<(image::RgbaImage, MouthRegion)> {
    let photo = match cli.face.as_deref() {
        Some(path) => load_image(path)?,
        None => generate_demo_face(DEMO_FACE_SIZE.0, DEMO_FACE_SIZE.1),
    };
    let (w, h) = photo.dimensions();
    let region = if let Some(raw) = cli.mouth.as_deref() {
        MouthRegion::parse(raw)?
    } else if cli.detect_mouth {
        detect_mouth_region(&photo).unwrap_or_else(|| {
            tracing::info!("mouth not found; using default placement");
            MouthRegion::default_for(w, h)
        })
    } else {
        MouthRegion::default_for(w, h)
    };
    Ok((photo, region))
}

fn dump_log(dir: &Path, raw_day: &str) -> AppResult<()> {
    let day = parse_day(raw_day)?;
    let entries = TtsLog::new(dir).read_day(day)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_file.as_deref(), &cli.log_level)?;

    if let Some(day) = cli.dump_log.as_deref() {
        let dir = cli.tts_log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        return dump_log(&dir, day);
    }

    let config = build_config(&cli)?;
    let source_specs = depth_sources(&cli, &config);
    let (photo, region) = load_face(&cli)?;
    let max_fps = if cli.lite { LITE_FPS } else { FULL_FPS };

    let (viseme_tx, viseme_rx) = mpsc::channel();
    let mut speech = SpeechTimeline::new(
        create_engine(cli.engine, cli.sim_boundaries),
        cli.language,
        viseme_tx,
    );
    if let Some(dir) = cli.tts_log_dir.as_deref() {
        speech = speech.with_log(TtsLog::new(dir));
    }

    let (cols, rows) = crossterm::terminal::size().unwrap_or((120, 40));
    let mut app_state = AppState {
        config,
        rain: RainSimulation::new(),
        canvas: CellCanvas::new(cols.max(1) as usize, rows.max(1) as usize),
        depth: DepthField::new(),
        sources: DepthSourceHost::new(),
        source_specs,
        source_index: 0,
        speech,
        viseme_rx,
        face: FaceWarpRenderer::new(photo, region, max_fps),
        say_text: cli.say.clone(),
        snapshot_dir: cli.snapshot_dir.clone(),
        status: None,
        hud_string_buf: String::with_capacity(512),
        input_state: input::state::InputState::default(),
        show_hud: true,
        show_face: true,
        paused: false,
        frame_count: 0,
        last_frame_time: Instant::now(),
        fps: 0.0,
        use_truecolor: render::detect_truecolor(),
    };
    tracing::info!(region = ?app_state.face.region(), "face ready");
    app_state.select_source(0);
    if cli.say_now {
        if let Err(err) = app_state.speech.speak(&cli.say, Instant::now()) {
            tracing::warn!(%err, "startup speech rejected");
            app_state.set_status(err.to_string());
        }
    }

    install_panic_hook();
    let mut stdout = BufWriter::with_capacity(1024 * 1024, io::stdout());
    enter_terminal(&mut stdout)?;
    let input_rx = input::thread::spawn_input_thread();

    let run_result = run_app_loop(&mut app_state, &input_rx, &mut stdout);
    let cleanup_result = cleanup_terminal(&mut stdout);

    tracing::info!(frames = app_state.frame_count, "exiting");
    run_result?;
    cleanup_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::parse_from(["depthrain", "--speed", "4", "--glyphs", "01", "--depth", "a.png", "--depth", "clip.MP4"]);
        let cfg = build_config(&cli).expect("config");
        assert_eq!(cfg.speed, 4.0);
        assert_eq!(cfg.density, RainConfig::default().density);
        assert_eq!(cfg.glyphs, GlyphSet::new("01"));
        assert_eq!(cfg.depth_url, "a.png");
        let specs = depth_sources(&cli, &cfg);
        assert_eq!(specs.len(), 2);
        assert!(matches!(specs[1], DepthSourceSpec::Video(_)));
    }

    #[test]
    fn default_source_is_the_live_face() {
        let cli = Cli::parse_from(["depthrain"]);
        let cfg = build_config(&cli).expect("config");
        assert_eq!(depth_sources(&cli, &cfg), vec![DepthSourceSpec::LiveFace]);
    }

    #[test]
    fn mouth_flag_and_detection_conflict() {
        assert!(Cli::try_parse_from(["depthrain", "--mouth", "1,2,3,4", "--detect-mouth"]).is_err());
        let cli = Cli::parse_from(["depthrain", "--mouth", "100,200,40,20"]);
        let (_, region) = load_face(&cli).expect("face");
        assert_eq!(region.cx, 100.0);
    }

    #[test]
    fn procedural_face_uses_default_region() {
        let cli = Cli::parse_from(["depthrain", "--detect-mouth"]);
        let (photo, region) = load_face(&cli).expect("face");
        assert_eq!(photo.dimensions(), DEMO_FACE_SIZE);
        let default = MouthRegion::default_for(DEMO_FACE_SIZE.0, DEMO_FACE_SIZE.1);
        assert!((region.cy - default.cy).abs() < 6.0);
    }

    #[test]
    fn dump_of_an_empty_day_succeeds() {
        let dir = std::env::temp_dir().join(format!("depthrain-dump-{}", std::process::id()));
        dump_log(&dir, "2024-03-01").expect("missing file is an empty day");
        assert!(dump_log(&dir, "yesterday").is_err());
    }
}
