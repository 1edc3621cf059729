pub mod engine;
pub mod log;
pub mod timeline;
pub mod viseme;
pub mod voice;

pub use engine::{create_engine, EngineKind};
pub use timeline::{SpeechOutcome, SpeechTimeline};
pub use viseme::VisemeEvent;
pub use voice::Language;
