// --- Character to mouth-shape classification ---

/// Mouth-shape categories carried by viseme events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viseme {
    A,
    E,
    I,
    O,
    U,
    M,
    F,
    S,
    T,
    K,
    R,
    W,
    L,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phoneme {
    P,
    B,
    M,
    F,
    V,
    AA,
    AE,
    AH,
    EH,
    ER,
    EY,
    OW,
    AO,
    UW,
    UH,
    IY,
    IH,
    W,
    Y,
    L,
    R,
    S,
    Z,
    SH,
    ZH,
    TH,
    DH,
    T,
    D,
    N,
    K,
    G,
    SIL,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeShape {
    pub viseme: Viseme,
    pub energy: f32,
    pub width: f32,
    pub height: f32,
    pub duration_ms: u32,
}

const fn shape(viseme: Viseme, energy: f32, width: f32, height: f32, duration_ms: u32) -> VisemeShape {
    VisemeShape {
        viseme,
        energy,
        width,
        height,
        duration_ms,
    }
}

impl Phoneme {
    /// Tuned mouth shape for each phoneme. Values are load-bearing.
    pub const fn shape(self) -> VisemeShape {
        use Viseme as V;
        match self {
            Self::P => shape(V::M, 0.15, 0.3, 0.1, 80),
            Self::B => shape(V::M, 0.20, 0.3, 0.1, 80),
            Self::M => shape(V::M, 0.25, 0.3, 0.15, 100),
            Self::F => shape(V::F, 0.40, 0.4, 0.3, 90),
            Self::V => shape(V::F, 0.45, 0.4, 0.3, 90),
            Self::AA => shape(V::A, 0.95, 0.7, 0.9, 150),
            Self::AE => shape(V::A, 0.85, 0.8, 0.7, 140),
            Self::AH => shape(V::A, 0.75, 0.6, 0.6, 120),
            Self::EH => shape(V::E, 0.70, 0.6, 0.5, 130),
            Self::ER => shape(V::E, 0.65, 0.5, 0.4, 140),
            Self::EY => shape(V::E, 0.75, 0.7, 0.5, 150),
            Self::OW => shape(V::O, 0.85, 0.5, 0.8, 160),
            Self::AO => shape(V::O, 0.80, 0.5, 0.7, 140),
            Self::UW => shape(V::U, 0.75, 0.4, 0.6, 150),
            Self::UH => shape(V::U, 0.65, 0.4, 0.5, 130),
            Self::IY => shape(V::I, 0.70, 0.7, 0.4, 140),
            Self::IH => shape(V::I, 0.65, 0.6, 0.3, 120),
            Self::W => shape(V::W, 0.55, 0.4, 0.5, 90),
            Self::Y => shape(V::I, 0.60, 0.6, 0.3, 80),
            Self::L => shape(V::L, 0.45, 0.5, 0.4, 100),
            Self::R => shape(V::R, 0.55, 0.5, 0.5, 110),
            Self::S => shape(V::S, 0.50, 0.5, 0.3, 100),
            Self::Z => shape(V::S, 0.50, 0.5, 0.3, 100),
            Self::SH => shape(V::S, 0.55, 0.4, 0.4, 110),
            Self::ZH => shape(V::S, 0.55, 0.4, 0.4, 110),
            Self::TH => shape(V::T, 0.40, 0.5, 0.3, 90),
            Self::DH => shape(V::T, 0.40, 0.5, 0.3, 90),
            Self::T => shape(V::T, 0.35, 0.4, 0.2, 70),
            Self::D => shape(V::T, 0.40, 0.4, 0.2, 70),
            Self::N => shape(V::T, 0.45, 0.4, 0.3, 100),
            Self::K => shape(V::K, 0.50, 0.5, 0.4, 80),
            Self::G => shape(V::K, 0.50, 0.5, 0.4, 80),
            Self::SIL => shape(V::M, 0.05, 0.3, 0.1, 50),
        }
    }

    #[cfg(test)]
    pub const ALL: [Phoneme; 33] = [
        Self::P,
        Self::B,
        Self::M,
        Self::F,
        Self::V,
        Self::AA,
        Self::AE,
        Self::AH,
        Self::EH,
        Self::ER,
        Self::EY,
        Self::OW,
        Self::AO,
        Self::UW,
        Self::UH,
        Self::IY,
        Self::IH,
        Self::W,
        Self::Y,
        Self::L,
        Self::R,
        Self::S,
        Self::Z,
        Self::SH,
        Self::ZH,
        Self::TH,
        Self::DH,
        Self::T,
        Self::D,
        Self::N,
        Self::K,
        Self::G,
        Self::SIL,
    ];
}

/// Closed, silent mouth used for whitespace.
pub const SILENT_SHAPE: VisemeShape = shape(Viseme::M, 0.0, 0.3, 0.1, 50);

pub fn is_cjk(ch: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&ch)
}

/// Characters that only advance the speech clock: whitespace and
/// punctuation. Math and currency symbols are spoken like letters.
pub fn is_pause(ch: char) -> bool {
    ch.is_whitespace()
        || (ch.is_ascii_punctuation() && !matches!(ch, '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~'))
        || matches!(ch,
            '\u{2010}'..='\u{2027}'
            | '\u{3001}'..='\u{3003}'
            | '\u{3008}'..='\u{3011}'
            | '\u{3014}'..='\u{301F}'
            | '\u{3030}' | '\u{303D}'
            | '\u{FF01}'..='\u{FF03}'
            | '\u{FF05}'..='\u{FF0A}'
            | '\u{FF0C}'..='\u{FF0F}'
            | '\u{FF1A}' | '\u{FF1B}' | '\u{FF1F}' | '\u{FF20}'
            | '\u{FF3B}'..='\u{FF3D}'
            | '\u{FF3F}' | '\u{FF5B}' | '\u{FF5D}'
            | '\u{FF5F}'..='\u{FF65}'
            | '\u{00A1}' | '\u{00A7}' | '\u{00AB}' | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}')
}

/// Letter-level grapheme to phoneme guess. `next` disambiguates diphthongs.
pub fn char_to_phoneme(ch: char, next: Option<char>) -> Phoneme {
    if ch.is_whitespace() {
        return Phoneme::SIL;
    }
    let lower = ch.to_lowercase().next().unwrap_or(ch);

    match lower {
        'p' => Phoneme::P,
        'b' => Phoneme::B,
        'm' => Phoneme::M,
        'f' => Phoneme::F,
        'v' => Phoneme::V,
        'w' => Phoneme::W,
        'y' => Phoneme::Y,
        'l' => Phoneme::L,
        'r' => Phoneme::R,
        's' => Phoneme::S,
        'z' => Phoneme::Z,
        't' => Phoneme::T,
        'd' => Phoneme::D,
        'n' => Phoneme::N,
        'k' => Phoneme::K,
        'g' => Phoneme::G,
        'a' if matches!(next, Some('i' | 'u')) => Phoneme::EY,
        'a' => Phoneme::AA,
        'e' if matches!(next, Some('i' | 'y')) => Phoneme::EY,
        'e' => Phoneme::EH,
        'i' => Phoneme::IY,
        'o' => Phoneme::OW,
        'u' => Phoneme::UW,
        'ā' | 'á' | 'ǎ' | 'à' => Phoneme::AA,
        'ē' | 'é' | 'ě' | 'è' => Phoneme::EH,
        'ī' | 'í' | 'ǐ' | 'ì' => Phoneme::IY,
        'ō' | 'ó' | 'ǒ' | 'ò' => Phoneme::OW,
        'ū' | 'ú' | 'ǔ' | 'ù' | 'ü' => Phoneme::UW,
        _ => Phoneme::AH,
    }
}

/// Blend 20% of the previous shape, then 10% of the next one, in that order.
pub fn coarticulate(
    current: VisemeShape,
    prev: Option<VisemeShape>,
    next: Option<VisemeShape>,
) -> VisemeShape {
    let mut out = current;
    if let Some(p) = prev {
        out.energy = out.energy * 0.8 + p.energy * 0.2;
        out.width = out.width * 0.8 + p.width * 0.2;
        out.height = out.height * 0.8 + p.height * 0.2;
    }
    if let Some(n) = next {
        out.energy = out.energy * 0.9 + n.energy * 0.1;
        out.width = out.width * 0.9 + n.width * 0.1;
        out.height = out.height * 0.9 + n.height * 0.1;
    }
    out
}

/// Coarse code-point bucketing for Han characters. There is no phonetic
/// basis here; downstream energy tuning depends on it as-is.
fn classify_cjk(ch: char) -> VisemeShape {
    let bucket = ch as u32 % 100;
    if ch == '口' || bucket < 20 {
        shape(Viseme::A, 0.78, 0.85, 0.78, 120)
    } else if ch == '舌' || bucket < 40 {
        shape(Viseme::E, 0.68, 0.75, 0.60, 120)
    } else if ch == '目' || bucket < 60 {
        shape(Viseme::I, 0.65, 0.80, 0.52, 120)
    } else if ch == '刀' || bucket < 80 {
        shape(Viseme::S, 0.55, 0.65, 0.45, 120)
    } else {
        shape(Viseme::A, 0.70, 0.75, 0.68, 120)
    }
}

/// Shape for one character with neighbour coarticulation.
///
/// Neighbours are classified on their own (no further context), so a Han
/// or symbol neighbour contributes the neutral schwa shape and whitespace
/// contributes silence.
pub fn classify(ch: char, prev: Option<char>, next: Option<char>) -> VisemeShape {
    if ch.is_whitespace() {
        return SILENT_SHAPE;
    }
    if is_cjk(ch) {
        return classify_cjk(ch);
    }
    let current = char_to_phoneme(ch, next).shape();
    let prev = prev.map(|c| char_to_phoneme(c, None).shape());
    let next = next.map(|c| char_to_phoneme(c, None).shape());
    coarticulate(current, prev, next)
}

/// Context-free shape, used when building a timed schedule up front.
pub fn classify_isolated(ch: char) -> VisemeShape {
    if ch.is_whitespace() {
        return SILENT_SHAPE;
    }
    if is_cjk(ch) {
        return classify_cjk(ch);
    }
    char_to_phoneme(ch, None).shape()
}

/// One mouth-shape update travelling from the speech timeline to the face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeEvent {
    pub viseme: Viseme,
    pub energy: f32,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl VisemeEvent {
    pub fn new(viseme: Viseme, energy: f32) -> Self {
        Self {
            viseme,
            energy,
            width: None,
            height: None,
        }
    }

    pub fn closed() -> Self {
        Self::new(Viseme::M, 0.0)
    }
}

impl From<VisemeShape> for VisemeEvent {
    fn from(s: VisemeShape) -> Self {
        Self {
            viseme: s.viseme,
            energy: s.energy,
            width: Some(s.width),
            height: Some(s.height),
        }
    }
}
