use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::viseme::is_cjk;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub lang: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Auto,
    En,
    Zh,
}

impl Language {
    /// Resolve `Auto` against the text; explicit choices pass through.
    pub fn resolve(self, text: &str) -> Language {
        match self {
            Language::Auto if prefers_chinese(text) => Language::Zh,
            Language::Auto => Language::En,
            other => other,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::Zh => "zh-CN",
            Language::En | Language::Auto => "en-US",
        }
    }
}

/// Chinese wins once Han characters make up more than 30% of the text.
pub fn prefers_chinese(text: &str) -> bool {
    let total = text.chars().count();
    let han = text.chars().filter(|&c| is_cjk(c)).count();
    han > 0 && han * 10 > total * 3
}

const DIALECT_HINTS: &[&str] = &[
    "Cantonese",
    "cantonese",
    "粤语",
    "Yue",
    "Wu",
    "吴",
    "Min",
    "闽",
    "Hakka",
    "客家",
    "Northeast",
    "东北",
];
const FEMALE_HINTS: &[&str] = &["Female", "woman", "female"];
const MANDARIN_HINTS: &[&str] = &["Mandarin", "mandarin", "普通话"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_male(v: &Voice) -> bool {
    v.name.contains("Male") || v.name.contains("man")
}

fn is_vendor(v: &Voice) -> bool {
    v.name.contains("Google") || v.name.contains("Microsoft")
}

/// Mandarin candidates: a zh locale, no female hint, no dialect hint.
fn is_mandarin_candidate(v: &Voice) -> bool {
    v.lang.contains("zh") && !contains_any(&v.name, FEMALE_HINTS) && !contains_any(&v.name, DIALECT_HINTS)
}

fn select_chinese(voices: &[Voice]) -> Option<&Voice> {
    let passes = |v: &&Voice| is_mandarin_candidate(v);
    voices
        .iter()
        .filter(passes)
        .find(|v| (contains_any(&v.name, MANDARIN_HINTS) || v.lang == "zh-CN") && is_male(v))
        .or_else(|| voices.iter().filter(passes).find(|v| v.lang == "zh-CN" && is_male(v)))
        .or_else(|| voices.iter().filter(passes).find(|v| is_vendor(v) && is_male(v)))
        .or_else(|| voices.iter().filter(passes).find(|v| is_male(v)))
        .or_else(|| voices.iter().find(|v| is_mandarin_candidate(v)))
}

fn select_english(voices: &[Voice]) -> Option<&Voice> {
    const NAMED_MALE: &[&str] = &["Male", "man", "David", "Mark"];
    voices
        .iter()
        .find(|v| is_vendor(v) && v.lang.contains("en") && contains_any(&v.name, NAMED_MALE))
        .or_else(|| voices.iter().find(|v| v.lang.contains("en") && !v.name.contains("Female")))
        .or_else(|| voices.iter().find(|v| v.lang.contains("en")))
}

/// Pick a voice for an already-resolved language. `None` means the engine
/// default; an empty list is not an error.
pub fn select_voice(voices: &[Voice], language: Language) -> Option<&Voice> {
    let picked = match language {
        Language::Zh => select_chinese(voices),
        Language::En | Language::Auto => select_english(voices),
    };
    picked.or_else(|| voices.first())
}
