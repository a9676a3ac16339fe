//! Description to comma-separated prompt conversion

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default cap on extracted keywords
pub const DEFAULT_MAX_KEYWORDS: usize = 50;

/// Tags appended when quality tags are requested
pub const QUALITY_TAGS: [&str; 6] = [
    "highly detailed",
    "professional",
    "high quality",
    "8k",
    "sharp focus",
    "masterpiece",
];

/// English and German stopwords
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "been", "being", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "this", "that", "these", "those", "it", "its", "their", "has",
    "have", "had", "does", "do", "did", "will", "would", "can", "could", "should", "may", "might",
    "must", "and", "or", "but", "if", "as", "than", "then", "there", "here", "where", "when",
    "what", "which", "who", "der", "die", "das", "ein", "eine", "ist", "sind", "war", "mit", "auf",
    "von", "zu", "den", "dem", "des",
];

/// Characters treated as word separators besides whitespace
const PUNCTUATION: &[char] = &['.', '!', '?', ',', ';', ':'];

/// Style preset appended after the keywords
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    #[default]
    Default,
    Photography,
    DigitalArt,
    Painting,
    Anime,
    Cinematic,
}

impl Style {
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            Self::Default => &[],
            Self::Photography => &["photography", "photorealistic", "detailed", "bokeh"],
            Self::DigitalArt => &[
                "digital art",
                "digital painting",
                "concept art",
                "trending on artstation",
            ],
            Self::Painting => &["oil painting", "artistic", "painted", "canvas"],
            Self::Anime => &["anime", "anime style", "manga", "cel shaded"],
            Self::Cinematic => &["cinematic", "dramatic lighting", "film grain", "movie scene"],
        }
    }
}

impl std::str::FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "photography" => Ok(Self::Photography),
            "digital_art" => Ok(Self::DigitalArt),
            "painting" => Ok(Self::Painting),
            "anime" => Ok(Self::Anime),
            "cinematic" => Ok(Self::Cinematic),
            other => Err(format!("unknown style '{}'", other)),
        }
    }
}

/// Inputs of the description-to-prompt node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionOptions {
    pub add_quality_tags: bool,
    pub style: Style,
    pub max_keywords: usize,
    pub custom_suffix: String,
}

impl Default for DescriptionOptions {
    fn default() -> Self {
        Self {
            add_quality_tags: true,
            style: Style::Default,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            custom_suffix: String::new(),
        }
    }
}

/// Extract keywords from a description, in first-seen order
///
/// Lower-cases, splits on whitespace and sentence punctuation, drops
/// stopwords and words of two characters or fewer, removes duplicates and
/// keeps at most `max_keywords`.
pub fn extract_keywords(description: &str, max_keywords: usize) -> Vec<String> {
    let text = description.to_lowercase();
    let mut seen = HashSet::new();

    text.split(|c: char| c.is_whitespace() || PUNCTUATION.contains(&c))
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .filter(|word| seen.insert(*word))
        .take(max_keywords)
        .map(str::to_string)
        .collect()
}

/// Turn a free-text description into a comma-separated prompt
pub fn description_to_prompt(description: &str, options: &DescriptionOptions) -> String {
    if description.trim().is_empty() {
        return String::new();
    }

    let mut parts = extract_keywords(description, options.max_keywords);
    parts.extend(options.style.tags().iter().map(|t| t.to_string()));

    if options.add_quality_tags {
        parts.extend(QUALITY_TAGS.iter().map(|t| t.to_string()));
    }

    let suffix = options.custom_suffix.trim();
    if !suffix.is_empty() {
        parts.push(suffix.to_string());
    }

    tracing::debug!(parts = parts.len(), style = ?options.style, "Built prompt");
    parts.join(", ")
}
