//! Emphasis tags and default negative prompt

use serde::{Deserialize, Serialize};

/// Appended to the negative prompt when defaults are enabled
pub const DEFAULT_NEGATIVES: [&str; 10] = [
    "blurry",
    "bad quality",
    "low quality",
    "ugly",
    "deformed",
    "disfigured",
    "bad anatomy",
    "watermark",
    "text",
    "signature",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    None,
    Light,
    #[default]
    Medium,
    Strong,
}

impl Emphasis {
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Light => &["detailed", "clear"],
            Self::Medium => &["highly detailed", "intricate", "best quality"],
            Self::Strong => &[
                "extremely detailed",
                "ultra detailed",
                "masterpiece",
                "best quality",
                "award winning",
            ],
        }
    }
}

impl std::str::FromStr for Emphasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "light" => Ok(Self::Light),
            "medium" => Ok(Self::Medium),
            "strong" => Ok(Self::Strong),
            other => Err(format!("unknown emphasis level '{}'", other)),
        }
    }
}

/// Enhanced prompt and negative prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhancedPrompt {
    pub prompt: String,
    pub negative_prompt: String,
}

fn append(base: &str, tags: &[&str]) -> String {
    if tags.is_empty() {
        return base.to_string();
    }
    let tags = tags.join(", ");
    if base.trim().is_empty() {
        tags
    } else {
        format!("{}, {}", base, tags)
    }
}

/// Append emphasis tags and, optionally, the default negatives
pub fn enhance(
    prompt: &str,
    emphasis: Emphasis,
    negative_prompt: &str,
    add_negative_defaults: bool,
) -> EnhancedPrompt {
    let negatives: &[&str] = if add_negative_defaults {
        &DEFAULT_NEGATIVES
    } else {
        &[]
    };

    EnhancedPrompt {
        prompt: append(prompt, emphasis.tags()),
        negative_prompt: append(negative_prompt, negatives),
    }
}
