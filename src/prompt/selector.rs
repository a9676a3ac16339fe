//! Switch between a typed prompt and an image-to-prompt result

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    #[default]
    ManualPrompt,
    Image2prompt,
}

impl std::str::FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_prompt" => Ok(Self::ManualPrompt),
            "image2prompt" => Ok(Self::Image2prompt),
            other => Err(format!("unknown prompt mode '{}'", other)),
        }
    }
}

/// Return exactly one of the two prompts, chosen by `mode`
pub fn select_prompt(
    mode: PromptMode,
    manual_prompt: Option<&str>,
    image2prompt_output: Option<&str>,
) -> String {
    let selected = match mode {
        PromptMode::ManualPrompt => manual_prompt,
        PromptMode::Image2prompt => image2prompt_output,
    };
    selected.unwrap_or_default().to_string()
}
