//! Heuristic parsers for `lms` text output
//!
//! `lms` prints human-oriented tables, not structured data. Everything here
//! is pure so the heuristics can be tested without a running LM Studio.

/// Minimum length of a name token used for fuzzy "is loaded" matching
const MIN_MATCH_TOKEN_LEN: usize = 5;

/// One row of `lms ls --detailed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub display_name: String,
    pub full_path: String,
}

fn is_listing_header(line: &str) -> bool {
    line.contains("Downloaded models") || line.starts_with('-') || line.starts_with("You have ")
}

/// Parse `lms ls --detailed` into entries, in output order
///
/// The first whitespace-separated token of every non-header line is the
/// model path.
pub fn parse_detailed_listing(stdout: &str) -> Vec<ListingEntry> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_listing_header(line))
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| token.trim_start_matches('/'))
        .filter(|path| !path.is_empty())
        .map(|path| ListingEntry {
            display_name: display_name(path),
            full_path: path.to_string(),
        })
        .collect()
}

/// Derive a display name from a model path: its last two segments
///
/// `lmstudio-community/gemma-3-27b-it-GGUF/gemma-3-27b-it-Q4_K_M.gguf`
/// becomes `gemma-3-27b-it-GGUF/gemma-3-27b-it-Q4_K_M.gguf`.
pub fn display_name(path: &str) -> String {
    let path = path.trim_start_matches('/');
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() >= 2 {
        segments[segments.len() - 2..].join("/")
    } else {
        path.to_string()
    }
}

/// Identifier a chat client uses for a loaded model: the last path segment
pub fn api_name(display_name: &str) -> &str {
    display_name.rsplit('/').next().unwrap_or(display_name)
}

/// Parse `lms ls --detailed` the way the flat selector does
///
/// Only lines starting with `/` count, and only the last path segment is
/// kept.
pub fn parse_model_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| api_name(token.trim_start_matches('/')).to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Parse `lms ps` into the identifiers of loaded models
///
/// The "No models are currently loaded." notice yields an empty list.
pub fn parse_loaded(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.contains("Currently loaded")
                && !line.starts_with('-')
                && !line.to_lowercase().starts_with("no models")
        })
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Whether `lms ps` output mentions the model
///
/// Matches the display name, the resolved path, or any name token longer
/// than four characters.
pub fn output_mentions_model(output: &str, display_name: &str, full_path: &str) -> bool {
    if output.contains(display_name) || output.contains(full_path) {
        return true;
    }

    display_name
        .split(|c: char| c == '/' || c.is_whitespace())
        .filter(|token| token.len() >= MIN_MATCH_TOKEN_LEN)
        .any(|token| {
            let hit = output.contains(token);
            if hit {
                tracing::debug!(token = %token, "Model matched by name token");
            }
            hit
        })
}

/// Whether `lms unload` reported that nothing was loaded
pub fn reports_nothing_loaded(output: &str) -> bool {
    output.to_lowercase().contains("no models loaded")
}

/// Lines of `lms load` output that announce the API identifier
pub fn identifier_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter(|line| line.to_lowercase().contains("identifier") && line.contains('"'))
        .map(str::trim)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILED: &str = "\
You have 3 models, taking up 31.2 GB of disk space.

Downloaded models                                   PARAMS   ARCH     SIZE
------------------------------------------------------------------------------
/lmstudio-community/gemma-3-27b-it-GGUF/gemma-3-27b-it-Q4_K_M.gguf   27B   gemma3   16.5 GB
/Qwen/Qwen2-VL-7B-Instruct-GGUF/qwen2-vl-7b-instruct-q4_k_m.gguf      7B    qwen2vl  4.7 GB
pixtral-12b   12B   pixtral   7.1 GB
";

    #[test]
    fn test_parse_detailed_listing() {
        let entries = parse_detailed_listing(DETAILED);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].full_path,
            "lmstudio-community/gemma-3-27b-it-GGUF/gemma-3-27b-it-Q4_K_M.gguf"
        );
        assert_eq!(
            entries[0].display_name,
            "gemma-3-27b-it-GGUF/gemma-3-27b-it-Q4_K_M.gguf"
        );
        assert_eq!(entries[2].display_name, "pixtral-12b");
        assert_eq!(entries[2].full_path, "pixtral-12b");
    }

    #[test]
    fn test_parse_detailed_listing_empty() {
        assert!(parse_detailed_listing("").is_empty());
        assert!(parse_detailed_listing("\n   \n---\n").is_empty());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("/a/b/c.gguf"), "b/c.gguf");
        assert_eq!(display_name("google/gemma-3-27b"), "google/gemma-3-27b");
        assert_eq!(display_name("llava-v1.5-7b"), "llava-v1.5-7b");
    }

    #[test]
    fn test_api_name() {
        assert_eq!(api_name("google/gemma-3-27b"), "gemma-3-27b");
        assert_eq!(api_name("pixtral-12b"), "pixtral-12b");
    }

    #[test]
    fn test_parse_model_ids_only_absolute_lines() {
        let ids = parse_model_ids(DETAILED);
        assert_eq!(
            ids,
            vec![
                "gemma-3-27b-it-Q4_K_M.gguf".to_string(),
                "qwen2-vl-7b-instruct-q4_k_m.gguf".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_loaded() {
        let ps = "\
Currently loaded models:
-----------------------
gemma-3-27b-it   (identifier: gemma-3-27b-it)

";
        assert_eq!(parse_loaded(ps), vec!["gemma-3-27b-it".to_string()]);
        assert!(parse_loaded("Currently loaded models:\n").is_empty());
        assert!(parse_loaded("No models are currently loaded.\n").is_empty());
    }

    #[test]
    fn test_output_mentions_model() {
        let ps = "Identifier: qwen2-vl-7b-instruct\nType: LLM";
        assert!(output_mentions_model(ps, "qwen2-vl-7b-instruct", "x"));
        assert!(output_mentions_model(
            ps,
            "Qwen/qwen2-vl-7b-instruct",
            "Qwen/Qwen2-VL-7B-Instruct-GGUF/model.gguf"
        ));
        assert!(output_mentions_model("path: a/b/c.gguf", "nope", "a/b/c.gguf"));
        assert!(!output_mentions_model("No models are currently loaded", "llava-v1.5-7b", "llava-v1.5-7b"));
    }

    #[test]
    fn test_short_tokens_do_not_match() {
        // "gemma" is exactly five characters and may match, "it" never does
        assert!(!output_mentions_model("it is loaded", "foo/it", "foo/it"));
        assert!(output_mentions_model("gemma running", "gemma/x", "gemma/x"));
    }

    #[test]
    fn test_reports_nothing_loaded() {
        assert!(reports_nothing_loaded("No models loaded."));
        assert!(!reports_nothing_loaded("Unloaded 1 model"));
    }

    #[test]
    fn test_identifier_lines() {
        let stderr = "Loading model...\nModel loaded with identifier \"gemma-3-27b-it\"\ndone";
        assert_eq!(
            identifier_lines(stderr),
            vec!["Model loaded with identifier \"gemma-3-27b-it\""]
        );
    }
}
