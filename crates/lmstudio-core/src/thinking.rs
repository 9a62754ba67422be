//! Separation of `<think>...</think>` reasoning blocks from the visible answer.

use once_cell::sync::Lazy;
use regex::Regex;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

// Lazy match: each opening tag pairs with the nearest closing tag after it.
static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("valid think-block regex"));

static BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n+").expect("valid blank-run regex"));

/// Text split into the model's reasoning and the answer meant for the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingSplit {
    pub thinking: String,
    pub visible: String,
}

impl ThinkingSplit {
    pub fn has_thinking(&self) -> bool {
        !self.thinking.is_empty()
    }
}

/// Split `text` into thinking and visible parts.
///
/// Every matched block is removed from the visible text. Each block's contents
/// are trimmed and joined with a single newline into the thinking text. An
/// opening tag with no closing tag is left in the visible text as-is.
pub fn split(text: &str) -> ThinkingSplit {
    let segments: Vec<&str> = THINK_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .collect();

    if segments.is_empty() {
        return ThinkingSplit {
            thinking: String::new(),
            visible: text.trim().to_string(),
        };
    }

    let thinking = segments.join("\n");
    let remainder = THINK_BLOCK.replace_all(text, "");
    let visible = BLANK_RUN.replace_all(&remainder, "\n").trim().to_string();

    ThinkingSplit { thinking, visible }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block() {
        let result = split("<think>carry the 1</think>Result is 42");
        assert_eq!(result.thinking, "carry the 1");
        assert_eq!(result.visible, "Result is 42");
        assert!(result.has_thinking());
    }

    #[test]
    fn test_no_markers() {
        let result = split("  The capital of France is Paris.\n");
        assert_eq!(result.thinking, "");
        assert_eq!(result.visible, "The capital of France is Paris.");
        assert!(!result.has_thinking());
    }

    #[test]
    fn test_multiple_blocks_joined_in_order() {
        let text = "<think>\nfirst step\n</think>\nPart one.\n\n\n<think>second step</think>\n\nPart two.";
        let result = split(text);
        assert_eq!(result.thinking, "first step\nsecond step");
        assert_eq!(result.visible, "Part one.\nPart two.");
        assert!(!result.visible.contains(THINK_OPEN));
        assert!(!result.visible.contains(THINK_CLOSE));
    }

    #[test]
    fn test_padded_blocks_separated_by_single_newline() {
        let result = split("<think>\nfirst\n</think>A<think>\nsecond\n</think>B");
        assert_eq!(result.thinking, "first\nsecond");
        assert_eq!(result.visible, "AB");
    }

    #[test]
    fn test_multiline_thinking() {
        let text = "<think>\nThe sky scatters blue light.\nRayleigh scattering.\n</think>\n\nThe sky is blue because of Rayleigh scattering.";
        let result = split(text);
        assert_eq!(result.thinking, "The sky scatters blue light.\nRayleigh scattering.");
        assert_eq!(result.visible, "The sky is blue because of Rayleigh scattering.");
    }

    #[test]
    fn test_unmatched_open_marker_is_kept() {
        let text = "Answer first. <think>never closed";
        let result = split(text);
        assert_eq!(result.thinking, "");
        assert_eq!(result.visible, text);
    }

    #[test]
    fn test_unmatched_open_after_block_is_kept() {
        let result = split("<think>a</think>Visible <think>dangling");
        assert_eq!(result.thinking, "a");
        assert_eq!(result.visible, "Visible <think>dangling");
    }

    #[test]
    fn test_nested_open_pairs_with_nearest_close() {
        let result = split("<think>a<think>b</think>c</think>d");
        assert_eq!(result.thinking, "a<think>b");
        assert_eq!(result.visible, "c</think>d");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(split(""), ThinkingSplit::default());
    }

    #[test]
    fn test_idempotent_on_visible_text() {
        let inputs = [
            "<think>x</think>\n\n\nHello\n\n\nWorld",
            "plain text",
            "<think>open only",
            "<think>a</think><think>b</think>",
        ];
        for input in inputs {
            let first = split(input);
            let second = split(&first.visible);
            assert_eq!(second.visible, first.visible, "input: {input:?}");
            assert_eq!(second.thinking, "", "input: {input:?}");
        }
    }

    #[test]
    fn test_n_well_formed_blocks() {
        for n in 0..5 {
            let mut text = String::new();
            let mut expected = Vec::new();
            for i in 0..n {
                text.push_str(&format!("<think>step {i}</think>line {i}\n"));
                expected.push(format!("step {i}"));
            }
            let result = split(&text);
            assert_eq!(result.thinking, expected.join("\n"));
            assert_eq!(result.visible.matches(THINK_OPEN).count(), 0);
            assert_eq!(result.visible.matches(THINK_CLOSE).count(), 0);
        }
    }
}
