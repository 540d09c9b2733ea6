#[cfg(test)]
#[path = "code_block_test.rs"]
mod tests;

use once_cell::sync::Lazy;
use regex::Regex;

// Body is non-greedy so consecutive fences stay separate blocks. The fence does
// not need to start a line.
static FENCE: Lazy<Regex> =
    Lazy::new(|| return Regex::new(r"(?s)```(python|javascript)\n(.*?)\n```").unwrap());

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

impl CodeBlock {
    pub fn new(language: &str, code: &str) -> CodeBlock {
        return CodeBlock {
            language: language.to_string(),
            code: code.to_string(),
        };
    }

    pub fn python(code: &str) -> CodeBlock {
        return CodeBlock::new("python", code);
    }
}

/// Returns every fenced `python` or `javascript` block in `text`, in the order
/// they appear. Fences with any other language, or none at all, are skipped.
pub fn extract_code(text: &str) -> Vec<CodeBlock> {
    return FENCE
        .captures_iter(text)
        .map(|caps| {
            return CodeBlock::new(&caps[1], &caps[2]);
        })
        .collect();
}
