#[cfg(test)]
#[path = "annotator_test.rs"]
mod tests;

pub const PROMPT_WIDTH: usize = 70;
const SEPARATOR_WIDTH: usize = 80;

/// Where a generated source file came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    pub prompt: String,
    pub model: String,
}

impl Provenance {
    pub fn new(prompt: &str, model: &str) -> Provenance {
        return Provenance {
            prompt: prompt.to_string(),
            model: model.to_string(),
        };
    }
}

impl Default for Provenance {
    fn default() -> Provenance {
        return Provenance::new("Executed Python code", "N/A");
    }
}

/// A header read back from an annotated source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedHeader {
    pub provenance: Provenance,
    pub block: Option<(usize, usize)>,
    /// Byte offset in the source where the original code starts.
    pub body_start: usize,
}

pub fn comment_prefix(language: &str) -> &'static str {
    if language == "javascript" {
        return "//";
    }

    return "#";
}

fn separator(prefix: &str) -> String {
    return format!("{prefix} {}", "=".repeat(SEPARATOR_WIDTH));
}

/// Greedily packs whitespace separated words into lines of at most `width`
/// characters. A word longer than `width` is never split and gets a line of
/// its own.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = vec![];
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
            continue;
        }

        if current.chars().count() + 1 + word.chars().count() > width {
            lines.push(current);
            current = word.to_string();
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    return lines;
}

/// Prepends the provenance header to `code`. `index` is zero based; the block
/// position is only written when `total` is greater than one. The code is
/// appended untouched.
pub fn annotate(
    code: &str,
    language: &str,
    provenance: &Provenance,
    index: usize,
    total: usize,
) -> String {
    let prefix = comment_prefix(language);
    let separator = separator(prefix);

    let mut res = format!("{separator}\n{prefix} USER PROMPT:\n");
    for line in wrap_words(&provenance.prompt, PROMPT_WIDTH) {
        res += &format!("{prefix} {line}\n");
    }

    res += &format!("{prefix}\n{prefix} MODEL: {}\n", provenance.model);
    if total > 1 {
        res += &format!("{prefix} CODE BLOCK: {} of {total}\n", index + 1);
    }

    res += &format!("{separator}\n\n");
    res += code;

    return res;
}

fn parse_block_position(text: &str) -> Option<(usize, usize)> {
    let (index, total) = text.split_once(" of ")?;
    return Some((
        index.trim().parse::<usize>().ok()?,
        total.trim().parse::<usize>().ok()?,
    ));
}

struct OffsetLines<'a> {
    inner: std::str::SplitInclusive<'a, char>,
    offset: usize,
}

impl<'a> OffsetLines<'a> {
    fn new(source: &'a str) -> OffsetLines<'a> {
        return OffsetLines {
            inner: source.split_inclusive('\n'),
            offset: 0,
        };
    }
}

impl<'a> Iterator for OffsetLines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let line = self.inner.next()?;
        self.offset += line.len();
        return Some(line);
    }
}

/// Reads back a header written by [`annotate`]. Returns `None` when `source`
/// does not start with one.
pub fn parse_header(source: &str, language: &str) -> Option<ParsedHeader> {
    let prefix = comment_prefix(language);
    let separator = format!("{}\n", separator(prefix));
    let mut lines = OffsetLines::new(source);

    if lines.next()? != separator {
        return None;
    }
    if lines.next()? != format!("{prefix} USER PROMPT:\n") {
        return None;
    }

    let mut prompt_lines: Vec<&str> = vec![];
    loop {
        let line = lines.next()?;
        if line == format!("{prefix}\n") {
            break;
        }
        prompt_lines.push(line.strip_prefix(prefix)?.trim());
    }

    let model = lines.next()?
        .strip_prefix(&format!("{prefix} MODEL:"))?
        .trim()
        .to_string();

    let mut line = lines.next()?;
    let mut block = None;
    if let Some(position) = line.strip_prefix(&format!("{prefix} CODE BLOCK:")) {
        block = Some(parse_block_position(position)?);
        line = lines.next()?;
    }

    if line != separator {
        return None;
    }

    // The blank line after the header. An annotated empty block ends right
    // after it.
    if lines.next()? != "\n" {
        return None;
    }

    return Some(ParsedHeader {
        provenance: Provenance::new(&prompt_lines.join(" "), &model),
        block,
        body_start: lines.offset,
    });
}

/// The original code of an annotated source, or the whole source when it
/// carries no header.
pub fn strip_header<'a>(source: &'a str, language: &str) -> &'a str {
    return match parse_header(source, language) {
        Some(header) => &source[header.body_start..],
        None => source,
    };
}
