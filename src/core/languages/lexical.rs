//! Lexical helpers shared by the grammar adapters: comment/string masking,
//! brace matching, line lookup, doc-comment adjacency and call-site scanning.

use std::collections::HashSet;
use std::ops::Range;

use regex::Regex;

/// Comment and string syntax of a language, as far as masking needs it
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
    pub quotes: &'static [u8],
    pub triple_quotes: bool,
    /// Blank `#` directive lines (with `\` continuations)
    pub preprocessor: bool,
    /// Strip `<summary>`-style tags from doc comments
    pub xml_docs: bool,
}

pub const CSHARP_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
    quotes: b"\"'",
    triple_quotes: false,
    preprocessor: true,
    xml_docs: true,
};

pub const CPP_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
    quotes: b"\"'",
    triple_quotes: false,
    preprocessor: true,
    xml_docs: false,
};

pub const SHADER_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
    quotes: b"\"",
    triple_quotes: false,
    preprocessor: true,
    xml_docs: false,
};

pub const PYTHON_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: None,
    quotes: b"\"'",
    triple_quotes: true,
    preprocessor: false,
    xml_docs: false,
};

pub const JAVASCRIPT_SYNTAX: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
    quotes: b"\"'`",
    triple_quotes: false,
    preprocessor: false,
    xml_docs: false,
};

/// Replace comments, string literals and (optionally) preprocessor lines with
/// spaces. Newlines and byte offsets are preserved.
pub fn mask(text: &str, syntax: &CommentSyntax) -> String {
    let bytes = text.as_bytes();
    let n = bytes.len();
    let mut out = bytes.to_vec();
    let blank = |out: &mut Vec<u8>, range: Range<usize>| {
        for j in range {
            if out[j] != b'\n' {
                out[j] = b' ';
            }
        }
    };

    let mut i = 0;
    let mut line_start = true;
    while i < n {
        let b = bytes[i];
        if b == b'\n' {
            line_start = true;
            i += 1;
            continue;
        }

        if syntax.preprocessor && line_start && b == b'#' {
            let mut j = i;
            while j < n {
                if bytes[j] == b'\n' {
                    let continued = j > 0 && bytes[j - 1] == b'\\';
                    if !continued {
                        break;
                    }
                }
                j += 1;
            }
            blank(&mut out, i..j);
            i = j;
            continue;
        }
        if !b.is_ascii_whitespace() {
            line_start = false;
        }

        let rest = &bytes[i..];
        if syntax.line.iter().any(|p| rest.starts_with(p.as_bytes())) {
            let end = memchr_newline(bytes, i);
            blank(&mut out, i..end);
            i = end;
            continue;
        }

        if let Some((open, close)) = syntax.block {
            if rest.starts_with(open.as_bytes()) {
                let end = find_from(bytes, i + open.len(), close.as_bytes())
                    .map(|p| p + close.len())
                    .unwrap_or(n);
                blank(&mut out, i..end);
                i = end;
                continue;
            }
        }

        if syntax.triple_quotes && (rest.starts_with(b"\"\"\"") || rest.starts_with(b"'''")) {
            let delimiter = &rest[..3];
            let end = find_from(bytes, i + 3, delimiter).map(|p| p + 3).unwrap_or(n);
            blank(&mut out, i..end);
            i = end;
            continue;
        }

        if syntax.quotes.contains(&b) {
            let quote = b;
            let start = i;
            i += 1;
            while i < n {
                let c = bytes[i];
                if c == b'\\' {
                    i += 2;
                    continue;
                }
                if c == quote {
                    i += 1;
                    break;
                }
                if c == b'\n' && quote != b'`' {
                    break;
                }
                i += 1;
            }
            let end = i.min(n);
            blank(&mut out, start..end);
            i = end;
            continue;
        }

        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn memchr_newline(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| from + p)
        .unwrap_or(bytes.len())
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() || needle.is_empty() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Offset of the `}` matching the `{` at `open`, if the block is closed
pub fn matching_brace(masked: &str, open: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut depth = 0usize;
    for (offset, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offset to 1-based line number lookup
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

fn is_line_comment(trimmed: &str, syntax: &CommentSyntax) -> bool {
    syntax.line.iter().any(|p| trimmed.starts_with(p))
}

/// Whether `trimmed` opens a block comment that is still open at line end
fn opens_block(trimmed: &str, open: &str, close: &str) -> bool {
    trimmed
        .strip_prefix(open)
        .map_or(false, |rest| !rest.contains(close))
}

fn clean_comment_line(trimmed: &str, syntax: &CommentSyntax) -> String {
    let mut text = trimmed;
    for prefix in ["///", "//!", "//", "/**", "/*", "#!", "#"] {
        if let Some(stripped) = text.strip_prefix(prefix) {
            text = stripped;
            break;
        }
    }
    if let Some(stripped) = text.trim_end().strip_suffix("*/") {
        text = stripped;
    }
    let text = text.trim();
    let text = text.strip_prefix('*').unwrap_or(text).trim();

    if syntax.xml_docs {
        strip_xml_tags(text).trim().to_string()
    } else {
        text.to_string()
    }
}

fn strip_xml_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let is_tag = after
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '/')
            .unwrap_or(false);
        match after.find('>') {
            Some(end) if is_tag => {
                out.push_str(&rest[..start]);
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[..start + 1]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Documentation comment attached to a declaration starting on `row`
/// (0-based): the run of comment lines ending directly above it. A blank line
/// between the comment and the declaration breaks the association.
pub fn doc_comment_before(lines: &[&str], row: usize, syntax: &CommentSyntax) -> Option<String> {
    let mut collected = Vec::new();
    // walking upwards, so a block is entered at its closing line
    let mut in_block = false;
    let mut i = row.min(lines.len());
    while i > 0 {
        i -= 1;
        let trimmed = lines[i].trim();
        if in_block {
            collected.push(clean_comment_line(trimmed, syntax));
            if let Some((open, _)) = syntax.block {
                in_block = !trimmed.contains(open);
            }
            continue;
        }
        if trimmed.is_empty() {
            break;
        }
        if is_line_comment(trimmed, syntax) {
            collected.push(clean_comment_line(trimmed, syntax));
            continue;
        }
        match syntax.block {
            Some((open, _)) if trimmed.starts_with(open) => {
                collected.push(clean_comment_line(trimmed, syntax));
            }
            // code with a trailing comment ends the run
            Some((open, close)) if trimmed.ends_with(close) && !trimmed.contains(open) => {
                collected.push(clean_comment_line(trimmed, syntax));
                in_block = true;
            }
            _ => break,
        }
    }
    if in_block {
        // a `*/` with no opener above it is not a comment run
        return None;
    }
    collected.reverse();
    join_doc_lines(collected)
}

/// Comment block at the very top of a file (leading blank lines allowed)
pub fn leading_comment_block(lines: &[&str], syntax: &CommentSyntax) -> Option<String> {
    let mut collected = Vec::new();
    let mut in_block = false;
    for line in lines {
        let trimmed = line.trim();
        if in_block {
            collected.push(clean_comment_line(trimmed, syntax));
            if let Some((_, close)) = syntax.block {
                in_block = !trimmed.contains(close);
            }
            continue;
        }
        if trimmed.is_empty() {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        let block_start = match syntax.block {
            Some((open, close)) if trimmed.starts_with(open) => {
                in_block = opens_block(trimmed, open, close);
                true
            }
            _ => false,
        };
        if !block_start && !is_line_comment(trimmed, syntax) {
            break;
        }
        if trimmed.starts_with("#!") || trimmed.contains("-*-") {
            continue;
        }
        collected.push(clean_comment_line(trimmed, syntax));
    }
    join_doc_lines(collected)
}

fn join_doc_lines(lines: Vec<String>) -> Option<String> {
    let lines: Vec<String> = lines.into_iter().filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Finds `name(` call patterns in masked source text
pub struct CallScanner {
    pattern: Regex,
    keywords: HashSet<&'static str>,
}

/// Words that introduce a declaration rather than a call
const DECLARING_WORDS: &[&str] = &["def", "function", "class", "struct", "interface", "enum", "fn"];

impl CallScanner {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self {
            pattern: Regex::new(r"(?:\b([A-Za-z_][A-Za-z0-9_]*)[ \t]+)?\b([A-Za-z_][A-Za-z0-9_]*)\s*\(")
                .expect("Invalid call pattern regex"),
            keywords: keywords.iter().copied().collect(),
        }
    }

    /// Distinct callee names in `range` of the masked text with the line of
    /// their first occurrence, in order of appearance
    pub fn scan(&self, masked: &str, range: Range<usize>, index: &LineIndex) -> Vec<(String, usize)> {
        let start = range.start.min(masked.len());
        let end = range.end.min(masked.len());
        let Some(body) = masked.get(start..end) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut calls = Vec::new();
        for caps in self.pattern.captures_iter(body) {
            let Some(name) = caps.get(2) else { continue };
            let preceding = caps.get(1).map(|m| m.as_str());
            if preceding.map_or(false, |w| DECLARING_WORDS.contains(&w)) {
                continue;
            }
            let callee = name.as_str();
            if self.keywords.contains(callee) {
                continue;
            }
            if seen.insert(callee.to_string()) {
                calls.push((callee.to_string(), index.line_of(start + name.start())));
            }
        }
        calls
    }
}

/// Split on commas that are not nested inside `<>`, `()` or `[]`
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth <= 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Collapse runs of whitespace into single spaces
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_preserves_offsets() {
        let source = "int a = 1; // call(x)\n/* b(\n*/ s = \"c(\"; d();\n";
        let masked = mask(source, &CPP_SYNTAX);
        assert_eq!(masked.len(), source.len());
        assert_eq!(masked.matches('\n').count(), source.matches('\n').count());
        assert!(!masked.contains("call"));
        assert!(!masked.contains("b("));
        assert!(!masked.contains("c("));
        assert!(masked.contains("d();"));
    }

    #[test]
    fn test_mask_blanks_preprocessor_lines() {
        let source = "#define WRAP(x) { x }\nvoid f() {}\n";
        let masked = mask(source, &CPP_SYNTAX);
        assert!(!masked.contains("WRAP"));
        assert!(masked.contains("void f() {}"));
    }

    #[test]
    fn test_mask_python_triple_quotes() {
        let source = "def f():\n    \"\"\"Calls g()\n    more\"\"\"\n    h()\n";
        let masked = mask(source, &PYTHON_SYNTAX);
        assert!(!masked.contains("g()"));
        assert!(masked.contains("h()"));
    }

    #[test]
    fn test_matching_brace() {
        let text = "a { b { c } d } e {";
        let open = text.find('{').unwrap();
        assert_eq!(matching_brace(text, open), Some(14));
        let last = text.rfind('{').unwrap();
        assert_eq!(matching_brace(text, last), None);
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(2), 2);
        assert_eq!(index.line_of(3), 2);
        assert_eq!(index.line_of(5), 3);
        assert_eq!(index.line_of(6), 4);
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_doc_comment_adjacency() {
        let source = "/// <summary>\n/// Moves the player.\n/// </summary>\nvoid Move() {}\n\n// detached\n\nvoid Stop() {}\n";
        let lines: Vec<&str> = source.lines().collect();

        assert_eq!(
            doc_comment_before(&lines, 3, &CSHARP_SYNTAX),
            Some("Moves the player.".to_string())
        );
        assert_eq!(doc_comment_before(&lines, 7, &CSHARP_SYNTAX), None);
    }

    #[test]
    fn test_doc_comment_block_style() {
        let source = "/**\n * Adds two numbers.\n * @param a first\n */\nfunction add(a, b) {}\n";
        let lines: Vec<&str> = source.lines().collect();
        assert_eq!(
            doc_comment_before(&lines, 4, &JAVASCRIPT_SYNTAX),
            Some("Adds two numbers.\n@param a first".to_string())
        );
    }

    #[test]
    fn test_continued_expression_is_not_a_comment() {
        let source = "int total = a\n    * b;\nvoid f() {}\n\nint x = 1; /* one */\nvoid g() {}\n";
        let lines: Vec<&str> = source.lines().collect();
        assert_eq!(doc_comment_before(&lines, 2, &CPP_SYNTAX), None);
        assert_eq!(doc_comment_before(&lines, 5, &CPP_SYNTAX), None);
    }

    #[test]
    fn test_stray_block_close_is_not_a_comment() {
        let source = "    * b */\nvoid f() {}\n";
        let lines: Vec<&str> = source.lines().collect();
        assert_eq!(doc_comment_before(&lines, 1, &CPP_SYNTAX), None);
    }

    #[test]
    fn test_leading_block_comment() {
        let source = "/*\n * Player movement.\n */\n#include \"player.h\"\n* not a comment\n";
        let lines: Vec<&str> = source.lines().collect();
        assert_eq!(
            leading_comment_block(&lines, &CPP_SYNTAX),
            Some("Player movement.".to_string())
        );
    }

    #[test]
    fn test_leading_comment_block() {
        let source = "#!/usr/bin/env python\n# Tools for players.\n\nimport os\n";
        let lines: Vec<&str> = source.lines().collect();
        assert_eq!(
            leading_comment_block(&lines, &PYTHON_SYNTAX),
            Some("Tools for players.".to_string())
        );
    }

    #[test]
    fn test_call_scanner_skips_keywords_and_declarations() {
        let scanner = CallScanner::new(&["if", "while", "return"]);
        let body = "{\n  if (ready()) {\n    return move(1) + move(2);\n  }\n  def inner():\n  obj.jump();\n}";
        let index = LineIndex::new(body);
        let calls = scanner.scan(body, 0..body.len(), &index);
        assert_eq!(
            calls,
            vec![
                ("ready".to_string(), 2),
                ("move".to_string(), 3),
                ("jump".to_string(), 6)
            ]
        );
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("public Base<int, float>, IThing , Other"),
            vec!["public Base<int, float>", "IThing", "Other"]
        );
        assert!(split_top_level("  ").is_empty());
    }
}
