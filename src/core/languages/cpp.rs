use std::path::Path;

use regex::Regex;

use crate::error::Result;
use super::lexical::{self, CallScanner, LineIndex, CPP_SYNTAX};
use super::{Capabilities, LanguageAdapter};
use crate::core::model::{
    Declaration, FunctionToken, ImportToken, LineSpan, MemberKind, MemberToken,
    RawToken, TokenStream, TypeKind, TypeToken, Visibility,
};

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "sizeof", "alignof", "decltype",
    "static_assert", "typeid", "noexcept", "new", "delete", "throw", "defined", "operator",
    "template", "typename", "do", "else", "case", "default",
];

const NON_FUNCTION_NAMES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "sizeof", "decltype", "static_assert",
    "alignas", "alignof", "noexcept", "throw",
];

const SPECIFIERS: &[&str] = &[
    "virtual", "static", "inline", "explicit", "constexpr", "consteval", "friend", "extern",
    "mutable", "volatile", "register",
];

/// C++ adapter built on a brace-aware lexical scanner
pub struct CppAdapter {
    calls: CallScanner,
    namespace_header: Regex,
    linkage_header: Regex,
    type_header: Regex,
    enum_header: Regex,
    forward_declaration: Regex,
    field_declarator: Regex,
    include: Regex,
}

/// Enclosing type while scanning a class body
#[derive(Clone)]
struct TypeContext {
    index: usize,
    name: String,
    default_visibility: Visibility,
}

/// Per-file scanning state
struct CppScan<'a> {
    source: &'a str,
    masked: String,
    lines: Vec<&'a str>,
    index: LineIndex,
    tokens: TokenStream,
}

impl CppScan<'_> {
    fn line(&self, offset: usize) -> usize {
        self.index.line_of(offset)
    }

    fn docs_at(&self, offset: usize) -> Option<String> {
        lexical::doc_comment_before(&self.lines, self.line(offset) - 1, &CPP_SYNTAX)
    }
}

impl CppAdapter {
    pub fn new() -> Self {
        Self {
            calls: CallScanner::new(CALL_KEYWORDS),
            namespace_header: Regex::new(r"^(?:inline\s+)?namespace\b\s*([A-Za-z_][\w:\s]*)?$")
                .expect("Invalid namespace regex"),
            linkage_header: Regex::new(r"^extern\s*$").expect("Invalid linkage regex"),
            type_header: Regex::new(
                r"(?s)^(?:typedef\s+)?(?:template\s*<.*>\s*)?(class|struct|union)\s+(?:[A-Za-z_]\w*\s+)*?([A-Za-z_]\w*)\s*(?:final\s*)?(?::\s*(.+))?$",
            )
            .expect("Invalid type header regex"),
            enum_header: Regex::new(
                r"(?s)^(?:typedef\s+)?enum\s+(?:class\s+|struct\s+)?([A-Za-z_]\w*)\s*(?::\s*[\w:\s]+)?$",
            )
            .expect("Invalid enum header regex"),
            forward_declaration: Regex::new(r"^(?:class|struct|union|enum(?:\s+class)?)\s+[A-Za-z_]\w*$")
                .expect("Invalid forward declaration regex"),
            field_declarator: Regex::new(
                r"(?s)^(.+?[\w>\]*&])[\s*&]+([A-Za-z_]\w*)\s*(?:\[[^\]]*\])*\s*(?::\s*\d+)?\s*(?:=.*|\{.*\})?$",
            )
            .expect("Invalid field regex"),
            include: Regex::new(r#"(?m)^\s*#\s*include\s*[<"]([^>"]+)[>"]"#)
                .expect("Invalid include regex"),
        }
    }

    /// Scan `start..end` of the masked text at one nesting level
    fn scan_region(
        &self,
        scan: &mut CppScan,
        start: usize,
        end: usize,
        scope: &[String],
        owner: Option<&TypeContext>,
    ) {
        let mut visibility = owner.map(|o| o.default_visibility).unwrap_or(Visibility::Public);
        let mut pos = start;
        let mut header_start = start;

        while pos < end {
            let byte = scan.masked.as_bytes()[pos];
            match byte {
                b';' => {
                    self.statement(scan, header_start, pos, scope, owner, visibility);
                    pos += 1;
                    header_start = pos;
                }
                b'{' => match lexical::matching_brace(&scan.masked, pos) {
                    Some(close) if close < end => {
                        self.block(scan, header_start, pos, close, scope, owner, visibility);
                        pos = close + 1;
                        header_start = pos;
                    }
                    _ => {
                        let header_offset = first_code_offset(&scan.masked, header_start, pos);
                        let header = lexical::squash_whitespace(&scan.masked[header_start..pos]);
                        // everything up to the next line indented no deeper than the header is lost
                        let resume = recovery_point(&scan.masked, header_offset, pos, end);
                        let span = LineSpan::new(scan.line(header_offset), scan.line(resume.saturating_sub(1)));
                        scan.tokens.malformed(span, format!("unterminated block after `{}`", header));
                        pos = resume;
                        header_start = pos;
                    }
                },
                b'}' => {
                    let line = scan.line(pos);
                    scan.tokens.malformed(LineSpan::line(line), "unexpected closing brace");
                    pos += 1;
                    header_start = pos;
                }
                b':' if owner.is_some() => {
                    let bytes = scan.masked.as_bytes();
                    let double = (pos + 1 < end && bytes[pos + 1] == b':')
                        || (pos > start && bytes[pos - 1] == b':');
                    let label = scan.masked[header_start..pos].split_whitespace().last();
                    match label {
                        Some(word) if !double && access_label(word).is_some() => {
                            visibility = access_label(word).unwrap_or(visibility);
                            pos += 1;
                            header_start = pos;
                        }
                        _ => pos += 1,
                    }
                }
                _ => pos += 1,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn block(
        &self,
        scan: &mut CppScan,
        header_start: usize,
        open: usize,
        close: usize,
        scope: &[String],
        owner: Option<&TypeContext>,
        visibility: Visibility,
    ) {
        let header_offset = first_code_offset(&scan.masked, header_start, open);
        let header = lexical::squash_whitespace(&scan.masked[header_start..open]);
        let span = LineSpan::new(scan.line(header_offset), scan.line(close));

        if let Some(caps) = self.namespace_header.captures(&header) {
            let mut inner = scope.to_vec();
            if let Some(names) = caps.get(1) {
                inner.extend(
                    names
                        .as_str()
                        .split("::")
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            self.scan_region(scan, open + 1, close, &inner, None);
            return;
        }

        if self.linkage_header.is_match(&header) {
            self.scan_region(scan, open + 1, close, scope, None);
            return;
        }

        if let Some(caps) = self.type_header.captures(&header) {
            let type_kind = match &caps[1] {
                "struct" => TypeKind::Struct,
                "union" => TypeKind::Union,
                _ => TypeKind::Class,
            };
            let name = caps[2].to_string();
            let bases = caps.get(3).map(|m| parse_bases(m.as_str())).unwrap_or_default();
            let docs = scan.docs_at(header_offset);

            let index = scan.tokens.push(RawToken::Type(TypeToken {
                decl: Declaration::new(&name, scope, span, docs),
                type_kind,
                visibility: if owner.is_some() { visibility } else { Visibility::Public },
                bases,
            }));

            let context = TypeContext {
                index,
                name: name.clone(),
                default_visibility: if type_kind == TypeKind::Class {
                    Visibility::Private
                } else {
                    Visibility::Public
                },
            };
            let mut inner = scope.to_vec();
            inner.push(name);
            self.scan_region(scan, open + 1, close, &inner, Some(&context));
            return;
        }

        if let Some(caps) = self.enum_header.captures(&header) {
            let name = caps[1].to_string();
            let docs = scan.docs_at(header_offset);
            let index = scan.tokens.push(RawToken::Type(TypeToken {
                decl: Declaration::new(&name, scope, span, docs),
                type_kind: TypeKind::Enum,
                visibility: if owner.is_some() { visibility } else { Visibility::Public },
                bases: vec![],
            }));

            let mut inner = scope.to_vec();
            inner.push(name);
            let body = scan.masked[open + 1..close].to_string();
            let mut offset = open + 1;
            for part in body.split(',') {
                let trimmed = part.trim_start();
                let lead = part.len() - trimmed.len();
                let enumerator: String = trimmed
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if !enumerator.is_empty() {
                    let line = scan.line(offset + lead);
                    scan.tokens.push(RawToken::Member(MemberToken {
                        decl: Declaration::new(enumerator, &inner, LineSpan::line(line), None),
                        parent: Some(index),
                        member_kind: MemberKind::EnumValue,
                        visibility: Visibility::Public,
                        value_type: None,
                        signature: None,
                        has_body: false,
                    }));
                }
                offset += part.len() + 1;
            }
            return;
        }

        if let Some(function) = function_header(&header) {
            let docs = scan.docs_at(header_offset);
            let caller = self.push_callable(scan, &function, span, docs, scope, owner, visibility, true);
            for (callee, line) in self.calls.scan(&scan.masked, open + 1..close, &scan.index) {
                scan.tokens.call(caller, callee, line);
            }
        }
        // anything else (initializers, lambdas, unnamed aggregates) is skipped
    }

    fn statement(
        &self,
        scan: &mut CppScan,
        header_start: usize,
        end: usize,
        scope: &[String],
        owner: Option<&TypeContext>,
        visibility: Visibility,
    ) {
        let header = lexical::squash_whitespace(&scan.masked[header_start..end]);
        if header.is_empty() {
            return;
        }
        let first_word = header.split(|c: char| !c.is_alphanumeric() && c != '_').next().unwrap_or("");
        if matches!(first_word, "using" | "typedef" | "friend" | "return" | "static_assert")
            || self.forward_declaration.is_match(&header)
        {
            return;
        }

        let header_offset = first_code_offset(&scan.masked, header_start, end);
        let span = LineSpan::new(scan.line(header_offset), scan.line(end));

        if let Some(function) = function_header(&header) {
            let is_constructor = owner.map_or(false, |o| function.name() == o.name);
            // expression statements such as `REGISTER(Foo);` have no return type
            if function.return_type.is_some() || is_constructor || function.segments.len() > 1 {
                let docs = scan.docs_at(header_offset);
                self.push_callable(scan, &function, span, docs, scope, owner, visibility, false);
            }
            return;
        }

        let Some(owner) = owner else { return };
        let declarators = lexical::split_top_level(&header);
        let Some(first) = declarators.first() else { return };
        let Some(caps) = self.field_declarator.captures(first) else { return };
        let value_type = strip_specifiers(caps[1].trim());
        if value_type.is_empty() || value_type.contains('(') {
            return;
        }

        let docs = scan.docs_at(header_offset);
        let mut names = vec![caps[2].to_string()];
        for extra in &declarators[1..] {
            let name: String = extra
                .trim_start_matches(|c: char| c == '*' || c == '&' || c.is_whitespace())
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                names.push(name);
            }
        }

        for name in names {
            scan.tokens.push(RawToken::Member(MemberToken {
                decl: Declaration::new(name, scope, span, docs.clone()),
                parent: Some(owner.index),
                member_kind: MemberKind::Field,
                visibility,
                value_type: Some(value_type.clone()),
                signature: None,
                has_body: false,
            }));
        }
    }

    /// Push a method, out-of-line definition or free function token
    #[allow(clippy::too_many_arguments)]
    fn push_callable(
        &self,
        scan: &mut CppScan,
        function: &FunctionHeader,
        span: LineSpan,
        docs: Option<String>,
        scope: &[String],
        owner: Option<&TypeContext>,
        visibility: Visibility,
        has_body: bool,
    ) -> usize {
        let name = function.name().to_string();
        let qualifiers = &function.segments[..function.segments.len() - 1];

        let token = match owner {
            Some(owner) => RawToken::Member(MemberToken {
                decl: Declaration::new(&name, scope, span, docs),
                parent: Some(owner.index),
                member_kind: if name == owner.name {
                    MemberKind::Constructor
                } else {
                    MemberKind::Method
                },
                visibility,
                value_type: function.return_type.clone(),
                signature: Some(function.signature.clone()),
                has_body,
            }),
            None if !qualifiers.is_empty() => {
                let mut member_scope = scope.to_vec();
                member_scope.extend(qualifiers.iter().cloned());
                let class_name = qualifiers.last().cloned().unwrap_or_default();
                RawToken::Member(MemberToken {
                    decl: Declaration::new(&name, &member_scope, span, docs),
                    parent: None,
                    member_kind: if name == class_name {
                        MemberKind::Constructor
                    } else {
                        MemberKind::Method
                    },
                    visibility: Visibility::Public,
                    value_type: function.return_type.clone(),
                    signature: Some(function.signature.clone()),
                    has_body,
                })
            }
            None => RawToken::Function(FunctionToken {
                decl: Declaration::new(&name, scope, span, docs),
                signature: Some(function.signature.clone()),
                is_async: false,
                has_body,
            }),
        };
        scan.tokens.push(token)
    }
}

impl Default for CppAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for CppAdapter {
    fn parse(&mut self, content: &str, _file_path: &Path) -> Result<Vec<RawToken>> {
        let mut scan = CppScan {
            source: content,
            masked: lexical::mask(content, &CPP_SYNTAX),
            lines: content.lines().collect(),
            index: LineIndex::new(content),
            tokens: TokenStream::new(),
        };

        for caps in self.include.captures_iter(scan.source) {
            if let Some(path) = caps.get(1) {
                let line = scan.index.line_of(path.start());
                scan.tokens.push(RawToken::Import(ImportToken {
                    path: path.as_str().to_string(),
                    line,
                }));
            }
        }

        let end = scan.masked.len();
        self.scan_region(&mut scan, 0, end, &[], None);
        Ok(scan.tokens.into_tokens())
    }

    fn extract_file_docs(&self, content: &str) -> Option<String> {
        let lines: Vec<&str> = content.lines().collect();
        lexical::leading_comment_block(&lines, &CPP_SYNTAX)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            types: true,
            members: true,
            calls: true,
        }
    }
}

/// A declarator of the form `ret qualified::name(params) suffix`
#[derive(Debug, Clone, PartialEq)]
struct FunctionHeader {
    segments: Vec<String>,
    return_type: Option<String>,
    signature: String,
}

impl FunctionHeader {
    fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }
}

fn function_header(header: &str) -> Option<FunctionHeader> {
    let bytes = header.as_bytes();
    let mut angle = 0i32;
    let mut paren = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' => angle += 1,
            b'>' => angle -= 1,
            b'(' if angle <= 0 => {
                paren = Some(i);
                break;
            }
            _ => {}
        }
    }
    let paren = paren?;
    let (name_start, segments) = qualified_name_before(header, paren)?;
    if segments.iter().any(|s| NON_FUNCTION_NAMES.contains(&s.as_str())) {
        return None;
    }

    let prefix = header[..name_start].trim();
    if prefix.contains('=') || prefix.contains('(') || prefix.ends_with('.') || prefix.ends_with("->") {
        return None;
    }

    let close = matching_paren(bytes, paren)?;
    let mut suffix = header[close + 1..].trim();
    // constructor initializer lists start with a single ':'
    if let Some(colon) = find_single_colon(suffix) {
        suffix = suffix[..colon].trim();
    }

    let return_type = {
        let stripped = strip_specifiers(prefix);
        if stripped.is_empty() { None } else { Some(stripped) }
    };
    let signature = lexical::squash_whitespace(&format!("{}{}", &header[..=close], if suffix.is_empty() {
        String::new()
    } else {
        format!(" {}", suffix)
    }));

    Some(FunctionHeader {
        segments,
        return_type,
        signature,
    })
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Walk backwards from `paren` over `a::b<T>::~c` and return the start offset
/// and the name segments (template arguments dropped)
fn qualified_name_before(header: &str, paren: usize) -> Option<(usize, Vec<String>)> {
    let bytes = header.as_bytes();
    let mut i = paren;
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }

    let mut segments = Vec::new();
    loop {
        let end = i;
        while i > 0 && is_ident(bytes[i - 1]) {
            i -= 1;
        }
        if i > 0 && bytes[i - 1] == b'~' {
            i -= 1;
        }
        if i == end {
            return None;
        }
        let segment = &header[i..end];
        if segment.as_bytes()[0].is_ascii_digit() {
            return None;
        }
        segments.push(segment.to_string());

        let mut j = i;
        while j > 0 && bytes[j - 1].is_ascii_whitespace() {
            j -= 1;
        }
        if j >= 2 && &bytes[j - 2..j] == b"::" {
            j -= 2;
            while j > 0 && bytes[j - 1].is_ascii_whitespace() {
                j -= 1;
            }
            if j > 0 && bytes[j - 1] == b'>' {
                let mut depth = 0i32;
                while j > 0 {
                    j -= 1;
                    match bytes[j] {
                        b'>' => depth += 1,
                        b'<' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            if j == 0 || !is_ident(bytes[j - 1]) {
                // leading `::name` refers to the global namespace
                i = j;
                break;
            }
            i = j;
            continue;
        }
        break;
    }

    segments.reverse();
    Some((i, segments))
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_single_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (0..bytes.len()).find(|&i| {
        bytes[i] == b':'
            && (i + 1 >= bytes.len() || bytes[i + 1] != b':')
            && (i == 0 || bytes[i - 1] != b':')
    })
}

fn access_label(word: &str) -> Option<Visibility> {
    match word {
        "public" => Some(Visibility::Public),
        "protected" => Some(Visibility::Protected),
        "private" => Some(Visibility::Private),
        _ => None,
    }
}

fn strip_specifiers(text: &str) -> String {
    let mut rest = text.trim();
    if rest.starts_with("template") {
        if let Some(close) = rest.find('>') {
            rest = rest[close + 1..].trim();
        }
    }
    rest.split_whitespace()
        .filter(|word| !SPECIFIERS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_bases(text: &str) -> Vec<String> {
    lexical::split_top_level(text)
        .into_iter()
        .map(|base| {
            base.split_whitespace()
                .filter(|w| !matches!(*w, "public" | "protected" | "private" | "virtual"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|base| !base.is_empty())
        .collect()
}

/// Start of the first line after the brace at `open` whose code starts at
/// or left of the column of `header`, or `end` when there is none
fn recovery_point(masked: &str, header: usize, open: usize, end: usize) -> usize {
    let line_start = |offset: usize| masked[..offset].rfind('\n').map_or(0, |p| p + 1);
    let header_column = header - line_start(header);

    let Some(newline) = masked[open..end].find('\n') else {
        return end;
    };
    let mut offset = open + newline + 1;
    for line in masked[offset..end].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let first = line.trim_start().chars().next();
        let resumes = matches!(first, Some(c) if !matches!(c, '}' | ')' | ']'));
        if resumes && indent <= header_column {
            return offset;
        }
        offset += line.len();
    }
    end
}

fn first_code_offset(masked: &str, start: usize, end: usize) -> usize {
    masked.as_bytes()[start..end]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|p| start + p)
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<RawToken> {
        CppAdapter::new().parse(source, Path::new("test.cpp")).unwrap()
    }

    fn types(tokens: &[RawToken]) -> Vec<&TypeToken> {
        tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Type(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn members(tokens: &[RawToken]) -> Vec<&MemberToken> {
        tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Member(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_class_with_bases_and_members() {
        let source = r#"#include <vector>
#include "entity.h"

namespace game {

/// A controllable character.
class Player : public Entity, private IDamageable {
public:
    Player(int hp);
    virtual void Move(float dx, float dy) override;
    int Health() const { return hp_; }
private:
    int hp_ = 100, armor_;
    std::vector<int> items_;
};

}
"#;
        let tokens = parse(source);

        let imports: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Import(i) => Some(i.path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(imports, vec!["vector", "entity.h"]);

        let types = types(&tokens);
        assert_eq!(types.len(), 1);
        let player = types[0];
        assert_eq!(player.decl.name, "Player");
        assert_eq!(player.decl.scope, vec!["game".to_string()]);
        assert_eq!(player.bases, vec!["Entity".to_string(), "IDamageable".to_string()]);
        assert_eq!(player.decl.docs.as_deref(), Some("A controllable character."));
        assert_eq!(player.decl.span.start, 7);

        let members = members(&tokens);
        let names: Vec<_> = members.iter().map(|m| m.decl.name.as_str()).collect();
        assert_eq!(names, vec!["Player", "Move", "Health", "hp_", "armor_", "items_"]);

        assert_eq!(members[0].member_kind, MemberKind::Constructor);
        assert_eq!(members[1].member_kind, MemberKind::Method);
        assert_eq!(members[1].visibility, Visibility::Public);
        assert_eq!(members[1].value_type.as_deref(), Some("void"));
        assert!(!members[1].has_body);
        assert!(members[2].has_body);
        assert_eq!(members[3].visibility, Visibility::Private);
        assert_eq!(members[3].value_type.as_deref(), Some("int"));
        assert_eq!(members[5].value_type.as_deref(), Some("std::vector<int>"));
        assert!(members
            .iter()
            .all(|m| m.decl.scope == vec!["game".to_string(), "Player".to_string()]));
    }

    #[test]
    fn test_out_of_line_definitions_and_calls() {
        let source = r#"
void Player::Move(float dx, float dy) {
    // Clamp(dx) in a comment is ignored
    Clamp(dx);
    log("moving(");
}

static float Clamp(float v) { return v; }
"#;
        let tokens = parse(source);
        let members = members(&tokens);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].decl.scope, vec!["Player".to_string()]);
        assert_eq!(members[0].decl.name, "Move");
        assert!(members[0].has_body);
        assert!(members[0].parent.is_none());

        let calls: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Call(c) => Some((c.caller, c.callee.as_str(), c.line)),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![(0, "Clamp", 4), (0, "log", 5)]);

        let function = tokens.iter().find_map(|t| match t {
            RawToken::Function(f) => Some(f),
            _ => None,
        });
        let function = function.expect("free function");
        assert_eq!(function.decl.name, "Clamp");
        assert_eq!(function.signature.as_deref(), Some("static float Clamp(float v)"));
    }

    #[test]
    fn test_unterminated_block_recovers_at_next_declaration() {
        let source = "class Broken {\n    int x;\n    void f() { x = 1; }\n\nclass Fine : public Base {};\n";
        let tokens = parse(source);

        let types = types(&tokens);
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].decl.name, "Fine");
        assert!(types[0].decl.scope.is_empty());
        assert!(!tokens
            .iter()
            .any(|t| matches!(t, RawToken::Function(_) | RawToken::Member(_))));

        let malformed: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Malformed(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].span.start, 1);
    }

    #[test]
    fn test_enum_and_template_class() {
        let source = "enum class Color : int { Red, Green = 2, Blue };\ntemplate <typename T>\nstruct Box : Base<T> { T value; };\n";
        let tokens = parse(source);
        let types = types(&tokens);
        assert_eq!(types[0].decl.name, "Color");
        assert_eq!(types[0].type_kind, TypeKind::Enum);
        assert_eq!(types[1].decl.name, "Box");
        assert_eq!(types[1].type_kind, TypeKind::Struct);
        assert_eq!(types[1].bases, vec!["Base<T>".to_string()]);

        let members = members(&tokens);
        let names: Vec<_> = members.iter().map(|m| m.decl.name.as_str()).collect();
        assert_eq!(names, vec!["Red", "Green", "Blue", "value"]);
        assert_eq!(members[3].visibility, Visibility::Public);
    }

    #[test]
    fn test_function_header_parsing() {
        let header = function_header("template<class T> const std::string& Foo<T>::Name() const").unwrap();
        assert_eq!(header.segments, vec!["Foo".to_string(), "Name".to_string()]);
        assert_eq!(header.return_type.as_deref(), Some("const std::string&"));

        let ctor = function_header("Foo::Foo(int a) : a_(a), b_(0)").unwrap();
        assert_eq!(ctor.segments, vec!["Foo".to_string(), "Foo".to_string()]);
        assert_eq!(ctor.signature, "Foo::Foo(int a)");

        assert!(function_header("if (x > 0)").is_none());
        assert!(function_header("int x = compute(3)").is_none());
    }
}
