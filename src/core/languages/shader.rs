use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use regex::Regex;

use crate::error::Result;
use super::lexical::{self, CommentSyntax, LineIndex, SHADER_SYNTAX};
use super::{Capabilities, LanguageAdapter};
use crate::core::model::{
    Declaration, FunctionToken, ImportToken, LineSpan, MemberKind, MemberToken,
    RawToken, ShaderPassToken, ShaderPropertyToken, TokenStream, TypeKind, TypeToken, Visibility,
};

/// Comment masking that keeps `#pragma` and `#include` lines readable
const DIRECTIVE_SYNTAX: CommentSyntax = CommentSyntax {
    preprocessor: false,
    ..SHADER_SYNTAX
};

/// Unity ShaderLab adapter. HLSL program blocks are scanned for structs and
/// functions; files without a `Shader` block are treated as plain HLSL.
pub struct ShaderAdapter {
    shader_header: Regex,
    program: Regex,
    program_end: Regex,
    property: Regex,
    attribute: Regex,
    pass_name: Regex,
    tag: Regex,
    vertex_pragma: Regex,
    fragment_pragma: Regex,
    include: Regex,
    struct_header: Regex,
    function_header: Regex,
    struct_field: Regex,
}

/// A `Keyword { ... }` block in the structural text
#[derive(Debug, Clone)]
struct Block {
    keyword: String,
    start: usize,
    open: usize,
    close: usize,
}

impl Block {
    fn body(&self) -> Range<usize> {
        self.open + 1..self.close
    }
}

/// A CGPROGRAM/HLSLPROGRAM style region and whether a container took it
struct Program {
    start: usize,
    body: Range<usize>,
    claimed: bool,
}

struct ShaderScan<'a> {
    source: &'a str,
    /// Comments and strings blanked
    masked: String,
    /// `masked` with program regions blanked as well
    structural: String,
    /// Comments blanked, directives kept
    directives: String,
    lines: Vec<&'a str>,
    masked_lines: Vec<String>,
    index: LineIndex,
    programs: Vec<Program>,
    subshaders: usize,
    tokens: TokenStream,
}

impl ShaderScan<'_> {
    fn line(&self, offset: usize) -> usize {
        self.index.line_of(offset)
    }

    fn docs_at(&self, offset: usize) -> Option<String> {
        lexical::doc_comment_before(&self.lines, self.line(offset) - 1, &SHADER_SYNTAX)
    }

    /// Whether `offset` is real code rather than part of a comment
    fn is_code(&self, offset: usize) -> bool {
        self.masked.as_bytes().get(offset).map_or(false, |b| !b.is_ascii_whitespace())
    }
}

impl ShaderAdapter {
    pub fn new() -> Self {
        Self {
            shader_header: Regex::new(r#"\bShader\s+"([^"]*)""#).expect("Invalid shader regex"),
            program: Regex::new(r"\b(?:CGPROGRAM|HLSLPROGRAM|CGINCLUDE|HLSLINCLUDE)\b")
                .expect("Invalid program regex"),
            program_end: Regex::new(r"\b(?:ENDCG|ENDHLSL)\b").expect("Invalid program end regex"),
            property: Regex::new(
                r#"^\s*((?:\[[^\]]*\]\s*)*)([A-Za-z_]\w*)\s*\(\s*"([^"]*)"\s*,\s*([A-Za-z0-9]+(?:\s*\([^)]*\))?)\s*\)\s*=\s*(.+?)\s*$"#,
            )
            .expect("Invalid property regex"),
            attribute: Regex::new(r"\[([^\]]*)\]").expect("Invalid attribute regex"),
            pass_name: Regex::new(r#"\bName\s+"([^"]*)""#).expect("Invalid pass name regex"),
            tag: Regex::new(r#""(\w+)"\s*=\s*"([^"]*)""#).expect("Invalid tag regex"),
            vertex_pragma: Regex::new(r"(?m)^\s*#\s*pragma\s+vertex\s+(\w+)")
                .expect("Invalid vertex pragma regex"),
            fragment_pragma: Regex::new(r"(?m)^\s*#\s*pragma\s+fragment\s+(\w+)")
                .expect("Invalid fragment pragma regex"),
            include: Regex::new(r#"(?m)^\s*#\s*include\s*[<"]([^>"]+)[>"]"#)
                .expect("Invalid include regex"),
            struct_header: Regex::new(r"^(?:typedef\s+)?struct\s+([A-Za-z_]\w*)$")
                .expect("Invalid struct regex"),
            function_header: Regex::new(
                r"(?s)^(?:\[[^\]]*\]\s*)*(?:(?:inline|static|precise)\s+)*([A-Za-z_]\w*(?:<[^>]*>)?)\s+([A-Za-z_]\w*)\s*\((.*)\)\s*(?::\s*\w+)?$",
            )
            .expect("Invalid HLSL function regex"),
            struct_field: Regex::new(
                r"^(?:(?:nointerpolation|linear|centroid|noperspective|sample|uniform|static|const|precise)\s+)*([A-Za-z_]\w*(?:<[^>]*>)?)\s+([A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*(?::\s*\w+)?$",
            )
            .expect("Invalid struct field regex"),
        }
    }

    /// Locate program regions and blank them out of the structural text
    fn collect_programs(&self, scan: &mut ShaderScan) {
        let mut structural = scan.masked.clone().into_bytes();
        let mut search_from = 0;

        while let Some(open) = self.program.find_at(&scan.masked, search_from) {
            let (body_end, region_end) = match self.program_end.find_at(&scan.masked, open.end()) {
                Some(end) => (end.start(), end.end()),
                None => {
                    let span = LineSpan::new(scan.line(open.start()), scan.index.line_count());
                    scan.tokens.malformed(span, format!("unterminated {} block", open.as_str()));
                    (scan.masked.len(), scan.masked.len())
                }
            };

            for byte in &mut structural[open.start()..region_end] {
                if *byte != b'\n' {
                    *byte = b' ';
                }
            }
            scan.programs.push(Program {
                start: open.start(),
                body: open.end()..body_end,
                claimed: false,
            });
            search_from = region_end;
        }

        scan.structural = String::from_utf8_lossy(&structural).into_owned();
    }

    /// Top-level blocks inside `range` of the structural text
    fn child_blocks(&self, scan: &mut ShaderScan, range: Range<usize>) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut pos = range.start;

        while pos < range.end {
            match scan.structural.as_bytes()[pos] {
                b'{' => {
                    let (keyword, start) = keyword_before(&scan.structural, range.start, pos);
                    match lexical::matching_brace(&scan.structural, pos) {
                        Some(close) if close < range.end => {
                            blocks.push(Block {
                                keyword,
                                start,
                                open: pos,
                                close,
                            });
                            pos = close + 1;
                        }
                        _ => {
                            let span = LineSpan::new(scan.line(start), scan.line(range.end.saturating_sub(1)));
                            scan.tokens.malformed(span, format!("unterminated {} block", keyword));
                            pos += 1;
                        }
                    }
                }
                b'}' => {
                    let line = scan.line(pos);
                    scan.tokens.malformed(LineSpan::line(line), "unexpected closing brace");
                    pos += 1;
                }
                _ => pos += 1,
            }
        }
        blocks
    }

    fn shader_body(&self, scan: &mut ShaderScan, range: Range<usize>, scope: &[String], shader: usize) {
        for block in self.child_blocks(scan, range) {
            match block.keyword.as_str() {
                "Properties" => self.properties(scan, &block, scope, shader),
                "SubShader" => {
                    scan.subshaders += 1;
                    let mut inner = scope.to_vec();
                    inner.push(format!("SubShader{}", scan.subshaders));
                    self.subshader(scan, &block, &inner, shader);
                }
                "Category" => self.shader_body(scan, block.body(), scope, shader),
                _ => {}
            }
        }
    }

    fn properties(&self, scan: &mut ShaderScan, block: &Block, scope: &[String], shader: usize) {
        let first = scan.line(block.open + 1);
        let last = scan.line(block.close);

        for line in first..=last {
            let row = line - 1;
            let Some(text) = scan.lines.get(row).copied() else { break };
            // commented-out lines are blank once masked
            if scan.masked_lines.get(row).map_or(true, |m| m.trim().is_empty()) {
                continue;
            }
            let Some(caps) = self.property.captures(text) else { continue };

            let attributes = self
                .attribute
                .captures_iter(&caps[1])
                .map(|a| a[1].trim().to_string())
                .collect();
            let default_value = strip_trailing_comment(&caps[5]);

            scan.tokens.push(RawToken::ShaderProperty(ShaderPropertyToken {
                decl: Declaration::new(
                    &caps[2],
                    scope,
                    LineSpan::line(line),
                    lexical::doc_comment_before(&scan.lines, row, &SHADER_SYNTAX),
                ),
                parent: Some(shader),
                display_name: caps[3].to_string(),
                property_type: lexical::squash_whitespace(&caps[4]),
                default_value,
                attributes,
            }));
        }
    }

    fn subshader(&self, scan: &mut ShaderScan, block: &Block, scope: &[String], shader: usize) {
        let mut passes = 0;
        for child in self.child_blocks(scan, block.body()) {
            if child.keyword == "Pass" {
                passes += 1;
                self.pass(scan, &child, scope, shader, passes);
            }
        }
        self.claim_programs(scan, block.body(), scope);
    }

    fn pass(&self, scan: &mut ShaderScan, block: &Block, scope: &[String], shader: usize, number: usize) {
        let body = block.body();
        let children = self.child_blocks(scan, body.clone());
        let nested: Vec<Range<usize>> = children.iter().map(|c| c.start..c.close + 1).collect();

        let name = self
            .pass_name
            .captures_iter(&scan.source[body.clone()])
            .filter_map(|caps| caps.get(0).zip(caps.get(1)))
            .find(|(whole, _)| {
                let offset = body.start + whole.start();
                scan.is_code(offset) && !nested.iter().any(|r| r.contains(&offset))
            })
            .map(|(_, name)| name.as_str().to_string())
            .unwrap_or_else(|| format!("Pass{}", number));

        let mut tags = BTreeMap::new();
        for child in children.iter().filter(|c| c.keyword == "Tags") {
            for caps in self.tag.captures_iter(&scan.source[child.body()]) {
                tags.insert(caps[1].to_string(), caps[2].to_string());
            }
        }

        // commented-out pragmas are blank once masked
        let pass_source = &scan.directives[body.clone()];
        let vertex_stage = self.vertex_pragma.captures(pass_source).map(|c| c[1].to_string());
        let fragment_stage = self.fragment_pragma.captures(pass_source).map(|c| c[1].to_string());

        let span = LineSpan::new(scan.line(block.start), scan.line(block.close));
        let docs = scan.docs_at(block.start);
        scan.tokens.push(RawToken::ShaderPass(ShaderPassToken {
            decl: Declaration::new(&name, scope, span, docs),
            parent: Some(shader),
            vertex_stage,
            fragment_stage,
            tags,
        }));

        let mut inner = scope.to_vec();
        inner.push(name);
        self.claim_programs(scan, body, &inner);
    }

    /// Scan every unclaimed program region starting inside `range`
    fn claim_programs(&self, scan: &mut ShaderScan, range: Range<usize>, scope: &[String]) {
        for i in 0..scan.programs.len() {
            let program = &mut scan.programs[i];
            if program.claimed || !range.contains(&program.start) {
                continue;
            }
            program.claimed = true;
            let body = program.body.clone();
            self.scan_hlsl(scan, body, scope);
        }
    }

    /// Structs and functions in HLSL code
    fn scan_hlsl(&self, scan: &mut ShaderScan, range: Range<usize>, scope: &[String]) {
        let mut pos = range.start;
        let mut header_start = range.start;

        while pos < range.end {
            match scan.masked.as_bytes()[pos] {
                b';' => {
                    pos += 1;
                    header_start = pos;
                }
                b'{' => match lexical::matching_brace(&scan.masked, pos) {
                    Some(close) if close < range.end => {
                        self.hlsl_block(scan, header_start, pos, close, scope);
                        pos = close + 1;
                        header_start = pos;
                    }
                    _ => {
                        let offset = first_code_offset(&scan.masked, header_start, pos);
                        let span = LineSpan::new(scan.line(offset), scan.line(range.end.saturating_sub(1)));
                        scan.tokens.malformed(span, "unterminated block in HLSL code");
                        pos += 1;
                        header_start = pos;
                    }
                },
                b'}' => {
                    let line = scan.line(pos);
                    scan.tokens.malformed(LineSpan::line(line), "unexpected closing brace");
                    pos += 1;
                    header_start = pos;
                }
                _ => pos += 1,
            }
        }
    }

    fn hlsl_block(&self, scan: &mut ShaderScan, header_start: usize, open: usize, close: usize, scope: &[String]) {
        let offset = first_code_offset(&scan.masked, header_start, open);
        let header = lexical::squash_whitespace(&scan.masked[header_start..open]);
        let span = LineSpan::new(scan.line(offset), scan.line(close));
        let docs = scan.docs_at(offset);

        if let Some(caps) = self.struct_header.captures(&header) {
            let name = caps[1].to_string();
            let index = scan.tokens.push(RawToken::Type(TypeToken {
                decl: Declaration::new(&name, scope, span, docs),
                type_kind: TypeKind::Struct,
                visibility: Visibility::Public,
                bases: vec![],
            }));

            let mut inner = scope.to_vec();
            inner.push(name);
            let body = scan.masked[open + 1..close].to_string();
            let mut statement_start = open + 1;
            for statement in body.split(';') {
                let field = lexical::squash_whitespace(statement);
                if let Some(caps) = self.struct_field.captures(&field) {
                    let line = scan.line(first_code_offset(
                        &scan.masked,
                        statement_start,
                        statement_start + statement.len(),
                    ));
                    scan.tokens.push(RawToken::Member(MemberToken {
                        decl: Declaration::new(&caps[2], &inner, LineSpan::line(line), None),
                        parent: Some(index),
                        member_kind: MemberKind::Field,
                        visibility: Visibility::Public,
                        value_type: Some(caps[1].to_string()),
                        signature: None,
                        has_body: false,
                    }));
                }
                statement_start += statement.len() + 1;
            }
            return;
        }

        if let Some(caps) = self.function_header.captures(&header) {
            if matches!(&caps[1], "return" | "if" | "else" | "for" | "while" | "switch") {
                return;
            }
            scan.tokens.push(RawToken::Function(FunctionToken {
                decl: Declaration::new(&caps[2], scope, span, docs),
                signature: Some(header.clone()),
                is_async: false,
                has_body: true,
            }));
        }
    }
}

impl Default for ShaderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for ShaderAdapter {
    fn parse(&mut self, content: &str, _file_path: &Path) -> Result<Vec<RawToken>> {
        let masked = lexical::mask(content, &SHADER_SYNTAX);
        let mut scan = ShaderScan {
            source: content,
            masked_lines: masked.lines().map(str::to_string).collect(),
            structural: String::new(),
            directives: lexical::mask(content, &DIRECTIVE_SYNTAX),
            masked,
            lines: content.lines().collect(),
            index: LineIndex::new(content),
            programs: Vec::new(),
            subshaders: 0,
            tokens: TokenStream::new(),
        };

        for caps in self.include.captures_iter(content) {
            if let Some(path) = caps.get(1) {
                let line = scan.index.line_of(path.start());
                scan.tokens.push(RawToken::Import(ImportToken {
                    path: path.as_str().to_string(),
                    line,
                }));
            }
        }

        self.collect_programs(&mut scan);

        let header = self
            .shader_header
            .captures_iter(content)
            .find(|caps| caps.get(0).map_or(false, |m| scan.is_code(m.start())));

        match header {
            Some(caps) => {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    return Ok(scan.tokens.into_tokens());
                };
                let name = name.as_str().to_string();
                let open = scan.structural[whole.end()..].find('{').map(|p| whole.end() + p);

                let Some(open) = open else {
                    let line = scan.line(whole.start());
                    scan.tokens.malformed(LineSpan::line(line), "shader declaration without a body");
                    return Ok(scan.tokens.into_tokens());
                };
                let body_end = match lexical::matching_brace(&scan.structural, open) {
                    Some(close) => close,
                    None => {
                        let span = LineSpan::new(scan.line(whole.start()), scan.index.line_count());
                        scan.tokens.malformed(span, format!("unterminated shader block `{}`", name));
                        scan.structural.len()
                    }
                };

                let last = body_end.min(scan.masked.len().saturating_sub(1)).max(open);
                let span = LineSpan::new(scan.line(whole.start()), scan.line(last));
                let docs = scan.docs_at(whole.start());
                let shader = scan.tokens.push(RawToken::Type(TypeToken {
                    decl: Declaration::new(&name, &[], span, docs),
                    type_kind: TypeKind::Shader,
                    visibility: Visibility::Public,
                    bases: vec![],
                }));

                let scope = vec![name];
                self.shader_body(&mut scan, open + 1..body_end, &scope, shader);
                self.claim_programs(&mut scan, open..body_end, &scope);
                let end = scan.masked.len();
                self.claim_programs(&mut scan, 0..end, &[]);
            }
            None => {
                let end = scan.masked.len();
                self.scan_hlsl(&mut scan, 0..end, &[]);
            }
        }

        Ok(scan.tokens.into_tokens())
    }

    fn extract_file_docs(&self, content: &str) -> Option<String> {
        let lines: Vec<&str> = content.lines().collect();
        lexical::leading_comment_block(&lines, &SHADER_SYNTAX)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            types: true,
            members: true,
            calls: false,
        }
    }
}

/// Identifier directly before `open`, and where it starts
fn keyword_before(text: &str, floor: usize, open: usize) -> (String, usize) {
    let bytes = text.as_bytes();
    let mut end = open;
    while end > floor && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > floor && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_') {
        start -= 1;
    }
    if start == end {
        (String::new(), open)
    } else {
        (text[start..end].to_string(), start)
    }
}

fn strip_trailing_comment(text: &str) -> String {
    let cut = text.find("//").unwrap_or(text.len());
    text[..cut].trim().to_string()
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

    const TOON: &str = r#"// Toon shading.
Shader "Custom/Toon" {
    Properties {
        [HDR] _Color ("Main Color", Color) = (1,1,1,1)
        _MainTex ("Base (RGB)", 2D) = "white" {}
        // _Unused ("Unused", Float) = 0
        _Glossiness ("Smoothness", Range(0, 1)) = 0.5
    }
    SubShader {
        Tags { "RenderType"="Opaque" }
        Pass {
            Name "ForwardBase"
            Tags { "LightMode"="ForwardBase" }
            CGPROGRAM
            #pragma vertex vert
            #pragma fragment frag
            #include "UnityCG.cginc"

            struct v2f {
                float4 pos : SV_POSITION;
                float2 uv : TEXCOORD0;
            };

            /// Transforms vertices.
            v2f vert(appdata_base v) {
                v2f o;
                return o;
            }

            fixed4 frag(v2f i) : SV_Target { return fixed4(1,1,1,1); }
            ENDCG
        }
        Pass {
            Tags { "LightMode"="ShadowCaster" }
        }
    }
    Fallback "Diffuse"
}
"#;

    fn parse(source: &str) -> Vec<RawToken> {
        ShaderAdapter::new().parse(source, Path::new("Toon.shader")).unwrap()
    }

    #[test]
    fn test_shader_type_and_properties() {
        let tokens = parse(TOON);

        let shader = tokens.iter().find_map(|t| match t {
            RawToken::Type(t) if t.type_kind == TypeKind::Shader => Some(t),
            _ => None,
        });
        let shader = shader.expect("shader type");
        assert_eq!(shader.decl.name, "Custom/Toon");
        assert_eq!(shader.decl.docs.as_deref(), Some("Toon shading."));
        assert_eq!(shader.decl.span, LineSpan::new(2, 38));

        let properties: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::ShaderProperty(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(properties.len(), 3);

        assert_eq!(properties[0].decl.name, "_Color");
        assert_eq!(properties[0].attributes, vec!["HDR".to_string()]);
        assert_eq!(properties[0].default_value, "(1,1,1,1)");
        assert_eq!(properties[1].display_name, "Base (RGB)");
        assert_eq!(properties[1].property_type, "2D");
        assert_eq!(properties[1].default_value, "\"white\" {}");
        assert_eq!(properties[2].property_type, "Range(0, 1)");
        assert_eq!(properties[2].default_value, "0.5");
        assert_eq!(properties[2].decl.scope, vec!["Custom/Toon".to_string()]);
    }

    #[test]
    fn test_passes_and_programs() {
        let tokens = parse(TOON);

        let passes: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::ShaderPass(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].decl.qualified_name(), "Custom/Toon.SubShader1.ForwardBase");
        assert_eq!(passes[0].vertex_stage.as_deref(), Some("vert"));
        assert_eq!(passes[0].fragment_stage.as_deref(), Some("frag"));
        assert_eq!(passes[0].tags.get("LightMode").map(String::as_str), Some("ForwardBase"));
        assert_eq!(passes[1].decl.name, "Pass2");
        assert_eq!(passes[1].vertex_stage, None);
        assert_eq!(passes[1].tags.get("LightMode").map(String::as_str), Some("ShadowCaster"));

        let functions: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Function(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].decl.qualified_name(), "Custom/Toon.SubShader1.ForwardBase.vert");
        assert_eq!(functions[0].decl.docs.as_deref(), Some("Transforms vertices."));
        assert_eq!(functions[1].signature.as_deref(), Some("fixed4 frag(v2f i) : SV_Target"));

        let fields: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Member(m) => Some((m.decl.name.as_str(), m.value_type.as_deref())),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec![("pos", Some("float4")), ("uv", Some("float2"))]);

        assert!(tokens
            .iter()
            .any(|t| matches!(t, RawToken::Import(i) if i.path == "UnityCG.cginc")));
        assert!(!tokens.iter().any(|t| matches!(t, RawToken::Call(_) | RawToken::Malformed(_))));
    }

    #[test]
    fn test_commented_pragma_is_ignored() {
        let source = "Shader \"FX/Old\" {\n    SubShader {\n        Pass {\n            CGPROGRAM\n            // #pragma vertex legacy\n            /* #pragma fragment legacyFrag */\n            #pragma fragment frag\n            float4 frag() { return 1; }\n            ENDCG\n        }\n    }\n}\n";
        let tokens = parse(source);

        let pass = tokens.iter().find_map(|t| match t {
            RawToken::ShaderPass(p) => Some(p),
            _ => None,
        });
        let pass = pass.expect("pass");
        assert_eq!(pass.vertex_stage, None);
        assert_eq!(pass.fragment_stage.as_deref(), Some("frag"));
    }

    #[test]
    fn test_plain_hlsl_file() {
        let source = "#include \"Common.hlsl\"\nstruct Light { float3 color; float intensity; };\n\nfloat3 Shade(Light l) {\n    return l.color * l.intensity;\n}\n";
        let tokens = parse(source);

        let names: Vec<_> = tokens
            .iter()
            .filter_map(|t| t.declaration().map(|d| d.qualified_name()))
            .collect();
        assert_eq!(names, vec!["Light", "Light.color", "Light.intensity", "Shade"]);
    }

    #[test]
    fn test_unterminated_shader_is_salvaged() {
        let source = "Shader \"Broken\" {\n  Properties {\n    _A (\"A\", Float) = 1\n  }\n";
        let tokens = parse(source);

        let malformed = tokens.iter().filter(|t| matches!(t, RawToken::Malformed(_))).count();
        assert_eq!(malformed, 1);
        assert!(tokens
            .iter()
            .any(|t| matches!(t, RawToken::Type(t) if t.decl.name == "Broken")));
        assert!(tokens
            .iter()
            .any(|t| matches!(t, RawToken::ShaderProperty(p) if p.decl.name == "_A")));
    }
}
