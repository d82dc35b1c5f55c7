//! The reference analyzer: deterministic, lexical, and intentionally dumb.
//!
//! It does not parse a real grammar. It tokenizes identifiers, pairs a
//! declaration keyword with the name that follows it, and answers every
//! query by scanning those pairs. That is enough to drive the orchestration
//! core's own test scenarios (go-to-definition across a triple-slash chain,
//! hover text that tracks a `didChange`, workspace-symbol search scoped to a
//! package) without pretending to understand TypeScript.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use ts_ls_core::analysis::{
    AnalysisHost, AnalyzerHost, AnalyzerProjectId, CompletionEntry, CompletionEntryDetails, DefinitionEntry,
    NavigateToItem, NavigationTree, PreProcessedFile, QuickInfo, ReferenceEntry, SignatureHelp, SignatureHelpItem,
    SymbolKind, TextSpan,
};
use ts_ls_core::error::{CoreError, CoreResult};

const DECL_KEYWORDS: &[&str] = &["const", "let", "var", "class", "interface", "namespace", "function", "type", "enum"];

fn keyword_kind(keyword: &str) -> SymbolKind {
    match keyword {
        "class" => SymbolKind::Class,
        "interface" => SymbolKind::Interface,
        "function" => SymbolKind::Function,
        "const" | "let" | "var" => SymbolKind::Variable,
        "namespace" | "module" => SymbolKind::Module,
        _ => SymbolKind::Other,
    }
}

#[derive(Debug, Clone)]
struct Token {
    name: String,
    start: u32,
    end: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Byte-offset identifier tokens. Treating byte offsets as the analyzer's
/// UTF-16 code unit offsets is only correct for ASCII source text, which is
/// all this reference analyzer is ever asked to look at.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut byte_pos = 0usize;
    let mut char_idx = 0usize;
    while char_idx < chars.len() {
        let c = chars[char_idx];
        if is_ident_start(c) {
            let start = byte_pos;
            let mut end = byte_pos + c.len_utf8();
            char_idx += 1;
            byte_pos = end;
            while char_idx < chars.len() && is_ident_continue(chars[char_idx]) {
                end += chars[char_idx].len_utf8();
                byte_pos = end;
                char_idx += 1;
            }
            tokens.push(Token {
                name: text[start..end].to_string(),
                start: start as u32,
                end: end as u32,
            });
        } else {
            byte_pos += c.len_utf8();
            char_idx += 1;
        }
    }
    tokens
}

fn find_identifier_at(tokens: &[Token], offset: u32) -> Option<&Token> {
    tokens.iter().find(|t| t.start <= offset && offset < t.end)
}

/// Adjacent `(keyword, name)` pairs across one file's tokens: `class foo`,
/// `export interface foo` (the `export` in between is just skipped, since
/// only identifier tokens are kept), etc.
fn declaration_pairs(tokens: &[Token]) -> Vec<(&'static str, &Token)> {
    let mut pairs = Vec::new();
    for window in tokens.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        if let Some(keyword) = DECL_KEYWORDS.iter().find(|k| **k == a.name) {
            pairs.push((*keyword, b));
        }
    }
    pairs
}

fn infer_type_text(text: &str, name_end: u32) -> String {
    let rest = &text[name_end as usize..];
    let rest = rest.trim_start();
    if let Some(after_colon) = rest.strip_prefix(':') {
        let annotation = after_colon
            .split(|c| c == ';' || c == '\n')
            .next()
            .unwrap_or("")
            .trim();
        return annotation.to_string();
    }
    if let Some(after_eq) = rest.strip_prefix('=') {
        let rhs = after_eq.split(|c| c == ';' || c == '\n').next().unwrap_or("").trim();
        if rhs.starts_with('[') {
            return "any[]".to_string();
        }
        if rhs.starts_with('"') || rhs.starts_with('\'') {
            return "string".to_string();
        }
        if rhs.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return "number".to_string();
        }
        return "any".to_string();
    }
    "any".to_string()
}

fn extract_attr(line: &str, attr: &str) -> Option<String> {
    let needle = format!("{attr}=\"");
    let start = line.find(&needle)? + needle.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// A deterministic, lexical stand-in for a real TypeScript analysis engine.
/// See the module docs for what it can and cannot do.
pub struct MockAnalysisHost {
    projects: RwLock<FxHashMap<AnalyzerProjectId, Arc<dyn AnalyzerHost>>>,
    next_id: AtomicUsize,
}

impl MockAnalysisHost {
    pub fn new() -> Self {
        MockAnalysisHost {
            projects: RwLock::new(FxHashMap::default()),
            next_id: AtomicUsize::new(0),
        }
    }

    fn host_for(&self, project: AnalyzerProjectId) -> CoreResult<Arc<dyn AnalyzerHost>> {
        self.projects
            .read()
            .get(&project)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("no analyzer project {}", project.0)))
    }

    fn project_files(&self, project: AnalyzerProjectId) -> CoreResult<Vec<(String, String)>> {
        let host = self.host_for(project)?;
        Ok(host
            .script_file_names()
            .into_iter()
            .filter_map(|path| host.script_snapshot(&path).map(|text| (path, text)))
            .collect())
    }
}

impl Default for MockAnalysisHost {
    fn default() -> Self {
        MockAnalysisHost::new()
    }
}

impl AnalysisHost for MockAnalysisHost {
    fn create_project(&self, host: Arc<dyn AnalyzerHost>) -> CoreResult<AnalyzerProjectId> {
        let id = AnalyzerProjectId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.projects.write().insert(id, host);
        Ok(id)
    }

    fn dispose_project(&self, project: AnalyzerProjectId) {
        self.projects.write().remove(&project);
    }

    fn get_definition_at(&self, project: AnalyzerProjectId, path: &str, offset: u32) -> CoreResult<Vec<DefinitionEntry>> {
        let host = self.host_for(project)?;
        let Some(text) = host.script_snapshot(path) else {
            return Ok(Vec::new());
        };
        let tokens = tokenize(&text);
        let Some(identifier) = find_identifier_at(&tokens, offset) else {
            return Ok(Vec::new());
        };
        let name = identifier.name.clone();

        for (file_path, file_text) in self.project_files(project)? {
            let file_tokens = tokenize(&file_text);
            if let Some((_, name_token)) = declaration_pairs(&file_tokens).into_iter().find(|(_, t)| t.name == name) {
                return Ok(vec![DefinitionEntry {
                    file: file_path,
                    span: TextSpan::new(name_token.start, name_token.end - name_token.start),
                }]);
            }
        }
        Ok(Vec::new())
    }

    fn get_references_at(&self, project: AnalyzerProjectId, path: &str, offset: u32) -> CoreResult<Vec<ReferenceEntry>> {
        let host = self.host_for(project)?;
        let Some(text) = host.script_snapshot(path) else {
            return Ok(Vec::new());
        };
        let tokens = tokenize(&text);
        let Some(identifier) = find_identifier_at(&tokens, offset) else {
            return Ok(Vec::new());
        };
        let name = identifier.name.clone();

        let mut entries = Vec::new();
        for (file_path, file_text) in self.project_files(project)? {
            for token in tokenize(&file_text) {
                if token.name == name {
                    entries.push(ReferenceEntry {
                        file: file_path.clone(),
                        span: TextSpan::new(token.start, token.end - token.start),
                    });
                }
            }
        }
        Ok(entries)
    }

    fn get_quick_info_at(&self, project: AnalyzerProjectId, path: &str, offset: u32) -> CoreResult<Option<QuickInfo>> {
        let host = self.host_for(project)?;
        let Some(text) = host.script_snapshot(path) else {
            return Ok(None);
        };
        let tokens = tokenize(&text);
        let Some(identifier) = find_identifier_at(&tokens, offset) else {
            return Ok(None);
        };
        let name = identifier.name.clone();
        let span = TextSpan::new(identifier.start, identifier.end - identifier.start);

        // Prefer the declaration in this same file (it is almost always the
        // only one a test scenario cares about); fall back to scanning the
        // rest of the project.
        let local_decl = declaration_pairs(&tokens).into_iter().find(|(_, t)| t.name == name);
        if let Some((keyword, name_token)) = local_decl {
            let type_text = infer_type_text(&text, name_token.end);
            return Ok(Some(QuickInfo {
                display_text: format!("{keyword} {name}: {type_text}"),
                span,
            }));
        }
        for (_, file_text) in self.project_files(project)? {
            let file_tokens = tokenize(&file_text);
            if let Some((keyword, name_token)) = declaration_pairs(&file_tokens).into_iter().find(|(_, t)| t.name == name) {
                let type_text = infer_type_text(&file_text, name_token.end);
                return Ok(Some(QuickInfo {
                    display_text: format!("{keyword} {name}: {type_text}"),
                    span,
                }));
            }
        }
        Ok(None)
    }

    fn get_completions_at(&self, project: AnalyzerProjectId, path: &str, _offset: u32) -> CoreResult<Vec<CompletionEntry>> {
        let host = self.host_for(project)?;
        let Some(text) = host.script_snapshot(path) else {
            return Ok(Vec::new());
        };
        let tokens = tokenize(&text);
        let mut entries: Vec<CompletionEntry> = declaration_pairs(&tokens)
            .into_iter()
            .map(|(keyword, token)| CompletionEntry {
                name: token.name.clone(),
                kind: keyword.to_string(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|a, b| a.name == b.name);
        Ok(entries)
    }

    fn get_completion_entry_details(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        _offset: u32,
        name: &str,
    ) -> CoreResult<Option<CompletionEntryDetails>> {
        let host = self.host_for(project)?;
        let Some(text) = host.script_snapshot(path) else {
            return Ok(None);
        };
        let tokens = tokenize(&text);
        let found = declaration_pairs(&tokens).into_iter().find(|(_, t)| t.name == name);
        Ok(found.map(|(keyword, _)| CompletionEntryDetails {
            name: name.to_string(),
            display_parts: format!("{keyword} {name}"),
        }))
    }

    fn get_signature_help(&self, project: AnalyzerProjectId, path: &str, offset: u32) -> CoreResult<Option<SignatureHelp>> {
        let host = self.host_for(project)?;
        let Some(text) = host.script_snapshot(path) else {
            return Ok(None);
        };
        let before = &text[..(offset as usize).min(text.len())];
        let Some(open_paren) = before.rfind('(') else {
            return Ok(None);
        };
        let tokens = tokenize(&text[..open_paren]);
        let Some(callee) = tokens.last() else {
            return Ok(None);
        };
        let name = callee.name.clone();

        for (_, file_text) in self.project_files(project)? {
            let file_tokens = tokenize(&file_text);
            if declaration_pairs(&file_tokens)
                .into_iter()
                .any(|(keyword, t)| keyword == "function" && t.name == name)
            {
                return Ok(Some(SignatureHelp {
                    items: vec![SignatureHelpItem {
                        label: format!("{name}()"),
                        parameters: Vec::new(),
                    }],
                    active_signature: 0,
                    active_parameter: 0,
                }));
            }
        }
        Ok(None)
    }

    fn get_navigate_to_items(&self, project: AnalyzerProjectId, search: &str) -> CoreResult<Vec<NavigateToItem>> {
        if search.is_empty() {
            return Ok(Vec::new());
        }
        let needle = search.to_ascii_lowercase();
        let mut items = Vec::new();
        for (file_path, file_text) in self.project_files(project)? {
            let tokens = tokenize(&file_text);
            for (keyword, token) in declaration_pairs(&tokens) {
                if token.name.to_ascii_lowercase().contains(&needle) {
                    items.push(NavigateToItem {
                        name: token.name.clone(),
                        file: file_path.clone(),
                        span: TextSpan::new(token.start, token.end - token.start),
                        kind: keyword_kind(keyword),
                        container_name: None,
                    });
                }
            }
        }
        Ok(items)
    }

    fn get_navigation_tree(&self, project: AnalyzerProjectId, path: &str) -> CoreResult<NavigationTree> {
        let host = self.host_for(project)?;
        let text = host
            .script_snapshot(path)
            .ok_or_else(|| CoreError::NotFound(path.to_string()))?;
        let tokens = tokenize(&text);
        let children = declaration_pairs(&tokens)
            .into_iter()
            .map(|(keyword, token)| NavigationTree {
                text: token.name.clone(),
                kind: keyword_kind(keyword),
                span: TextSpan::new(token.start, token.end - token.start),
                children: Vec::new(),
            })
            .collect();
        Ok(NavigationTree {
            text: path.to_string(),
            kind: SymbolKind::Module,
            span: TextSpan::new(0, text.len() as u32),
            children,
        })
    }

    fn resolve_module_name(&self, _project: AnalyzerProjectId, containing_file: &str, module_name: &str) -> CoreResult<Option<String>> {
        if !(module_name.starts_with("./") || module_name.starts_with("../")) {
            // Bare specifiers (`node_modules` resolution) are out of scope
            // for this reference analyzer.
            return Ok(None);
        }
        let dir = containing_file.rsplit_once('/').map_or("", |(dir, _)| dir);
        let mut resolved = format!("{dir}/{module_name}");
        // Collapse `./`, matching the always-POSIX joining rule.
        resolved = resolved.replace("/./", "/");
        if !resolved.ends_with(".ts") && !resolved.ends_with(".tsx") {
            resolved.push_str(".ts");
        }
        Ok(Some(resolved))
    }

    fn resolve_type_reference_directive(&self, _project: AnalyzerProjectId, _containing_file: &str, _name: &str) -> CoreResult<Option<String>> {
        // `@types/*` resolution requires real package resolution; this
        // reference analyzer never has a `node_modules` to look in.
        Ok(None)
    }

    fn pre_process_file(&self, _path: &str, text: &str) -> CoreResult<PreProcessedFile> {
        let mut result = PreProcessedFile::default();
        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(stripped) = trimmed.strip_prefix("///") {
                if let Some(p) = extract_attr(stripped, "path") {
                    result.referenced_files.push(p);
                }
                if let Some(t) = extract_attr(stripped, "types") {
                    result.type_reference_directives.push(t);
                }
                continue;
            }
            if let Some(import_idx) = trimmed.find("import") {
                if let Some(from_rel) = trimmed[import_idx..].find("from") {
                    let after_from = &trimmed[import_idx + from_rel + "from".len()..];
                    if let Some(quote_idx) = after_from.find(['"', '\'']) {
                        let quote = after_from.as_bytes()[quote_idx] as char;
                        let rest = &after_from[quote_idx + 1..];
                        if let Some(end) = rest.find(quote) {
                            result.imported_files.push(rest[..end].to_string());
                        }
                    }
                }
            }
        }
        Ok(result)
    }
}
