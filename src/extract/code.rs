//! Code structure extraction using tree-sitter
//!
//! Finds the top-level declarations of a source file:
//! - Functions (including arrow functions bound at top level)
//! - Classes
//! - Structs / enums / traits / interfaces / type aliases
//! - Impl blocks and modules
//!
//! Comments, attributes and decorators directly above a declaration are
//! attached to it so a doc comment travels with the code it documents.

use super::ChunkKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "rs" => Some(Language::Rust),
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            _ => None,
        }
    }

    /// Detect language from a document path
    pub fn from_path(path: &str) -> Option<Self> {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the tree-sitter language for this language
    pub fn tree_sitter_language(&self) -> tree_sitter::Language {
        match self {
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    /// Map a top-level node kind to a chunk kind
    fn declaration_kind(&self, node_kind: &str) -> Option<ChunkKind> {
        match self {
            Language::Rust => match node_kind {
                "function_item" | "macro_definition" => Some(ChunkKind::Function),
                "struct_item" | "enum_item" | "union_item" | "trait_item" | "type_item" => {
                    Some(ChunkKind::Type)
                }
                "impl_item" => Some(ChunkKind::Impl),
                "mod_item" => Some(ChunkKind::Module),
                _ => None,
            },
            Language::Python => match node_kind {
                "function_definition" => Some(ChunkKind::Function),
                "class_definition" => Some(ChunkKind::Class),
                _ => None,
            },
            Language::JavaScript | Language::TypeScript | Language::Tsx => match node_kind {
                "function_declaration" | "generator_function_declaration" => {
                    Some(ChunkKind::Function)
                }
                "class_declaration" | "abstract_class_declaration" => Some(ChunkKind::Class),
                "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                    Some(ChunkKind::Type)
                }
                "module" | "internal_module" => Some(ChunkKind::Module),
                _ => None,
            },
        }
    }

    /// Node kinds that belong to the declaration that follows them
    fn is_leading_trivia(&self, node_kind: &str) -> bool {
        matches!(
            node_kind,
            "line_comment" | "block_comment" | "comment" | "attribute_item" | "decorator"
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Rust => write!(f, "rust"),
            Language::Python => write!(f, "python"),
            Language::JavaScript => write!(f, "javascript"),
            Language::TypeScript => write!(f, "typescript"),
            Language::Tsx => write!(f, "tsx"),
        }
    }
}

/// Why structural extraction gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The grammar could not be loaded
    Grammar(String),
    /// The parser produced no tree
    NoTree,
    /// The tree contains syntax errors
    SyntaxError { line: usize },
    /// Parsed fine but nothing to split on
    NoDeclarations,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::Grammar(e) => write!(f, "grammar unavailable: {}", e),
            ParseFailure::NoTree => write!(f, "parser returned no tree"),
            ParseFailure::SyntaxError { line } => write!(f, "syntax error near line {}", line),
            ParseFailure::NoDeclarations => write!(f, "no top-level declarations"),
        }
    }
}

/// A top-level declaration found in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    /// Symbol name (`Type` for impl blocks, empty when anonymous)
    pub name: String,
    /// Chunk kind the declaration maps to
    pub kind: ChunkKind,
    /// Byte offset including attached comments
    pub start: usize,
    /// Byte offset one past the declaration
    pub end: usize,
}

/// Extracts top-level declarations from one language
pub struct CodeExtractor {
    language: Language,
    parser: tree_sitter::Parser,
}

impl CodeExtractor {
    /// Create an extractor for `language`
    pub fn new(language: Language) -> Result<Self, ParseFailure> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language.tree_sitter_language())
            .map_err(|e| ParseFailure::Grammar(e.to_string()))?;

        Ok(Self { language, parser })
    }

    /// Extract declaration units in source order
    pub fn extract(&mut self, source: &str) -> Result<Vec<CodeUnit>, ParseFailure> {
        let tree = self.parser.parse(source, None).ok_or(ParseFailure::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            return Err(ParseFailure::SyntaxError {
                line: first_error_line(root),
            });
        }

        let mut units = Vec::new();
        let mut pending_trivia: Option<usize> = None;

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            let kind = child.kind();

            if self.language.is_leading_trivia(kind) {
                pending_trivia.get_or_insert(child.start_byte());
                continue;
            }

            match self.classify(child, source) {
                Some((chunk_kind, name)) => {
                    units.push(CodeUnit {
                        name,
                        kind: chunk_kind,
                        start: pending_trivia.take().unwrap_or(child.start_byte()),
                        end: child.end_byte(),
                    });
                }
                None => pending_trivia = None,
            }
        }

        if units.is_empty() {
            return Err(ParseFailure::NoDeclarations);
        }

        Ok(units)
    }

    /// Decide whether a top-level node is a declaration, and name it
    fn classify(&self, node: tree_sitter::Node, source: &str) -> Option<(ChunkKind, String)> {
        let kind = node.kind();

        if let Some(chunk_kind) = self.language.declaration_kind(kind) {
            let name_field = if kind == "impl_item" { "type" } else { "name" };
            return Some((chunk_kind, field_text(node, name_field, source)));
        }

        match (self.language, kind) {
            (Language::Python, "decorated_definition") => {
                let inner = node.child_by_field_name("definition")?;
                self.classify(inner, source)
            }
            (Language::JavaScript | Language::TypeScript | Language::Tsx, "export_statement") => {
                let inner = node.child_by_field_name("declaration")?;
                self.classify(inner, source)
            }
            (
                Language::JavaScript | Language::TypeScript | Language::Tsx,
                "lexical_declaration" | "variable_declaration",
            ) => self.classify_bound_function(node, source),
            _ => None,
        }
    }

    /// `const handler = () => {}` counts as a function declaration
    fn classify_bound_function(
        &self,
        node: tree_sitter::Node,
        source: &str,
    ) -> Option<(ChunkKind, String)> {
        let mut cursor = node.walk();
        let declarator = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "variable_declarator")?;
        let value = declarator.child_by_field_name("value")?;

        match value.kind() {
            "arrow_function" | "function_expression" | "function" => {
                Some((ChunkKind::Function, field_text(declarator, "name", source)))
            }
            "class" => Some((ChunkKind::Class, field_text(declarator, "name", source))),
            _ => None,
        }
    }
}

fn field_text(node: tree_sitter::Node, field: &str, source: &str) -> String {
    node.child_by_field_name(field)
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or_default()
        .to_string()
}

fn first_error_line(node: tree_sitter::Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_position().row + 1;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            return first_error_line(child);
        }
    }
    node.start_position().row + 1
}
