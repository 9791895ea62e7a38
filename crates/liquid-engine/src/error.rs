// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The error taxonomy.
//!
//! Every variant carries `line`/`column` (1-based) and the owning template's
//! name, matching the propagation rule that all errors carry `(line,
//! column, template_name)`. Resource-limit variants are always fatal
//! regardless of tolerance mode; the rest are downgraded to diagnostics in
//! `warn`/`lax` tolerance by the parser/renderer rather than by this type.

use crate::ast::Span;
use thiserror::Error;

/// Where an error occurred, independent of tolerance mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn from_span(span: Span) -> Self {
        Self {
            line: span.line,
            column: span.column,
        }
    }
}

/// Unified error type for the template engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lexer error in {template_name}:{location_line}:{location_column}: {message}")]
    Lexer {
        message: String,
        template_name: String,
        location_line: u32,
        location_column: u32,
    },
    #[error("syntax error in {template_name}:{location_line}:{location_column}: {message}")]
    Syntax {
        message: String,
        template_name: String,
        location_line: u32,
        location_column: u32,
    },
    #[error("type error in {template_name}:{location_line}:{location_column}: {message}")]
    Type {
        message: String,
        template_name: String,
        location_line: u32,
        location_column: u32,
    },
    #[error("undefined variable '{path}' in {template_name}:{location_line}:{location_column}")]
    Undefined {
        path: String,
        template_name: String,
        location_line: u32,
        location_column: u32,
    },
    #[error("filter error in {template_name}:{location_line}:{location_column}: {message}")]
    Filter {
        message: String,
        template_name: String,
        location_line: u32,
        location_column: u32,
    },
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },
    #[error("tag '{tag}' is disabled in {template_name}:{location_line}:{location_column}")]
    DisabledTag {
        tag: String,
        template_name: String,
        location_line: u32,
        location_column: u32,
    },
    #[error("context depth limit exceeded ({limit}) in {template_name}")]
    ContextDepthLimit { limit: usize, template_name: String },
    #[error("loop iteration limit exceeded ({limit}) in {template_name}")]
    LoopIterationLimit { limit: usize, template_name: String },
    #[error("local namespace limit exceeded ({limit} bytes) in {template_name}")]
    LocalNamespaceLimit { limit: usize, template_name: String },
    #[error("output stream limit exceeded ({limit} bytes) in {template_name}")]
    OutputStreamLimit { limit: usize, template_name: String },
    #[error("could not traverse node in {template_name}: {message}")]
    TemplateTraversal { message: String, template_name: String },
}

impl Error {
    pub fn lexer(message: impl Into<String>, template_name: impl Into<String>, loc: Location) -> Self {
        Error::Lexer {
            message: message.into(),
            template_name: template_name.into(),
            location_line: loc.line,
            location_column: loc.column,
        }
    }

    pub fn syntax(message: impl Into<String>, template_name: impl Into<String>, loc: Location) -> Self {
        Error::Syntax {
            message: message.into(),
            template_name: template_name.into(),
            location_line: loc.line,
            location_column: loc.column,
        }
    }

    pub fn type_error(message: impl Into<String>, template_name: impl Into<String>, loc: Location) -> Self {
        Error::Type {
            message: message.into(),
            template_name: template_name.into(),
            location_line: loc.line,
            location_column: loc.column,
        }
    }

    pub fn undefined(path: impl Into<String>, template_name: impl Into<String>, loc: Location) -> Self {
        Error::Undefined {
            path: path.into(),
            template_name: template_name.into(),
            location_line: loc.line,
            location_column: loc.column,
        }
    }

    pub fn filter(message: impl Into<String>, template_name: impl Into<String>, loc: Location) -> Self {
        Error::Filter {
            message: message.into(),
            template_name: template_name.into(),
            location_line: loc.line,
            location_column: loc.column,
        }
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Error::TemplateNotFound { name: name.into() }
    }

    pub fn disabled_tag(tag: impl Into<String>, template_name: impl Into<String>, loc: Location) -> Self {
        Error::DisabledTag {
            tag: tag.into(),
            template_name: template_name.into(),
            location_line: loc.line,
            location_column: loc.column,
        }
    }

    /// Whether this error kind is a resource cap, which is always fatal
    /// regardless of tolerance mode.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Error::ContextDepthLimit { .. }
                | Error::LoopIterationLimit { .. }
                | Error::LocalNamespaceLimit { .. }
                | Error::OutputStreamLimit { .. }
        )
    }
}

/// A non-fatal issue recorded while parsing/rendering in `warn` tolerance.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    pub fn from_error(err: &Error) -> Self {
        let loc = location_of(err);
        Diagnostic {
            message: err.to_string(),
            line: loc.line,
            column: loc.column,
        }
    }
}

fn location_of(err: &Error) -> Location {
    match err {
        Error::Lexer { location_line, location_column, .. }
        | Error::Syntax { location_line, location_column, .. }
        | Error::Type { location_line, location_column, .. }
        | Error::Undefined { location_line, location_column, .. }
        | Error::Filter { location_line, location_column, .. }
        | Error::DisabledTag { location_line, location_column, .. } => Location {
            line: *location_line,
            column: *location_column,
        },
        _ => Location::default(),
    }
}
