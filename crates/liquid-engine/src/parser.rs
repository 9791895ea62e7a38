// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The template-level scanner and tag dispatcher.
//!
//! The scanner walks the source once, splitting it into literal text,
//! output statements (`{{ ... }}`) and tags (`{% ... %}`), tracking
//! whitespace-control markers (`{%-`, `-%}`) as it goes. Each tag's raw
//! argument text is handed to [`crate::expr_parser::ExprParser`], reentered
//! on a fresh token stream from [`crate::lexer`] — this keeps one lexer and
//! one literal/path grammar shared across every tag's own surface syntax.
//! Block tags recurse into [`Parser::parse_block`] with the set of tag
//! names that terminate them, so `if`/`elsif`/`else`/`endif` share the one
//! loop that also drives `case`/`for`/`capture`/etc.

use crate::ast::{
    AssignNode, Ast, Block, CaptureNode, CaseNode, CommentNode, CycleNode, DecrementNode,
    ElsifBranch, EchoNode, ForNode, IfNode, IfchangedNode, IncludeNode, IncrementNode, LiquidNode,
    Node, OutputNode, RawNode, RenderNode, Span, TableRowNode, TextNode, UnlessNode, WhenBranch,
};
use crate::error::{Diagnostic, Error, Location};
use crate::expr_parser::ExprParser;
use crate::lexer::{self, Token};

/// Governs how a parse/render error is handled: abort, downgrade to a
/// collected diagnostic and recover, or silently skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    Strict,
    Warn,
    Lax,
}

pub struct ParseOutcome {
    pub ast: Ast,
    pub diagnostics: Vec<Diagnostic>,
}

/// Entry point: parses `source` into an `Ast` under the given tolerance.
pub fn parse_template(name: &str, source: &str, tolerance: ToleranceMode) -> Result<ParseOutcome, Error> {
    let mut parser = Parser::new(name, source, tolerance);
    let (root, _) = parser.parse_block(&[])?;
    Ok(ParseOutcome {
        ast: Ast::new(name, root),
        diagnostics: parser.diagnostics,
    })
}

#[derive(Clone, Copy)]
struct DelimOpen {
    start: usize,
    is_output: bool,
    trim_left: bool,
    content_start: usize,
}

/// A fully-scanned `{% name rest %}` header, including the terminator tags
/// (`else`, `endif`, ...) that a block tag's own body recursion stops on.
struct TagHeader {
    name: String,
    rest: String,
    rest_offset: usize,
    rest_line: u32,
    rest_column: u32,
    span: Span,
}

struct Parser<'s> {
    source: &'s str,
    bytes: &'s [u8],
    cursor: usize,
    line: u32,
    column: u32,
    template_name: String,
    tolerance: ToleranceMode,
    diagnostics: Vec<Diagnostic>,
    /// Set by a tag's trailing `-%}`/`-}}`; consumed by the next text flush.
    pending_trim_right: bool,
}

impl<'s> Parser<'s> {
    fn new(template_name: &str, source: &'s str, tolerance: ToleranceMode) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            cursor: 0,
            line: 1,
            column: 1,
            template_name: template_name.to_string(),
            tolerance,
            diagnostics: Vec::new(),
            pending_trim_right: false,
        }
    }

    fn advance_to(&mut self, new_cursor: usize) {
        let (line, column) = scan_line_col(self.line, self.column, &self.source[self.cursor..new_cursor]);
        self.line = line;
        self.column = column;
        self.cursor = new_cursor;
    }

    fn peek_line_col(&self, byte_offset: usize) -> (u32, u32) {
        scan_line_col(self.line, self.column, &self.source[self.cursor..byte_offset])
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, self.template_name.clone(), Location { line: self.line, column: self.column })
    }

    fn handle_error(&mut self, err: Error) -> Result<(), Error> {
        if err.is_resource_limit() {
            return Err(err);
        }
        match self.tolerance {
            ToleranceMode::Strict => Err(err),
            ToleranceMode::Warn => {
                self.diagnostics.push(Diagnostic::from_error(&err));
                Ok(())
            }
            ToleranceMode::Lax => Ok(()),
        }
    }

    fn find_next_delim(&self) -> Option<DelimOpen> {
        let rest = &self.source[self.cursor..];
        let out_idx = rest.find("{{");
        let tag_idx = rest.find("{%");
        let (rel, is_output) = match (out_idx, tag_idx) {
            (Some(o), Some(t)) if o < t => (o, true),
            (Some(_), Some(t)) => (t, false),
            (Some(o), None) => (o, true),
            (None, Some(t)) => (t, false),
            (None, None) => return None,
        };
        let start = self.cursor + rel;
        let mut content_start = start + 2;
        let trim_left = self.bytes.get(content_start) == Some(&b'-');
        if trim_left {
            content_start += 1;
        }
        Some(DelimOpen { start, is_output, trim_left, content_start })
    }

    fn flush_text(&mut self, block: &mut Block, end: usize, strip_trailing: bool) {
        let raw = &self.source[self.cursor..end];
        let mut text = raw;
        if self.pending_trim_right {
            text = text.trim_start();
        }
        if strip_trailing {
            text = text.trim_end();
        }
        if !text.is_empty() {
            let span = Span::new(self.cursor, end, self.line, self.column);
            block.push(Node::TextLiteral(TextNode { span, text: text.to_string() }));
        }
        self.advance_to(end);
        self.pending_trim_right = false;
    }

    /// Walks literal text and tags/outputs until EOF or one of `terminators`
    /// is reached, returning the matched terminator's header so the caller
    /// (a block tag) can branch on it.
    fn parse_block(&mut self, terminators: &[&str]) -> Result<(Block, Option<TagHeader>), Error> {
        let mut block = Block::default();
        loop {
            match self.find_next_delim() {
                None => {
                    self.flush_text(&mut block, self.source.len(), false);
                    if terminators.is_empty() {
                        return Ok((block, None));
                    }
                    return Err(self.syntax_error(format!(
                        "unexpected end of template, expected one of {terminators:?}"
                    )));
                }
                Some(open) => {
                    self.flush_text(&mut block, open.start, open.trim_left);
                    if open.is_output {
                        match self.parse_output(open) {
                            Ok(node) => block.push(node),
                            Err(e) => self.handle_error(e)?,
                        }
                        continue;
                    }
                    let header = match self.scan_tag_header(open) {
                        Ok(h) => h,
                        Err(e) => {
                            self.handle_error(e)?;
                            self.advance_to(open.content_start);
                            continue;
                        }
                    };
                    if terminators.contains(&header.name.as_str()) {
                        return Ok((block, Some(header)));
                    }
                    let outcome = match header.name.as_str() {
                        "raw" => self.finish_raw(&mut block),
                        "comment" => self.finish_comment(&mut block),
                        _ => self.dispatch_tag(header, &mut block),
                    };
                    if let Err(e) = outcome {
                        self.handle_error(e)?;
                    }
                }
            }
        }
    }

    fn parse_output(&mut self, open: DelimOpen) -> Result<Node, Error> {
        let (open_line, open_column) = self.peek_line_col(open.start);
        let close = find_closing(self.bytes, open.content_start, b"}}")
            .ok_or_else(|| Error::syntax("unterminated output statement", self.template_name.clone(), Location { line: open_line, column: open_column }))?;
        let trim_right = close > open.content_start && self.bytes[close - 1] == b'-';
        let inner_end = if trim_right { close - 1 } else { close };
        let inner = self.source[open.content_start..inner_end].trim();
        let (content_line, content_column) = self.peek_line_col(open.content_start);
        let tokens = lexer::lex_expression(inner, open.content_start, content_line, content_column, &self.template_name)?;
        let mut p = ExprParser::new(&tokens, &self.template_name);
        let expr = p.parse_filtered_expression()?;
        let span = Span::new(open.start, close + 2, open_line, open_column);
        self.advance_to(close + 2);
        self.pending_trim_right = trim_right;
        Ok(Node::Output(OutputNode { span, expr, trim_left: open.trim_left, trim_right }))
    }

    fn scan_tag_header(&mut self, open: DelimOpen) -> Result<TagHeader, Error> {
        let (open_line, open_column) = self.peek_line_col(open.start);
        let close = find_closing(self.bytes, open.content_start, b"%}")
            .ok_or_else(|| Error::syntax("unterminated tag", self.template_name.clone(), Location { line: open_line, column: open_column }))?;
        let trim_right = close > open.content_start && self.bytes[close - 1] == b'-';
        let inner_end = if trim_right { close - 1 } else { close };
        let inner_full = &self.source[open.content_start..inner_end];
        let lead_ws = inner_full.len() - inner_full.trim_start().len();
        let name_region = &inner_full[lead_ws..];
        let name_len = name_region
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(name_region.len());
        if name_len == 0 {
            return Err(Error::syntax("expected a tag name", self.template_name.clone(), Location { line: open_line, column: open_column }));
        }
        let name = name_region[..name_len].to_string();
        let rest_region = &name_region[name_len..];
        let rest_lead_ws = rest_region.len() - rest_region.trim_start().len();
        let rest = rest_region.trim().to_string();
        let rest_offset = open.content_start + lead_ws + name_len + rest_lead_ws;
        let (rest_line, rest_column) = self.peek_line_col(rest_offset);
        let span = Span::new(open.start, close + 2, open_line, open_column);
        self.advance_to(close + 2);
        self.pending_trim_right = trim_right;
        Ok(TagHeader { name, rest, rest_offset, rest_line, rest_column, span })
    }

    fn rest_tokens(&self, header: &TagHeader) -> Result<Vec<Token>, Error> {
        lexer::lex_expression(&header.rest, header.rest_offset, header.rest_line, header.rest_column, &self.template_name)
    }

    /// Scans literal source, ignoring any embedded tags, up to the next
    /// occurrence of `{% end_name %}` (allowing whitespace-control markers).
    fn scan_raw_until(&mut self, end_name: &str) -> Result<(String, usize), Error> {
        let mut search_from = self.cursor;
        loop {
            let rel = self.source[search_from..].find("{%").ok_or_else(|| {
                self.syntax_error(format!("unterminated '{{% {end_name} %}}'"))
            })?;
            let tag_start = search_from + rel;
            let mut p = tag_start + 2;
            if self.bytes.get(p) == Some(&b'-') {
                p += 1;
            }
            while self.bytes.get(p).is_some_and(u8::is_ascii_whitespace) {
                p += 1;
            }
            if let Some(rest) = self.source.get(p..) {
                if rest.starts_with(end_name) {
                    let name_end = p + end_name.len();
                    let boundary_ok = self.bytes.get(name_end).map_or(true, |b| !b.is_ascii_alphanumeric() && *b != b'_');
                    if boundary_ok {
                        if let Some(close_rel) = self.source[name_end..].find("%}") {
                            let close = name_end + close_rel;
                            let trim_right = close > 0 && self.bytes[close - 1] == b'-';
                            let literal = self.source[self.cursor..tag_start].to_string();
                            self.advance_to(close + 2);
                            self.pending_trim_right = trim_right;
                            return Ok((literal, tag_start));
                        }
                    }
                }
            }
            search_from = tag_start + 2;
        }
    }

    fn finish_raw(&mut self, block: &mut Block) -> Result<(), Error> {
        let start = self.cursor;
        let (text, _) = self.scan_raw_until("endraw")?;
        let span = Span::new(start, self.cursor, self.line, self.column);
        block.push(Node::Raw(RawNode { span, text }));
        Ok(())
    }

    fn finish_comment(&mut self, block: &mut Block) -> Result<(), Error> {
        let start = self.cursor;
        self.scan_raw_until("endcomment")?;
        let span = Span::new(start, self.cursor, self.line, self.column);
        block.push(Node::Comment(CommentNode { span }));
        Ok(())
    }

    fn parse_liquid_body(&mut self, body: &str) -> Result<Block, Error> {
        let mut synthetic = String::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            synthetic.push_str("{% ");
            synthetic.push_str(line);
            synthetic.push_str(" %}");
        }
        let mut sub = Parser::new(&self.template_name, &synthetic, self.tolerance);
        let (block, _) = sub.parse_block(&[])?;
        self.diagnostics.extend(sub.diagnostics);
        Ok(block)
    }

    fn dispatch_tag(&mut self, header: TagHeader, block: &mut Block) -> Result<(), Error> {
        match header.name.as_str() {
            "if" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let cond = p.parse_boolean_expression()?;
                let (then_block, mut term) = self.parse_block(&["elsif", "else", "endif"])?;

                let mut elsif_branches = Vec::new();
                while let Some(t) = term.as_ref().filter(|t| t.name == "elsif") {
                    let etoks = self.rest_tokens(t)?;
                    let mut ep = ExprParser::new(&etoks, &self.template_name);
                    let econd = ep.parse_boolean_expression()?;
                    let (eblock, next_term) = self.parse_block(&["elsif", "else", "endif"])?;
                    elsif_branches.push(ElsifBranch { span: t.span, cond: econd, block: eblock });
                    term = next_term;
                }

                let else_block = if term.as_ref().is_some_and(|t| t.name == "else") {
                    let (eb, next_term) = self.parse_block(&["endif"])?;
                    term = next_term;
                    Some(eb)
                } else {
                    None
                };

                self.expect_terminator(&term, "endif")?;
                block.push(Node::If(IfNode { span: header.span, cond, then_block, elsif_branches, else_block }));
            }
            "unless" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let cond = p.parse_boolean_expression()?;
                let (then_block, term) = self.parse_block(&["else", "endunless"])?;
                let (else_block, term) = if term.as_ref().is_some_and(|t| t.name == "else") {
                    let (eb, next_term) = self.parse_block(&["endunless"])?;
                    (Some(eb), next_term)
                } else {
                    (None, term)
                };
                self.expect_terminator(&term, "endunless")?;
                block.push(Node::Unless(UnlessNode { span: header.span, cond, then_block, else_block }));
            }
            "case" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let expr = p.parse_primary()?;
                let (_preamble, mut term) = self.parse_block(&["when", "else", "endcase"])?;

                let mut whens = Vec::new();
                let mut else_block = None;
                loop {
                    match term {
                        Some(t) if t.name == "when" => {
                            let wtoks = self.rest_tokens(&t)?;
                            let mut wp = ExprParser::new(&wtoks, &self.template_name);
                            let values = wp.parse_primary_list()?;
                            let (wblock, next_term) = self.parse_block(&["when", "else", "endcase"])?;
                            whens.push(WhenBranch { span: t.span, values, block: wblock });
                            term = next_term;
                        }
                        Some(t) if t.name == "else" => {
                            let (eb, next_term) = self.parse_block(&["endcase"])?;
                            else_block = Some(eb);
                            term = next_term;
                            break;
                        }
                        other => {
                            term = other;
                            break;
                        }
                    }
                }
                self.expect_terminator(&term, "endcase")?;
                block.push(Node::Case(CaseNode { span: header.span, expr, whens, else_block }));
            }
            "for" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let (var, loop_expr) = p.parse_loop_header()?;
                let (then_block, term) = self.parse_block(&["else", "endfor"])?;
                let (else_block, term) = if term.as_ref().is_some_and(|t| t.name == "else") {
                    let (eb, next_term) = self.parse_block(&["endfor"])?;
                    (Some(eb), next_term)
                } else {
                    (None, term)
                };
                self.expect_terminator(&term, "endfor")?;
                block.push(Node::For(ForNode { span: header.span, var, loop_expr, then_block, else_block }));
            }
            "tablerow" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let (var, loop_expr) = p.parse_loop_header()?;
                let (body, term) = self.parse_block(&["endtablerow"])?;
                self.expect_terminator(&term, "endtablerow")?;
                block.push(Node::TableRow(TableRowNode { span: header.span, var, loop_expr, body }));
            }
            "capture" => {
                if header.rest.is_empty() {
                    return Err(self.syntax_error("expected a variable name after 'capture'"));
                }
                let (body, term) = self.parse_block(&["endcapture"])?;
                self.expect_terminator(&term, "endcapture")?;
                block.push(Node::Capture(CaptureNode { span: header.span, name: header.rest, body }));
            }
            "ifchanged" => {
                let (body, term) = self.parse_block(&["endifchanged"])?;
                self.expect_terminator(&term, "endifchanged")?;
                block.push(Node::Ifchanged(IfchangedNode { span: header.span, body }));
            }
            "assign" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let (name, expr) = p.parse_assignment()?;
                block.push(Node::Assign(AssignNode { span: header.span, name, expr }));
            }
            "increment" => {
                if header.rest.is_empty() {
                    return Err(self.syntax_error("expected a variable name after 'increment'"));
                }
                block.push(Node::Increment(IncrementNode { span: header.span, name: header.rest }));
            }
            "decrement" => {
                if header.rest.is_empty() {
                    return Err(self.syntax_error("expected a variable name after 'decrement'"));
                }
                block.push(Node::Decrement(DecrementNode { span: header.span, name: header.rest }));
            }
            "break" => block.push(Node::Break(header.span)),
            "continue" => block.push(Node::Continue(header.span)),
            "cycle" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let (group, values) = p.parse_cycle()?;
                block.push(Node::Cycle(CycleNode { span: header.span, group, values }));
            }
            "include" | "render" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let name = p.parse_primary()?;
                let args = p.parse_partial_args()?;
                let node = if header.name == "include" {
                    Node::Include(IncludeNode { span: header.span, name, args })
                } else {
                    Node::Render(RenderNode { span: header.span, name, args })
                };
                block.push(node);
            }
            "echo" => {
                let tokens = self.rest_tokens(&header)?;
                let mut p = ExprParser::new(&tokens, &self.template_name);
                let expr = p.parse_filtered_expression()?;
                block.push(Node::Echo(EchoNode { span: header.span, expr }));
            }
            "liquid" => {
                let statements = self.parse_liquid_body(&header.rest)?;
                block.push(Node::Liquid(LiquidNode { span: header.span, statements }));
            }
            other => return Err(self.syntax_error(format!("unknown tag '{other}'"))),
        }
        Ok(())
    }

    fn expect_terminator(&self, term: &Option<TagHeader>, expected: &str) -> Result<(), Error> {
        match term {
            Some(t) if t.name == expected => Ok(()),
            _ => Err(self.syntax_error(format!("expected '{expected}'"))),
        }
    }
}

/// Finds the byte offset of `closer` at or after `idx`, skipping over
/// single- or double-quoted runs so a delimiter-like sequence inside a
/// string literal doesn't terminate the tag early.
fn find_closing(bytes: &[u8], mut idx: usize, closer: &[u8]) -> Option<usize> {
    let mut in_string: Option<u8> = None;
    while idx < bytes.len() {
        let c = bytes[idx];
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            idx += 1;
            continue;
        }
        if c == b'\'' || c == b'"' {
            in_string = Some(c);
            idx += 1;
            continue;
        }
        if bytes[idx..].starts_with(closer) {
            return Some(idx);
        }
        idx += 1;
    }
    None
}

fn scan_line_col(mut line: u32, mut column: u32, text: &str) -> (u32, u32) {
    for ch in text.chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Ast {
        parse_template("t", source, ToleranceMode::Strict).unwrap().ast
    }

    #[test]
    fn parses_plain_text_and_output() {
        let ast = parse("hello {{ name }}!");
        assert_eq!(ast.root.nodes.len(), 3);
        assert!(matches!(ast.root.nodes[0], Node::TextLiteral(_)));
        assert!(matches!(ast.root.nodes[1], Node::Output(_)));
        assert!(matches!(ast.root.nodes[2], Node::TextLiteral(_)));
    }

    #[test]
    fn whitespace_control_trims_adjacent_text() {
        let ast = parse("a \n{%- if true -%}\n b \n{%- endif -%}\n c");
        let rendered_text: Vec<&str> = ast
            .root
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::TextLiteral(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(rendered_text, vec!["a"]);
    }

    #[test]
    fn parses_if_elsif_else() {
        let ast = parse("{% if a %}A{% elsif b %}B{% else %}C{% endif %}");
        match &ast.root.nodes[0] {
            Node::If(n) => {
                assert_eq!(n.elsif_branches.len(), 1);
                assert!(n.else_block.is_some());
            }
            other => panic!("expected If, got {other}"),
        }
    }

    #[test]
    fn parses_for_with_modifiers_and_else() {
        let ast = parse("{% for x in (1..3) limit: 2 reversed %}{{ x }}{% else %}none{% endfor %}");
        match &ast.root.nodes[0] {
            Node::For(n) => {
                assert_eq!(n.var, "x");
                assert!(n.loop_expr.reversed);
                assert!(n.else_block.is_some());
            }
            other => panic!("expected For, got {other}"),
        }
    }

    #[test]
    fn raw_block_is_not_interpreted() {
        let ast = parse("{% raw %}{{ not an expr }}{% endraw %}");
        match &ast.root.nodes[0] {
            Node::Raw(n) => assert_eq!(n.text, "{{ not an expr }}"),
            other => panic!("expected Raw, got {other}"),
        }
    }

    #[test]
    fn comment_block_is_discarded() {
        let ast = parse("a{% comment %}{% if %}garbage{% endcomment %}b");
        assert_eq!(ast.root.nodes.len(), 3);
        assert!(matches!(ast.root.nodes[1], Node::Comment(_)));
    }

    #[test]
    fn liquid_tag_parses_multiple_statements() {
        let ast = parse("{% liquid\n  assign x = 1\n  echo x\n%}");
        match &ast.root.nodes[0] {
            Node::Liquid(n) => assert_eq!(n.statements.nodes.len(), 2),
            other => panic!("expected Liquid, got {other}"),
        }
    }

    #[test]
    fn liquid_tag_skips_hash_comment_lines() {
        let ast = parse("{% liquid\n  # a note\n  assign x = 1\n  # another\n  echo x\n%}");
        match &ast.root.nodes[0] {
            Node::Liquid(n) => assert_eq!(n.statements.nodes.len(), 2),
            other => panic!("expected Liquid, got {other}"),
        }
    }

    #[test]
    fn unknown_tag_is_fatal_in_strict_mode() {
        let err = parse_template("t", "{% bogus %}", ToleranceMode::Strict);
        assert!(err.is_err());
    }

    #[test]
    fn unknown_tag_is_recovered_in_warn_mode() {
        let outcome = parse_template("t", "before {% bogus %} after", ToleranceMode::Warn).unwrap();
        assert_eq!(outcome.diagnostics.len(), 1);
    }
}
