//! Rendering an AST back into a query string.
//!
//! The invariant: for any AST `A` produced by parsing input `s`,
//! `parse(build(A))` yields an AST structurally equal to `A`, modulo
//! whitespace normalization.

use std::any::Any;

use async_trait::async_trait;

use crate::ast::{
    BooleanQueryNode, ExistsNode, FieldQueryNode, GroupNode, MissingNode, MultiTermNode, NotNode,
    PhraseNode, QueryDocument, QueryNode, RangeNode, RegexNode, TermNode,
};
use crate::error::Result;
use crate::visitor::context::VisitorContext;
use crate::visitor::QueryNodeVisitor;

/// A visitor that accumulates the query-string rendering of a document.
///
/// Terms emit their raw text (escapes intact), so rendering a parsed term
/// reproduces exactly what was written. Synthetic values assigned through
/// [`TermNode::set_unescaped`] arrive pre-escaped.
#[derive(Debug, Default)]
pub struct QueryStringVisitor {
    buffer: String,
}

impl QueryStringVisitor {
    /// Create an empty builder.
    pub fn new() -> Self {
        QueryStringVisitor::default()
    }

    /// Render a document to a query string.
    pub fn build(document: &QueryDocument) -> String {
        let mut out = String::new();
        if let Some(query) = &document.query {
            write_node(&mut out, query);
        }
        out
    }

    /// The rendering accumulated by the last traversal.
    pub fn result(&self) -> &str {
        &self.buffer
    }

    /// Consume the builder, returning the rendering.
    pub fn into_string(self) -> String {
        self.buffer
    }
}

#[async_trait]
impl QueryNodeVisitor for QueryStringVisitor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn visit_document(
        &mut self,
        document: &mut QueryDocument,
        _context: &mut VisitorContext,
    ) -> Result<()> {
        self.buffer = Self::build(document);
        Ok(())
    }
}

fn write_node(out: &mut String, node: &QueryNode) {
    match node {
        QueryNode::Group(n) => write_group(out, n),
        QueryNode::Boolean(n) => write_boolean(out, n),
        QueryNode::Not(n) => write_not(out, n),
        QueryNode::Field(n) => write_field(out, n),
        QueryNode::Term(n) => write_term(out, n),
        QueryNode::Phrase(n) => write_phrase(out, n),
        QueryNode::Regex(n) => write_regex(out, n),
        QueryNode::Range(n) => write_range(out, n),
        QueryNode::MultiTerm(n) => write_multi_term(out, n),
        QueryNode::Exists(n) => write_exists(out, n),
        QueryNode::Missing(n) => write_missing(out, n),
        QueryNode::MatchAll(_) => out.push_str("*:*"),
    }
}

fn write_boost(out: &mut String, boost: Option<f32>) {
    if let Some(boost) = boost {
        out.push('^');
        out.push_str(&boost.to_string());
    }
}

fn write_group(out: &mut String, node: &GroupNode) {
    if let Some(prefix) = node.prefix {
        out.push_str(prefix.as_str());
    }
    if let Some(field) = &node.field {
        out.push_str(field.as_str());
        out.push(':');
    }
    out.push('(');
    write_node(out, &node.child);
    out.push(')');
    write_boost(out, node.boost);
}

fn write_boolean(out: &mut String, node: &BooleanQueryNode) {
    write_node(out, &node.left);
    out.push(' ');
    out.push_str(node.op.as_str());
    out.push(' ');
    write_node(out, &node.right);
}

fn write_not(out: &mut String, node: &NotNode) {
    out.push_str("NOT ");
    write_node(out, &node.child);
}

fn write_field(out: &mut String, node: &FieldQueryNode) {
    if let Some(prefix) = node.prefix {
        out.push_str(prefix.as_str());
    }
    out.push_str(node.field.as_str());
    out.push(':');
    write_node(out, &node.query);
    write_boost(out, node.boost);
}

fn write_term(out: &mut String, node: &TermNode) {
    if let Some(prefix) = node.prefix {
        out.push_str(prefix.as_str());
    }
    out.push_str(node.term.as_str());
    if let Some(fuzzy) = node.fuzzy {
        out.push('~');
        out.push_str(&fuzzy.to_string());
    }
    write_boost(out, node.boost);
}

fn write_phrase(out: &mut String, node: &PhraseNode) {
    if let Some(prefix) = node.prefix {
        out.push_str(prefix.as_str());
    }
    out.push('"');
    for ch in node.phrase.as_str().chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    if let Some(proximity) = node.proximity {
        out.push('~');
        out.push_str(&proximity.to_string());
    }
    write_boost(out, node.boost);
}

fn write_regex(out: &mut String, node: &RegexNode) {
    out.push('/');
    out.push_str(node.pattern.as_str());
    out.push('/');
}

fn write_range(out: &mut String, node: &RangeNode) {
    if let Some(field) = &node.field {
        out.push_str(field.as_str());
        out.push(':');
    }

    if let Some(operator) = node.operator {
        out.push_str(operator.as_str());
        let value = node.min.as_ref().or(node.max.as_ref());
        if let Some(value) = value {
            out.push_str(value.as_str());
        }
        return;
    }

    out.push(if node.min_inclusive { '[' } else { '{' });
    match &node.min {
        Some(min) => out.push_str(min.as_str()),
        None => out.push('*'),
    }
    out.push_str(" TO ");
    match &node.max {
        Some(max) => out.push_str(max.as_str()),
        None => out.push('*'),
    }
    out.push(if node.max_inclusive { ']' } else { '}' });
}

fn write_multi_term(out: &mut String, node: &MultiTermNode) {
    out.push('(');
    for (index, term) in node.terms.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        write_term(out, term);
    }
    out.push(')');
}

fn write_exists(out: &mut String, node: &ExistsNode) {
    out.push_str("_exists_:");
    out.push_str(node.field.as_str());
}

fn write_missing(out: &mut String, node: &MissingNode) {
    out.push_str("_missing_:");
    out.push_str(node.field.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trip(input: &str) -> String {
        let result = parse(input);
        assert!(result.is_success, "parse failed: {:?}", result.errors);
        QueryStringVisitor::build(&result.document)
    }

    #[test]
    fn test_simple_forms_round_trip_verbatim() {
        for input in [
            "hello",
            "title:rust",
            "\"hello world\"",
            "\"hello world\"~2",
            "title:rust^2.5",
            "roam~1",
            "NOT deleted",
            "(a OR b) AND c",
            "price:[100 TO 500]",
            "price:{100 TO 500}",
            "price:[* TO 500}",
            "price:>=100",
            "age:<30",
            "[1 TO 5]",
            "_exists_:title",
            "_missing_:title",
            "*:*",
            "/colou?r/",
            "name:/jo[nh]n/",
            "tags:(rust parser lexer)",
            "status:(active OR pending)",
            "@include:recent",
            "title:*hello",
            "prog*",
        ] {
            assert_eq!(round_trip(input), input);
        }
    }

    #[test]
    fn test_whitespace_is_normalized() {
        assert_eq!(round_trip("a   AND    b"), "a AND b");
        assert_eq!(round_trip("  title:rust  "), "title:rust");
    }

    #[test]
    fn test_escapes_are_preserved() {
        assert_eq!(round_trip(r"foo\:bar"), r"foo\:bar");
        assert_eq!(round_trip(r#""say \"hi\"""#), r#""say \"hi\"""#);
    }

    #[test]
    fn test_implicit_and_becomes_explicit() {
        assert_eq!(round_trip("rust parser"), "rust AND parser");
        assert_eq!(round_trip("+required -excluded"), "+required AND -excluded");
    }

    #[test]
    fn test_reparse_is_structurally_equal() {
        for input in [
            "title:\"hello world\" AND (status:active OR status:pending) \
             AND price:[100 TO 500] AND NOT deleted:true",
            "a AND b OR c",
            "+foo bar -baz",
            "f:(a b c) AND g:[1 TO 2}",
        ] {
            let first = parse(input);
            assert!(first.is_success);
            let rendered = QueryStringVisitor::build(&first.document);
            let second = parse(&rendered);
            assert!(second.is_success, "re-parse failed for {rendered:?}");
            assert_eq!(first.document, second.document, "round trip of {input:?}");
        }
    }

    #[tokio::test]
    async fn test_builder_as_visitor() {
        let mut document = parse("a AND b").document;
        let mut context = VisitorContext::new();
        let mut visitor = QueryStringVisitor::new();

        visitor
            .visit_document(&mut document, &mut context)
            .await
            .unwrap();
        assert_eq!(visitor.result(), "a AND b");
        assert_eq!(visitor.into_string(), "a AND b");
    }
}
