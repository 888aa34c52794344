//! AST node variants.
//!
//! The AST is a closed set of variants: [`QueryNode`] is an enum with one
//! struct per variant, and visitors dispatch exhaustively over it. Nodes own
//! their children; textual attributes are [`Text`] views into the original
//! input until a visitor assigns a synthetic value.
//!
//! Equality between nodes is structural and ignores source positions, so a
//! parsed document compares equal to the re-parse of its rendering.

use std::borrow::Cow;

use crate::text::{self, Text};

/// A `+` or `-` prefix on an atom. `NOT` becomes a [`NotNode`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    /// `+` — the clause must match.
    Required,
    /// `-` — the clause must not match.
    Prohibited,
}

impl Prefix {
    /// The query-string spelling of this prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Prefix::Required => "+",
            Prefix::Prohibited => "-",
        }
    }
}

/// The operator joining the two sides of a [`BooleanQueryNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    /// Both sides must match. Binds tighter than `Or`.
    And,
    /// Either side may match.
    Or,
}

impl BooleanOperator {
    /// The query-string spelling of this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOperator::And => "AND",
            BooleanOperator::Or => "OR",
        }
    }
}

/// Short-form range comparators (`field:>5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOperator {
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl RangeOperator {
    /// The query-string spelling of this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeOperator::Gt => ">",
            RangeOperator::Gte => ">=",
            RangeOperator::Lt => "<",
            RangeOperator::Lte => "<=",
        }
    }

    /// Whether the populated bound is inclusive.
    pub fn is_inclusive(&self) -> bool {
        matches!(self, RangeOperator::Gte | RangeOperator::Lte)
    }

    /// Whether this operator populates the lower bound.
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, RangeOperator::Gt | RangeOperator::Gte)
    }
}

/// The root of a parsed query. Empty input yields `query: None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDocument {
    /// The root query, if the input was non-empty.
    pub query: Option<QueryNode>,
}

impl QueryDocument {
    /// Create a document with the given root query.
    pub fn new(query: Option<QueryNode>) -> Self {
        QueryDocument { query }
    }

    /// Check if this document holds no query.
    pub fn is_empty(&self) -> bool {
        self.query.is_none()
    }
}

/// A query AST node. The set of variants is closed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// A parenthesized subquery.
    Group(GroupNode),
    /// Two subqueries joined by `AND` or `OR`.
    Boolean(BooleanQueryNode),
    /// A negated subquery (`NOT x`, `!x`).
    Not(NotNode),
    /// A field-qualified subquery (`field:...`).
    Field(FieldQueryNode),
    /// A bare term, possibly with wildcards.
    Term(TermNode),
    /// A quoted phrase.
    Phrase(PhraseNode),
    /// A regex literal (`/.../`).
    Regex(RegexNode),
    /// A bracketed or short-form range.
    Range(RangeNode),
    /// The body of a `field:(t1 t2 t3)` expansion.
    MultiTerm(MultiTermNode),
    /// `_exists_:field`
    Exists(ExistsNode),
    /// `_missing_:field`
    Missing(MissingNode),
    /// `*:*`
    MatchAll(MatchAllNode),
}

impl QueryNode {
    /// Byte offset of this node in the original input, if known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            QueryNode::Group(n) => n.offset,
            QueryNode::Boolean(n) => n.offset,
            QueryNode::Not(n) => n.offset,
            QueryNode::Field(n) => n.offset,
            QueryNode::Term(n) => n.offset,
            QueryNode::Phrase(n) => n.offset,
            QueryNode::Regex(n) => n.offset,
            QueryNode::Range(n) => n.offset,
            QueryNode::MultiTerm(n) => n.offset,
            QueryNode::Exists(n) => n.offset,
            QueryNode::Missing(n) => n.offset,
            QueryNode::MatchAll(n) => n.offset,
        }
    }

    /// A short name for the variant, used in diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            QueryNode::Group(_) => "group",
            QueryNode::Boolean(_) => "boolean",
            QueryNode::Not(_) => "not",
            QueryNode::Field(_) => "field",
            QueryNode::Term(_) => "term",
            QueryNode::Phrase(_) => "phrase",
            QueryNode::Regex(_) => "regex",
            QueryNode::Range(_) => "range",
            QueryNode::MultiTerm(_) => "multi_term",
            QueryNode::Exists(_) => "exists",
            QueryNode::Missing(_) => "missing",
            QueryNode::MatchAll(_) => "match_all",
        }
    }
}

/// A parenthesized subquery, with an optional field qualifier when the group
/// was written as `field:(...)`.
#[derive(Debug, Clone)]
pub struct GroupNode {
    /// The grouped subquery.
    pub child: Box<QueryNode>,
    /// The field qualifier, when written as `field:(...)`.
    pub field: Option<Text>,
    /// Boost factor from a trailing `^n`.
    pub boost: Option<f32>,
    /// `+` or `-` prefix on the group.
    pub prefix: Option<Prefix>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl GroupNode {
    /// Create a group around a child query.
    pub fn new(child: QueryNode) -> Self {
        GroupNode {
            child: Box::new(child),
            field: None,
            boost: None,
            prefix: None,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for GroupNode {
    fn eq(&self, other: &Self) -> bool {
        self.child == other.child
            && self.field == other.field
            && self.boost == other.boost
            && self.prefix == other.prefix
    }
}

/// Two subqueries joined by a boolean operator. Always has exactly two
/// non-null children; single-sided expressions are lifted into a [`NotNode`]
/// or a prefix on the child instead.
#[derive(Debug, Clone)]
pub struct BooleanQueryNode {
    /// The left operand.
    pub left: Box<QueryNode>,
    /// The right operand.
    pub right: Box<QueryNode>,
    /// The joining operator.
    pub op: BooleanOperator,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl BooleanQueryNode {
    /// Join two queries with an operator.
    pub fn new(left: QueryNode, op: BooleanOperator, right: QueryNode) -> Self {
        let offset = left.offset();
        BooleanQueryNode {
            left: Box::new(left),
            right: Box::new(right),
            op,
            offset,
        }
    }
}

impl PartialEq for BooleanQueryNode {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left && self.right == other.right && self.op == other.op
    }
}

/// A negated subquery.
#[derive(Debug, Clone)]
pub struct NotNode {
    /// The negated subquery.
    pub child: Box<QueryNode>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl NotNode {
    /// Negate a child query.
    pub fn new(child: QueryNode) -> Self {
        NotNode {
            child: Box::new(child),
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for NotNode {
    fn eq(&self, other: &Self) -> bool {
        self.child == other.child
    }
}

/// A field-qualified subquery. The field is always non-empty; bare atoms are
/// used directly without this wrapper.
#[derive(Debug, Clone)]
pub struct FieldQueryNode {
    /// The field name as written.
    pub field: Text,
    /// The qualified subquery: term, phrase, regex, range, group, or
    /// multi-term.
    pub query: Box<QueryNode>,
    /// `+` or `-` prefix.
    pub prefix: Option<Prefix>,
    /// Boost factor from a trailing `^n`.
    pub boost: Option<f32>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl FieldQueryNode {
    /// Qualify a subquery with a field name.
    pub fn new(field: Text, query: QueryNode) -> Self {
        FieldQueryNode {
            field,
            query: Box::new(query),
            prefix: None,
            boost: None,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for FieldQueryNode {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
            && self.query == other.query
            && self.prefix == other.prefix
            && self.boost == other.boost
    }
}

/// A single term. `term` keeps the raw spelling with escapes intact;
/// [`TermNode::unescaped_term`] resolves them lazily.
#[derive(Debug, Clone)]
pub struct TermNode {
    /// The raw term text as written, escape sequences intact.
    pub term: Text,
    /// `+` or `-` prefix.
    pub prefix: Option<Prefix>,
    /// Boost factor from a trailing `^n`.
    pub boost: Option<f32>,
    /// Fuzzy edit distance from a trailing `~n`.
    pub fuzzy: Option<u32>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl TermNode {
    /// Create a term node from raw text.
    pub fn new(term: Text) -> Self {
        TermNode {
            term,
            prefix: None,
            boost: None,
            fuzzy: None,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The term with Lucene `\x` escapes resolved.
    pub fn unescaped_term(&self) -> Cow<'_, str> {
        text::unescape(self.term.as_str())
    }

    /// Overwrite the term with a synthetic value. The value is re-escaped
    /// so the raw form stays renderable; wildcards are kept verbatim.
    pub fn set_unescaped<S: AsRef<str>>(&mut self, value: S) {
        self.term.set(text::escape(value.as_ref()));
    }

    /// Whether the unescaped term starts with a wildcard character.
    pub fn has_leading_wildcard(&self) -> bool {
        matches!(self.unescaped_term().chars().next(), Some('*') | Some('?'))
    }
}

impl PartialEq for TermNode {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term
            && self.prefix == other.prefix
            && self.boost == other.boost
            && self.fuzzy == other.fuzzy
    }
}

/// A quoted phrase. `phrase` holds the unescaped content.
#[derive(Debug, Clone)]
pub struct PhraseNode {
    /// The phrase content with `\"` and `\\` escapes resolved.
    pub phrase: Text,
    /// Proximity slop from a trailing `~n`.
    pub proximity: Option<u32>,
    /// `+` or `-` prefix.
    pub prefix: Option<Prefix>,
    /// Boost factor from a trailing `^n`.
    pub boost: Option<f32>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl PhraseNode {
    /// Create a phrase node from unescaped content.
    pub fn new(phrase: Text) -> Self {
        PhraseNode {
            phrase,
            proximity: None,
            prefix: None,
            boost: None,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for PhraseNode {
    fn eq(&self, other: &Self) -> bool {
        self.phrase == other.phrase
            && self.proximity == other.proximity
            && self.prefix == other.prefix
            && self.boost == other.boost
    }
}

/// A regex literal delimited by `/.../`.
#[derive(Debug, Clone)]
pub struct RegexNode {
    /// The pattern between the slashes, `\/` escapes intact.
    pub pattern: Text,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl RegexNode {
    /// Create a regex node from the pattern source.
    pub fn new(pattern: Text) -> Self {
        RegexNode {
            pattern,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for RegexNode {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// A range query, either bracketed (`[a TO b]`, `{a TO b}`, mixed) or
/// short-form (`>5`). A `None` bound renders as `*`.
#[derive(Debug, Clone)]
pub struct RangeNode {
    /// The field qualifier, if any.
    pub field: Option<Text>,
    /// Lower bound; `None` means unbounded.
    pub min: Option<Text>,
    /// Upper bound; `None` means unbounded.
    pub max: Option<Text>,
    /// Whether the lower bound is inclusive (`[`).
    pub min_inclusive: bool,
    /// Whether the upper bound is inclusive (`]`).
    pub max_inclusive: bool,
    /// Set for short-form ranges; exactly one bound is then populated and
    /// its inclusivity follows the operator.
    pub operator: Option<RangeOperator>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl RangeNode {
    /// Create a bracketed range.
    pub fn new(
        min: Option<Text>,
        max: Option<Text>,
        min_inclusive: bool,
        max_inclusive: bool,
    ) -> Self {
        RangeNode {
            field: None,
            min,
            max,
            min_inclusive,
            max_inclusive,
            operator: None,
            offset: None,
        }
    }

    /// Create a short-form range (`>value` etc.).
    pub fn short_form(operator: RangeOperator, value: Text) -> Self {
        let inclusive = operator.is_inclusive();
        let (min, max, min_inclusive, max_inclusive) = if operator.is_lower_bound() {
            (Some(value), None, inclusive, false)
        } else {
            (None, Some(value), false, inclusive)
        };
        RangeNode {
            field: None,
            min,
            max,
            min_inclusive,
            max_inclusive,
            operator: Some(operator),
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for RangeNode {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
            && self.min == other.min
            && self.max == other.max
            && self.min_inclusive == other.min_inclusive
            && self.max_inclusive == other.max_inclusive
            && self.operator == other.operator
    }
}

/// The body of a `field:(t1 t2 t3)` expansion.
#[derive(Debug, Clone)]
pub struct MultiTermNode {
    /// The terms inside the parentheses, in source order.
    pub terms: Vec<TermNode>,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl MultiTermNode {
    /// Create a multi-term node.
    pub fn new(terms: Vec<TermNode>) -> Self {
        MultiTermNode {
            terms,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for MultiTermNode {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
    }
}

/// `_exists_:field`
#[derive(Debug, Clone)]
pub struct ExistsNode {
    /// The field that must be present.
    pub field: Text,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl ExistsNode {
    /// Create an exists node.
    pub fn new(field: Text) -> Self {
        ExistsNode {
            field,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for ExistsNode {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
    }
}

/// `_missing_:field`
#[derive(Debug, Clone)]
pub struct MissingNode {
    /// The field that must be absent.
    pub field: Text,
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl MissingNode {
    /// Create a missing node.
    pub fn new(field: Text) -> Self {
        MissingNode {
            field,
            offset: None,
        }
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for MissingNode {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
    }
}

/// `*:*` — matches every document.
#[derive(Debug, Clone, Default)]
pub struct MatchAllNode {
    /// Byte offset in the original input.
    pub offset: Option<usize>,
}

impl MatchAllNode {
    /// Create a match-all node.
    pub fn new() -> Self {
        MatchAllNode::default()
    }

    /// Set the source offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl PartialEq for MatchAllNode {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl From<GroupNode> for QueryNode {
    fn from(node: GroupNode) -> Self {
        QueryNode::Group(node)
    }
}

impl From<BooleanQueryNode> for QueryNode {
    fn from(node: BooleanQueryNode) -> Self {
        QueryNode::Boolean(node)
    }
}

impl From<NotNode> for QueryNode {
    fn from(node: NotNode) -> Self {
        QueryNode::Not(node)
    }
}

impl From<FieldQueryNode> for QueryNode {
    fn from(node: FieldQueryNode) -> Self {
        QueryNode::Field(node)
    }
}

impl From<TermNode> for QueryNode {
    fn from(node: TermNode) -> Self {
        QueryNode::Term(node)
    }
}

impl From<PhraseNode> for QueryNode {
    fn from(node: PhraseNode) -> Self {
        QueryNode::Phrase(node)
    }
}

impl From<RegexNode> for QueryNode {
    fn from(node: RegexNode) -> Self {
        QueryNode::Regex(node)
    }
}

impl From<RangeNode> for QueryNode {
    fn from(node: RangeNode) -> Self {
        QueryNode::Range(node)
    }
}

impl From<MultiTermNode> for QueryNode {
    fn from(node: MultiTermNode) -> Self {
        QueryNode::MultiTerm(node)
    }
}

impl From<ExistsNode> for QueryNode {
    fn from(node: ExistsNode) -> Self {
        QueryNode::Exists(node)
    }
}

impl From<MissingNode> for QueryNode {
    fn from(node: MissingNode) -> Self {
        QueryNode::Missing(node)
    }
}

impl From<MatchAllNode> for QueryNode {
    fn from(node: MatchAllNode) -> Self {
        QueryNode::MatchAll(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_offsets() {
        let a = TermNode::new(Text::owned("rust")).with_offset(0);
        let b = TermNode::new(Text::owned("rust")).with_offset(17);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unescaped_term_is_lazy() {
        let node = TermNode::new(Text::owned(r"a\:b"));
        assert_eq!(node.term.as_str(), r"a\:b");
        assert_eq!(node.unescaped_term(), "a:b");
    }

    #[test]
    fn test_set_unescaped_reescapes() {
        let mut node = TermNode::new(Text::owned("old"));
        node.set_unescaped("with:colon");
        assert_eq!(node.term.as_str(), r"with\:colon");
        assert_eq!(node.unescaped_term(), "with:colon");
    }

    #[test]
    fn test_leading_wildcard() {
        assert!(TermNode::new(Text::owned("*abc")).has_leading_wildcard());
        assert!(TermNode::new(Text::owned("?abc")).has_leading_wildcard());
        assert!(!TermNode::new(Text::owned("abc*")).has_leading_wildcard());
    }

    #[test]
    fn test_short_form_range_populates_one_bound() {
        let gt = RangeNode::short_form(RangeOperator::Gt, Text::owned("5"));
        assert_eq!(gt.min.as_ref().unwrap().as_str(), "5");
        assert!(gt.max.is_none());
        assert!(!gt.min_inclusive);

        let lte = RangeNode::short_form(RangeOperator::Lte, Text::owned("9"));
        assert!(lte.min.is_none());
        assert_eq!(lte.max.as_ref().unwrap().as_str(), "9");
        assert!(lte.max_inclusive);
    }

    #[test]
    fn test_boolean_node_keeps_two_children() {
        let node = BooleanQueryNode::new(
            TermNode::new(Text::owned("a")).into(),
            BooleanOperator::And,
            TermNode::new(Text::owned("b")).into(),
        );
        assert_eq!(node.op, BooleanOperator::And);
        assert_eq!(node.left.variant_name(), "term");
        assert_eq!(node.right.variant_name(), "term");
    }
}
