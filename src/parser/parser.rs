//! Recursive parser for Lucene-style query strings.
//!
//! # Grammar
//!
//! ```text
//! document   := or_expr? EOF
//! or_expr    := and_expr ((OR | '||') and_expr)*
//! and_expr   := unary ((AND | implicit) unary)*
//! unary      := (NOT | '!' | '+' | '-')? primary boost? fuzzy?
//! primary    := group | field_expr | range | atom
//! group      := '(' or_expr ')'
//! field_expr := IDENT ':' (group | range | atom | multi_term)
//! multi_term := '(' atom+ ')'
//! range      := ('[' | '{') bound 'TO' bound (']' | '}')   (mixed allowed)
//!             | ('>' | '>=' | '<' | '<=') bound
//! atom       := PHRASE | REGEX | term | '*:*'
//! ```
//!
//! `AND` binds tighter than `OR`; adjacent primaries are joined by an
//! implicit `AND`. The parser never fails: malformed input yields a
//! best-effort partial AST plus diagnostics, and every skipped token is
//! recorded in either the AST or the error list.

use std::sync::Arc;

use crate::ast::{
    BooleanOperator, BooleanQueryNode, ExistsNode, FieldQueryNode, GroupNode, MatchAllNode,
    MissingNode, MultiTermNode, NotNode, PhraseNode, Prefix, QueryDocument, QueryNode, RangeNode,
    RangeOperator, RegexNode, TermNode,
};
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::text::{SourceText, Text};
use crate::token::{Token, TokenKind};

/// Default edit distance for a bare `~` on a term.
const DEFAULT_FUZZINESS: u32 = 2;

/// The result of parsing a query string.
///
/// `document` is a best-effort AST even when `is_success` is false; it is
/// never empty for non-empty input.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The parsed (possibly partial) document.
    pub document: QueryDocument,
    /// True when no diagnostics were recorded.
    pub is_success: bool,
    /// Lexical and syntactic diagnostics, in source order of discovery.
    pub errors: Vec<ParseError>,
}

/// Parse a query string. Always returns; never panics on malformed input.
pub fn parse(input: &str) -> ParseResult {
    Parser::new(input).run()
}

struct Parser {
    source: SourceText,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    fn new(input: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let tokens: Vec<Token> = lexer
            .by_ref()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .collect();
        let errors = lexer.take_diagnostics();

        Parser {
            source: Arc::from(input),
            tokens,
            pos: 0,
            errors,
        }
    }

    fn run(mut self) -> ParseResult {
        let mut query = self.parse_document();

        // Non-empty input always yields a document, even when every token
        // was unrecognizable.
        if query.is_none() {
            if let Some(first) = self.tokens.iter().find(|t| t.kind != TokenKind::Eof) {
                query = Some(QueryNode::Term(
                    TermNode::new(Text::empty()).with_offset(first.start),
                ));
            }
        }

        ParseResult {
            document: QueryDocument::new(query),
            is_success: self.errors.is_empty(),
            errors: self.errors,
        }
    }

    // ----- token plumbing -------------------------------------------------

    fn peek(&self) -> Token {
        self.tokens
            .get(self.pos)
            .copied()
            .unwrap_or(Token::new(TokenKind::Eof, self.source.len(), 0))
    }

    fn peek_nth(&self, n: usize) -> Token {
        self.tokens
            .get(self.pos + n)
            .copied()
            .unwrap_or(Token::new(TokenKind::Eof, self.source.len(), 0))
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn text_of(&self, token: Token) -> Text {
        Text::slice(self.source.clone(), token.start, token.len)
    }

    fn error<S: Into<String>>(&mut self, message: S, offset: usize, length: usize) {
        self.errors
            .push(ParseError::new(message, offset, length.max(1)));
    }

    fn can_start_expr(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Not
                | TokenKind::Bang
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::LeftBrace
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Ident
                | TokenKind::Number
                | TokenKind::Phrase
                | TokenKind::Regex
                | TokenKind::Star
                | TokenKind::Question
        )
    }

    // ----- grammar --------------------------------------------------------

    fn parse_document(&mut self) -> Option<QueryNode> {
        while self.kind() == TokenKind::Error {
            self.bump();
        }
        if self.kind() == TokenKind::Eof {
            return None;
        }

        let mut node = self.parse_or_expr();

        // Anything left over is recovered at the top level: record the
        // stray token and splice further expressions with an implicit AND.
        while self.kind() != TokenKind::Eof {
            let stray = self.bump();
            if stray.kind != TokenKind::Error {
                self.error(
                    format!("unexpected token '{}'", stray.text(&self.source)),
                    stray.start,
                    stray.len,
                );
            }
            if self.can_start_expr() {
                let right = self.parse_or_expr();
                node = BooleanQueryNode::new(node, BooleanOperator::And, right).into();
            }
        }

        Some(node)
    }

    fn parse_or_expr(&mut self) -> QueryNode {
        let mut left = self.parse_and_expr();

        while self.kind() == TokenKind::Or {
            let op = self.bump();
            if self.can_start_expr() {
                let right = self.parse_and_expr();
                left = BooleanQueryNode::new(left, BooleanOperator::Or, right).into();
            } else {
                self.error("dangling 'OR' operator", op.start, op.len);
                break;
            }
        }

        left
    }

    fn parse_and_expr(&mut self) -> QueryNode {
        let mut left = self.parse_unary();

        loop {
            match self.kind() {
                TokenKind::And => {
                    let op = self.bump();
                    if self.can_start_expr() {
                        let right = self.parse_unary();
                        left = BooleanQueryNode::new(left, BooleanOperator::And, right).into();
                    } else {
                        self.error("dangling 'AND' operator", op.start, op.len);
                        break;
                    }
                }
                // An invalid token between two primaries: skip it (the lexer
                // already recorded it) and fall through to implicit AND.
                TokenKind::Error => {
                    self.bump();
                }
                _ if self.can_start_expr() => {
                    let right = self.parse_unary();
                    left = BooleanQueryNode::new(left, BooleanOperator::And, right).into();
                }
                _ => break,
            }
        }

        left
    }

    fn parse_unary(&mut self) -> QueryNode {
        match self.kind() {
            TokenKind::Not | TokenKind::Bang => {
                let op = self.bump();
                if self.can_start_expr() {
                    let child = self.parse_unary();
                    QueryNode::Not(NotNode::new(child).with_offset(op.start))
                } else {
                    self.error("dangling 'NOT' operator", op.start, op.len);
                    QueryNode::Term(TermNode::new(Text::empty()).with_offset(op.start))
                }
            }
            TokenKind::Plus => {
                let op = self.bump();
                let node = self.parse_postfixed_primary();
                self.apply_prefix(node, Prefix::Required, op)
            }
            TokenKind::Minus => {
                let op = self.bump();
                let node = self.parse_postfixed_primary();
                self.apply_prefix(node, Prefix::Prohibited, op)
            }
            _ => self.parse_postfixed_primary(),
        }
    }

    fn parse_postfixed_primary(&mut self) -> QueryNode {
        let node = self.parse_primary();
        self.parse_postfix(node)
    }

    fn parse_postfix(&mut self, mut node: QueryNode) -> QueryNode {
        loop {
            match self.kind() {
                TokenKind::Caret => {
                    let caret = self.bump();
                    if self.kind() == TokenKind::Number {
                        let number = self.bump();
                        let boost: f32 = number.text(&self.source).parse().unwrap_or(1.0);
                        node = self.apply_boost(node, boost);
                    } else {
                        self.error("expected number after '^'", caret.start, caret.len);
                    }
                }
                TokenKind::Tilde => {
                    let tilde = self.bump();
                    let value = if self.kind() == TokenKind::Number {
                        let number = self.bump();
                        number
                            .text(&self.source)
                            .parse::<f32>()
                            .ok()
                            .map(|v| v as u32)
                    } else {
                        None
                    };
                    node = self.apply_fuzzy(node, value, tilde);
                }
                _ => break,
            }
        }
        node
    }

    fn parse_primary(&mut self) -> QueryNode {
        loop {
            let token = self.peek();
            return match token.kind {
                TokenKind::Error => {
                    self.bump();
                    continue;
                }
                TokenKind::LeftParen => self.parse_group(),
                TokenKind::LeftBracket | TokenKind::LeftBrace => self.parse_range(None, None),
                TokenKind::Gt | TokenKind::Ge | TokenKind::Lt | TokenKind::Le => {
                    self.parse_short_range(None, None)
                }
                TokenKind::Phrase => self.parse_phrase_atom(),
                TokenKind::Regex => self.parse_regex_atom(),
                TokenKind::Number => {
                    let tok = self.bump();
                    QueryNode::Term(self.term_from(tok))
                }
                TokenKind::Ident => self.parse_ident_primary(),
                TokenKind::Star => self.parse_star_primary(),
                TokenKind::Question => {
                    let tok = self.bump();
                    QueryNode::Term(self.term_from(tok))
                }
                _ => {
                    self.error("expected expression", token.start, token.len);
                    QueryNode::Term(TermNode::new(Text::empty()).with_offset(token.start))
                }
            };
        }
    }

    fn parse_ident_primary(&mut self) -> QueryNode {
        let ident = self.bump();
        if self.kind() != TokenKind::Colon {
            return QueryNode::Term(self.term_from(ident));
        }
        let colon = self.bump();

        match ident.text(&self.source) {
            "_exists_" => self.parse_field_presence(ident, colon, true),
            "_missing_" => self.parse_field_presence(ident, colon, false),
            _ => {
                let field = self.text_of(ident);
                self.parse_field_value(field, ident, colon)
            }
        }
    }

    fn parse_field_presence(&mut self, ident: Token, colon: Token, exists: bool) -> QueryNode {
        let field = if matches!(self.kind(), TokenKind::Ident | TokenKind::Number) {
            let value = self.bump();
            self.text_of(value)
        } else {
            self.error("expected field name after ':'", colon.start, colon.len);
            Text::empty()
        };
        if exists {
            QueryNode::Exists(ExistsNode::new(field).with_offset(ident.start))
        } else {
            QueryNode::Missing(MissingNode::new(field).with_offset(ident.start))
        }
    }

    fn parse_field_value(&mut self, field: Text, ident: Token, colon: Token) -> QueryNode {
        match self.kind() {
            TokenKind::LeftBracket | TokenKind::LeftBrace => {
                self.parse_range(Some(field), Some(ident.start))
            }
            TokenKind::Gt | TokenKind::Ge | TokenKind::Lt | TokenKind::Le => {
                self.parse_short_range(Some(field), Some(ident.start))
            }
            TokenKind::LeftParen => {
                if let Some(multi) = self.try_parse_multi_term() {
                    QueryNode::Field(
                        FieldQueryNode::new(field, multi.into()).with_offset(ident.start),
                    )
                } else {
                    let group = self.parse_group();
                    QueryNode::Field(FieldQueryNode::new(field, group).with_offset(ident.start))
                }
            }
            TokenKind::Phrase => {
                let phrase = self.parse_phrase_atom();
                QueryNode::Field(FieldQueryNode::new(field, phrase).with_offset(ident.start))
            }
            TokenKind::Regex => {
                let regex = self.parse_regex_atom();
                QueryNode::Field(FieldQueryNode::new(field, regex).with_offset(ident.start))
            }
            TokenKind::Ident | TokenKind::Number => {
                let tok = self.bump();
                let term = self.term_from(tok);
                QueryNode::Field(FieldQueryNode::new(field, term.into()).with_offset(ident.start))
            }
            TokenKind::Star | TokenKind::Question => {
                let tok = self.bump();
                let term = TermNode::new(self.text_of(tok)).with_offset(tok.start);
                QueryNode::Field(FieldQueryNode::new(field, term.into()).with_offset(ident.start))
            }
            _ => {
                // Missing value: keep the field with a synthetic empty term.
                self.error("expected value after ':'", colon.start, colon.len);
                let term = TermNode::new(Text::empty()).with_offset(colon.end());
                QueryNode::Field(FieldQueryNode::new(field, term.into()).with_offset(ident.start))
            }
        }
    }

    /// Attempt `field:(t1 t2 t3)`. Returns `None` (with the position
    /// restored) when the parentheses hold anything but plain terms.
    fn try_parse_multi_term(&mut self) -> Option<MultiTermNode> {
        let checkpoint = self.pos;
        let open = self.bump(); // '('
        let mut terms = Vec::new();

        loop {
            match self.kind() {
                TokenKind::Ident | TokenKind::Number => {
                    let tok = self.bump();
                    terms.push(self.term_from(tok));
                }
                TokenKind::RightParen if !terms.is_empty() => {
                    self.bump();
                    return Some(MultiTermNode::new(terms).with_offset(open.start));
                }
                _ => {
                    self.pos = checkpoint;
                    return None;
                }
            }
        }
    }

    fn parse_star_primary(&mut self) -> QueryNode {
        let star = self.bump();
        if self.kind() == TokenKind::Colon {
            if self.peek_nth(1).kind == TokenKind::Star {
                self.bump(); // ':'
                self.bump(); // '*'
                return QueryNode::MatchAll(MatchAllNode::new().with_offset(star.start));
            }
            let colon = self.bump();
            let field = self.text_of(star);
            return self.parse_field_value(field, star, colon);
        }
        QueryNode::Term(TermNode::new(self.text_of(star)).with_offset(star.start))
    }

    fn parse_group(&mut self) -> QueryNode {
        let open = self.bump(); // '('

        if self.kind() == TokenKind::RightParen {
            let close = self.bump();
            self.error("empty group", open.start, close.end() - open.start);
            let child = QueryNode::Term(TermNode::new(Text::empty()).with_offset(open.end()));
            return QueryNode::Group(GroupNode::new(child).with_offset(open.start));
        }

        let inner = self.parse_or_expr();

        if self.kind() != TokenKind::RightParen {
            // Consume up to the closer or the end of input so the skipped
            // region is covered by a single diagnostic.
            let first = self.peek();
            let mut last = first;
            while !matches!(self.kind(), TokenKind::RightParen | TokenKind::Eof) {
                last = self.bump();
            }
            if first.kind != TokenKind::Eof {
                self.error(
                    "unexpected tokens in group",
                    first.start,
                    last.end() - first.start,
                );
            }
        }

        if self.kind() == TokenKind::RightParen {
            self.bump();
        } else {
            self.error("unmatched '('", open.start, open.len);
        }

        QueryNode::Group(GroupNode::new(inner).with_offset(open.start))
    }

    fn parse_range(&mut self, field: Option<Text>, field_offset: Option<usize>) -> QueryNode {
        let open = self.bump();
        let min_inclusive = open.kind == TokenKind::LeftBracket;

        let min = self.parse_range_bound();

        if self.kind() == TokenKind::To {
            self.bump();
        } else {
            let unexpected = self.peek();
            self.error(
                "expected 'TO' in range",
                unexpected.start,
                unexpected.len,
            );
            while !matches!(
                self.kind(),
                TokenKind::To | TokenKind::RightBracket | TokenKind::RightBrace | TokenKind::Eof
            ) {
                self.bump();
            }
            if self.kind() == TokenKind::To {
                self.bump();
            }
        }

        let max = self.parse_range_bound();

        let max_inclusive = match self.kind() {
            TokenKind::RightBracket => {
                self.bump();
                true
            }
            TokenKind::RightBrace => {
                self.bump();
                false
            }
            _ => {
                self.error("unterminated range", open.start, open.len);
                min_inclusive
            }
        };

        let mut node = RangeNode::new(min, max, min_inclusive, max_inclusive);
        node.field = field;
        node.offset = Some(field_offset.unwrap_or(open.start));
        node.into()
    }

    fn parse_short_range(&mut self, field: Option<Text>, field_offset: Option<usize>) -> QueryNode {
        let op_token = self.bump();
        let operator = match op_token.kind {
            TokenKind::Gt => RangeOperator::Gt,
            TokenKind::Ge => RangeOperator::Gte,
            TokenKind::Lt => RangeOperator::Lt,
            _ => RangeOperator::Lte,
        };

        let value = match self.parse_range_bound() {
            Some(value) => value,
            None => {
                self.error(
                    "expected value after range operator",
                    op_token.start,
                    op_token.len,
                );
                Text::empty()
            }
        };

        let mut node = RangeNode::short_form(operator, value);
        node.field = field;
        node.offset = Some(field_offset.unwrap_or(op_token.start));
        node.into()
    }

    /// Parse a single range bound. Adjacent tokens (no intervening
    /// whitespace) are glued into one value so ISO datetimes with embedded
    /// `:` and `+` survive as a single bound.
    fn parse_range_bound(&mut self) -> Option<Text> {
        fn in_glue_set(kind: TokenKind) -> bool {
            matches!(
                kind,
                TokenKind::Ident
                    | TokenKind::Number
                    | TokenKind::Colon
                    | TokenKind::Plus
                    | TokenKind::Minus
                    | TokenKind::PipePipe
                    | TokenKind::Star
                    | TokenKind::Question
            )
        }

        match self.kind() {
            TokenKind::Star => {
                self.bump();
                None
            }
            TokenKind::Phrase => {
                let tok = self.bump();
                Some(self.phrase_content(tok))
            }
            TokenKind::Minus | TokenKind::Ident | TokenKind::Number | TokenKind::Colon
            | TokenKind::Plus | TokenKind::Question => {
                let first = self.bump();
                let mut last = first;
                while in_glue_set(self.kind()) && self.peek().start == last.end() {
                    last = self.bump();
                }
                Some(Text::slice(
                    self.source.clone(),
                    first.start,
                    last.end() - first.start,
                ))
            }
            _ => None,
        }
    }

    fn parse_phrase_atom(&mut self) -> QueryNode {
        let tok = self.bump();
        let phrase = self.phrase_content(tok);
        let mut node = PhraseNode::new(phrase);
        node.offset = Some(tok.start);
        node.into()
    }

    /// Extract and unescape the content between the quotes of a phrase
    /// token. An unterminated phrase covers the rest of the input.
    fn phrase_content(&self, tok: Token) -> Text {
        let text = tok.text(&self.source);
        let terminated = text.len() >= 2 && text.ends_with('"');
        let inner_start = tok.start + 1;
        let inner_len = if terminated {
            tok.len - 2
        } else {
            tok.len - 1
        };
        let raw = &self.source[inner_start..inner_start + inner_len];
        if raw.contains('\\') {
            Text::owned(unescape_phrase(raw))
        } else {
            Text::slice(self.source.clone(), inner_start, inner_len)
        }
    }

    fn parse_regex_atom(&mut self) -> QueryNode {
        let tok = self.bump();
        let text = tok.text(&self.source);
        let terminated = text.len() >= 2 && text.ends_with('/');
        let inner_start = tok.start + 1;
        let inner_len = if terminated {
            tok.len - 2
        } else {
            tok.len - 1
        };
        let pattern = Text::slice(self.source.clone(), inner_start, inner_len);
        QueryNode::Regex(RegexNode::new(pattern).with_offset(tok.start))
    }

    /// Build a term from an identifier token, folding an adjacent `||`
    /// date-math continuation into the term text.
    fn term_from(&mut self, tok: Token) -> TermNode {
        let mut end = tok.end();
        if self.kind() == TokenKind::PipePipe && self.peek().start == end {
            let pipe = self.bump();
            end = pipe.end();
            if self.kind() == TokenKind::Ident && self.peek().start == end {
                let tail = self.bump();
                end = tail.end();
            }
        }
        TermNode::new(Text::slice(self.source.clone(), tok.start, end - tok.start))
            .with_offset(tok.start)
    }

    // ----- modifier placement ---------------------------------------------

    fn apply_prefix(&mut self, node: QueryNode, prefix: Prefix, op: Token) -> QueryNode {
        match node {
            QueryNode::Term(mut n) => {
                n.prefix = Some(prefix);
                n.offset = Some(op.start);
                QueryNode::Term(n)
            }
            QueryNode::Phrase(mut n) => {
                n.prefix = Some(prefix);
                n.offset = Some(op.start);
                QueryNode::Phrase(n)
            }
            QueryNode::Group(mut n) => {
                n.prefix = Some(prefix);
                n.offset = Some(op.start);
                QueryNode::Group(n)
            }
            QueryNode::Field(mut n) => {
                n.prefix = Some(prefix);
                n.offset = Some(op.start);
                QueryNode::Field(n)
            }
            // No prefix slot on this variant: lift it into a group.
            other => {
                let mut group = GroupNode::new(other);
                group.prefix = Some(prefix);
                group.offset = Some(op.start);
                QueryNode::Group(group)
            }
        }
    }

    fn apply_boost(&mut self, node: QueryNode, boost: f32) -> QueryNode {
        match node {
            QueryNode::Term(mut n) => {
                n.boost = Some(boost);
                QueryNode::Term(n)
            }
            QueryNode::Phrase(mut n) => {
                n.boost = Some(boost);
                QueryNode::Phrase(n)
            }
            QueryNode::Group(mut n) => {
                n.boost = Some(boost);
                QueryNode::Group(n)
            }
            QueryNode::Field(mut n) => {
                n.boost = Some(boost);
                QueryNode::Field(n)
            }
            other => {
                let offset = other.offset();
                let mut group = GroupNode::new(other);
                group.boost = Some(boost);
                group.offset = offset;
                QueryNode::Group(group)
            }
        }
    }

    fn apply_fuzzy(&mut self, node: QueryNode, value: Option<u32>, tilde: Token) -> QueryNode {
        match node {
            QueryNode::Term(mut n) => {
                n.fuzzy = Some(value.unwrap_or(DEFAULT_FUZZINESS));
                QueryNode::Term(n)
            }
            QueryNode::Phrase(mut n) => {
                n.proximity = Some(value.unwrap_or(0));
                QueryNode::Phrase(n)
            }
            QueryNode::Field(mut n) => {
                n.query = Box::new(self.apply_fuzzy(*n.query, value, tilde));
                QueryNode::Field(n)
            }
            other => {
                self.error(
                    "fuzzy modifier is only valid on terms and phrases",
                    tilde.start,
                    tilde.len,
                );
                other
            }
        }
    }
}

/// Resolve phrase escapes: only `\"` and `\\` collapse; any other
/// backslash stays literal.
fn unescape_phrase(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some('"') | Some('\\') => out.push(chars.next().unwrap()),
                _ => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> QueryNode {
        let result = parse(input);
        assert!(
            result.is_success,
            "parse of {input:?} failed: {:?}",
            result.errors
        );
        result.document.query.expect("non-empty document")
    }

    #[test]
    fn test_empty_input() {
        let result = parse("");
        assert!(result.is_success);
        assert!(result.document.is_empty());

        let result = parse("   ");
        assert!(result.is_success);
        assert!(result.document.is_empty());
    }

    #[test]
    fn test_simple_term() {
        match parse_ok("hello") {
            QueryNode::Term(term) => {
                assert_eq!(term.term, "hello");
                assert_eq!(term.offset, Some(0));
            }
            other => panic!("expected term, got {other:?}"),
        }
    }

    #[test]
    fn test_field_term() {
        match parse_ok("title:rust") {
            QueryNode::Field(field) => {
                assert_eq!(field.field, "title");
                match field.query.as_ref() {
                    QueryNode::Term(term) => assert_eq!(term.term, "rust"),
                    other => panic!("expected term child, got {other:?}"),
                }
            }
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_phrase() {
        match parse_ok("\"hello world\"") {
            QueryNode::Phrase(phrase) => {
                assert_eq!(phrase.phrase, "hello world");
                assert_eq!(phrase.proximity, None);
            }
            other => panic!("expected phrase, got {other:?}"),
        }
    }

    #[test]
    fn test_phrase_with_escapes() {
        match parse_ok(r#""say \"hi\" now""#) {
            QueryNode::Phrase(phrase) => assert_eq!(phrase.phrase, r#"say "hi" now"#),
            other => panic!("expected phrase, got {other:?}"),
        }
    }

    #[test]
    fn test_phrase_proximity() {
        match parse_ok("\"hello world\"~3") {
            QueryNode::Phrase(phrase) => assert_eq!(phrase.proximity, Some(3)),
            other => panic!("expected phrase, got {other:?}"),
        }
    }

    #[test]
    fn test_boolean_precedence() {
        // AND binds tighter: a AND b OR c == (a AND b) OR c
        match parse_ok("a AND b OR c") {
            QueryNode::Boolean(or) => {
                assert_eq!(or.op, BooleanOperator::Or);
                match or.left.as_ref() {
                    QueryNode::Boolean(and) => assert_eq!(and.op, BooleanOperator::And),
                    other => panic!("expected AND on the left, got {other:?}"),
                }
            }
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn test_implicit_and() {
        match parse_ok("rust parser") {
            QueryNode::Boolean(node) => assert_eq!(node.op, BooleanOperator::And),
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn test_implicit_and_with_prefix() {
        // +foo bar binds as (+foo) AND bar
        match parse_ok("+foo bar") {
            QueryNode::Boolean(node) => {
                assert_eq!(node.op, BooleanOperator::And);
                match node.left.as_ref() {
                    QueryNode::Term(term) => assert_eq!(term.prefix, Some(Prefix::Required)),
                    other => panic!("expected prefixed term, got {other:?}"),
                }
                match node.right.as_ref() {
                    QueryNode::Term(term) => assert_eq!(term.prefix, None),
                    other => panic!("expected bare term, got {other:?}"),
                }
            }
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn test_not() {
        match parse_ok("NOT deleted") {
            QueryNode::Not(node) => match node.child.as_ref() {
                QueryNode::Term(term) => assert_eq!(term.term, "deleted"),
                other => panic!("expected term child, got {other:?}"),
            },
            other => panic!("expected not, got {other:?}"),
        }
        // '!' is a NOT synonym.
        assert_eq!(parse_ok("!deleted"), parse_ok("NOT deleted"));
    }

    #[test]
    fn test_lowercase_keywords_are_terms() {
        match parse_ok("a and b") {
            QueryNode::Boolean(outer) => {
                // Three implicit-AND terms, left associative.
                assert_eq!(outer.op, BooleanOperator::And);
                match outer.left.as_ref() {
                    QueryNode::Boolean(inner) => {
                        assert_eq!(inner.op, BooleanOperator::And);
                        match inner.right.as_ref() {
                            QueryNode::Term(term) => assert_eq!(term.term, "and"),
                            other => panic!("expected 'and' term, got {other:?}"),
                        }
                    }
                    other => panic!("expected nested boolean, got {other:?}"),
                }
            }
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn test_group() {
        match parse_ok("(a OR b) AND c") {
            QueryNode::Boolean(and) => {
                assert_eq!(and.op, BooleanOperator::And);
                match and.left.as_ref() {
                    QueryNode::Group(group) => match group.child.as_ref() {
                        QueryNode::Boolean(or) => assert_eq!(or.op, BooleanOperator::Or),
                        other => panic!("expected OR inside group, got {other:?}"),
                    },
                    other => panic!("expected group, got {other:?}"),
                }
            }
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn test_field_group() {
        match parse_ok("status:(active OR pending)") {
            QueryNode::Field(field) => {
                assert_eq!(field.field, "status");
                assert!(matches!(field.query.as_ref(), QueryNode::Group(_)));
            }
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_multi_term() {
        match parse_ok("tags:(rust parser lexer)") {
            QueryNode::Field(field) => match field.query.as_ref() {
                QueryNode::MultiTerm(multi) => {
                    let terms: Vec<&str> =
                        multi.terms.iter().map(|t| t.term.as_str()).collect();
                    assert_eq!(terms, vec!["rust", "parser", "lexer"]);
                }
                other => panic!("expected multi-term, got {other:?}"),
            },
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_range_inclusive() {
        match parse_ok("price:[100 TO 500]") {
            QueryNode::Range(range) => {
                assert_eq!(range.field.as_ref().unwrap().as_str(), "price");
                assert_eq!(range.min.as_ref().unwrap().as_str(), "100");
                assert_eq!(range.max.as_ref().unwrap().as_str(), "500");
                assert!(range.min_inclusive);
                assert!(range.max_inclusive);
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_range_mixed_brackets() {
        match parse_ok("price:[100 TO 500}") {
            QueryNode::Range(range) => {
                assert!(range.min_inclusive);
                assert!(!range.max_inclusive);
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_range_unbounded() {
        match parse_ok("price:[* TO 500]") {
            QueryNode::Range(range) => {
                assert!(range.min.is_none());
                assert_eq!(range.max.as_ref().unwrap().as_str(), "500");
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_range_glues_datetime_bounds() {
        match parse_ok("created:[2024-06-08T00:00:00.000+00:00 TO now]") {
            QueryNode::Range(range) => {
                assert_eq!(
                    range.min.as_ref().unwrap().as_str(),
                    "2024-06-08T00:00:00.000+00:00"
                );
                assert_eq!(range.max.as_ref().unwrap().as_str(), "now");
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_range_negative_number() {
        match parse_ok("delta:[-5 TO 5]") {
            QueryNode::Range(range) => {
                assert_eq!(range.min.as_ref().unwrap().as_str(), "-5");
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_short_range() {
        match parse_ok("price:>=100") {
            QueryNode::Range(range) => {
                assert_eq!(range.operator, Some(RangeOperator::Gte));
                assert_eq!(range.min.as_ref().unwrap().as_str(), "100");
                assert!(range.min_inclusive);
                assert!(range.max.is_none());
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_range() {
        match parse_ok("[1 TO 5]") {
            QueryNode::Range(range) => assert!(range.field.is_none()),
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_exists_and_missing() {
        match parse_ok("_exists_:title") {
            QueryNode::Exists(node) => assert_eq!(node.field, "title"),
            other => panic!("expected exists, got {other:?}"),
        }
        match parse_ok("_missing_:title") {
            QueryNode::Missing(node) => assert_eq!(node.field, "title"),
            other => panic!("expected missing, got {other:?}"),
        }
    }

    #[test]
    fn test_match_all() {
        assert!(matches!(parse_ok("*:*"), QueryNode::MatchAll(_)));
    }

    #[test]
    fn test_include_is_plain_field_query() {
        match parse_ok("@include:recent") {
            QueryNode::Field(field) => {
                assert_eq!(field.field, "@include");
                match field.query.as_ref() {
                    QueryNode::Term(term) => assert_eq!(term.term, "recent"),
                    other => panic!("expected term child, got {other:?}"),
                }
            }
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_regex() {
        match parse_ok("/colou?r/") {
            QueryNode::Regex(node) => assert_eq!(node.pattern, "colou?r"),
            other => panic!("expected regex, got {other:?}"),
        }
    }

    #[test]
    fn test_field_regex() {
        match parse_ok("name:/jo[nh]n/") {
            QueryNode::Field(field) => match field.query.as_ref() {
                QueryNode::Regex(node) => assert_eq!(node.pattern, "jo[nh]n"),
                other => panic!("expected regex child, got {other:?}"),
            },
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_boost_and_fuzzy() {
        match parse_ok("title:rust^2.5") {
            QueryNode::Field(field) => assert_eq!(field.boost, Some(2.5)),
            other => panic!("expected field query, got {other:?}"),
        }
        match parse_ok("roam~1") {
            QueryNode::Term(term) => assert_eq!(term.fuzzy, Some(1)),
            other => panic!("expected term, got {other:?}"),
        }
        // A bare tilde uses the default edit distance.
        match parse_ok("roam~") {
            QueryNode::Term(term) => assert_eq!(term.fuzzy, Some(DEFAULT_FUZZINESS)),
            other => panic!("expected term, got {other:?}"),
        }
    }

    #[test]
    fn test_fuzzy_on_field_value_lands_on_child() {
        match parse_ok("title:\"hello world\"~2") {
            QueryNode::Field(field) => match field.query.as_ref() {
                QueryNode::Phrase(phrase) => assert_eq!(phrase.proximity, Some(2)),
                other => panic!("expected phrase child, got {other:?}"),
            },
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_date_math_term_folds_pipes() {
        match parse_ok("2024-01-01||+1M/d") {
            QueryNode::Term(term) => assert_eq!(term.term, "2024-01-01||+1M/d"),
            other => panic!("expected term, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_terms() {
        match parse_ok("title:*hello") {
            QueryNode::Field(field) => match field.query.as_ref() {
                QueryNode::Term(term) => {
                    assert_eq!(term.term, "*hello");
                    assert!(term.has_leading_wildcard());
                }
                other => panic!("expected term child, got {other:?}"),
            },
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_escaped_term_unescapes_lazily() {
        match parse_ok(r"foo\:bar") {
            QueryNode::Term(term) => {
                assert_eq!(term.term, r"foo\:bar");
                assert_eq!(term.unescaped_term(), "foo:bar");
            }
            other => panic!("expected term, got {other:?}"),
        }
    }

    // ----- error recovery -------------------------------------------------

    #[test]
    fn test_missing_value_after_colon() {
        let result = parse("title:");
        assert!(!result.is_success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "expected value after ':'");

        match result.document.query.unwrap() {
            QueryNode::Field(field) => {
                assert_eq!(field.field, "title");
                match field.query.as_ref() {
                    QueryNode::Term(term) => assert!(term.term.is_empty()),
                    other => panic!("expected synthetic term, got {other:?}"),
                }
            }
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_and() {
        let result = parse("a AND");
        assert!(!result.is_success);
        assert!(result.errors[0].message.contains("dangling 'AND'"));
        match result.document.query.unwrap() {
            QueryNode::Term(term) => assert_eq!(term.term, "a"),
            other => panic!("expected the left side to survive, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_or() {
        let result = parse("a OR");
        assert!(!result.is_success);
        assert!(result.errors[0].message.contains("dangling 'OR'"));
    }

    #[test]
    fn test_unmatched_paren() {
        let result = parse("(a AND b");
        assert!(!result.is_success);
        assert!(result.errors.iter().any(|e| e.message.contains("unmatched '('")));
        // The partial AST is still a group over the boolean.
        assert!(matches!(result.document.query, Some(QueryNode::Group(_))));
    }

    #[test]
    fn test_stray_close_paren() {
        let result = parse("a ) b");
        assert!(!result.is_success);
        // Both terms survive, joined by an implicit AND.
        match result.document.query.unwrap() {
            QueryNode::Boolean(node) => assert_eq!(node.op, BooleanOperator::And),
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_token_between_primaries() {
        let result = parse("a = b");
        assert!(!result.is_success);
        assert_eq!(result.errors.len(), 1);
        match result.document.query.unwrap() {
            QueryNode::Boolean(node) => assert_eq!(node.op, BooleanOperator::And),
            other => panic!("expected implicit AND, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_range() {
        let result = parse("price:[100 500]");
        assert!(!result.is_success);
        assert!(result.errors.iter().any(|e| e.message.contains("TO")));
        assert!(matches!(result.document.query, Some(QueryNode::Range(_))));
    }

    #[test]
    fn test_unterminated_range() {
        let result = parse("price:[100 TO");
        assert!(!result.is_success);
        match result.document.query.unwrap() {
            QueryNode::Range(range) => {
                assert_eq!(range.min.as_ref().unwrap().as_str(), "100");
                assert!(range.max.is_none());
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_at_most_one_error_per_input_byte() {
        let input = "a ) ] } = ~ ^";
        let result = parse(input);
        assert!(!result.is_success);
        assert!(result.errors.len() <= input.len());
    }

    #[test]
    fn test_offsets_are_monotone_in_dfs_order() {
        fn collect_offsets(node: &QueryNode, out: &mut Vec<usize>) {
            if let Some(offset) = node.offset() {
                out.push(offset);
            }
            match node {
                QueryNode::Group(n) => collect_offsets(&n.child, out),
                QueryNode::Boolean(n) => {
                    collect_offsets(&n.left, out);
                    collect_offsets(&n.right, out);
                }
                QueryNode::Not(n) => collect_offsets(&n.child, out),
                QueryNode::Field(n) => collect_offsets(&n.query, out),
                _ => {}
            }
        }

        let node =
            parse_ok("title:\"a b\" AND (status:active OR status:pending) AND NOT deleted:true");
        let mut offsets = Vec::new();
        collect_offsets(&node, &mut offsets);
        for pair in offsets.windows(2) {
            assert!(pair[0] <= pair[1], "offsets not monotone: {offsets:?}");
        }
    }

    #[test]
    fn test_complex_query() {
        let result = parse(
            "title:\"hello world\" AND (status:active OR status:pending) \
             AND price:[100 TO 500] AND NOT deleted:true",
        );
        assert!(result.is_success, "{:?}", result.errors);
    }
}
