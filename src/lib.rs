//! # Lancea
//!
//! A Lucene-style query string parser for Rust, with a typed AST and an
//! extensible visitor framework.
//!
//! ## Features
//!
//! - Single-pass lexer over the full Lucene query syntax
//! - Error-recovering parser: malformed input yields a partial AST plus
//!   diagnostics, never a panic
//! - Closed AST with zero-copy text attributes
//! - Async visitor framework for traversal and transformation
//! - Built-in visitors: field resolution, include expansion, date math,
//!   validation, and query-string rendering
//!
//! ## Example
//!
//! ```
//! use lancea::parse;
//! use lancea::visitor::QueryStringVisitor;
//!
//! let result = parse("title:\"hello world\" AND price:[100 TO 500]");
//! assert!(result.is_success);
//!
//! let rendered = QueryStringVisitor::build(&result.document);
//! assert_eq!(rendered, "title:\"hello world\" AND price:[100 TO 500]");
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod text;
pub mod token;
pub mod visitor;

pub use crate::error::{LanceaError, ParseError, Result};
pub use crate::parser::{parse, ParseResult};

pub mod prelude {
    //! Commonly used types, importable in one line.

    pub use crate::ast::{
        BooleanOperator, BooleanQueryNode, ExistsNode, FieldQueryNode, GroupNode, MatchAllNode,
        MissingNode, MultiTermNode, NotNode, PhraseNode, Prefix, QueryDocument, QueryNode,
        RangeNode, RangeOperator, TermNode,
    };
    pub use crate::error::{LanceaError, ParseError, Result};
    pub use crate::parser::{parse, ParseResult};
    pub use crate::text::Text;
    pub use crate::visitor::{
        ChainedVisitor, DateMathEvaluator, DateMathVisitor, FieldMap, FieldNameResolver,
        FieldResolverVisitor, IncludeResolver, IncludeVisitor, QueryNodeVisitor,
        QueryStringVisitor, ValidationOptions, ValidationResult, ValidationVisitor,
        VisitorContext,
    };
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
