//! The typed abstract syntax tree produced by the parser.

pub mod node;

pub use self::node::{
    BooleanOperator, BooleanQueryNode, ExistsNode, FieldQueryNode, GroupNode, MatchAllNode,
    MissingNode, MultiTermNode, NotNode, PhraseNode, Prefix, QueryDocument, QueryNode,
    RangeNode, RangeOperator, RegexNode, TermNode,
};
