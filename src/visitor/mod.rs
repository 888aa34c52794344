//! Visitor framework for traversing and transforming the query AST.
//!
//! A visitor is a bundle of per-variant handlers over the closed set of
//! [`QueryNode`] variants. The default handler for each variant walks the
//! node's children and returns the (possibly rewritten) node; concrete
//! visitors override the handlers they care about and either mutate in
//! place, return a replacement node, or run the default walk first and then
//! post-process.
//!
//! Handlers are `async` because the resolver callbacks at the edges (field
//! resolution, include resolution) may perform I/O. The traversal itself
//! never suspends between callbacks.

pub mod builder;
pub mod chained;
pub mod context;
pub mod date_math;
pub mod field_resolver;
pub mod include;
pub mod validation;

use std::any::Any;

use async_trait::async_trait;

use crate::ast::{
    BooleanQueryNode, ExistsNode, FieldQueryNode, GroupNode, MatchAllNode, MissingNode,
    MultiTermNode, NotNode, PhraseNode, QueryDocument, QueryNode, RangeNode, RegexNode, TermNode,
};
use crate::error::{LanceaError, Result};

pub use self::builder::QueryStringVisitor;
pub use self::chained::ChainedVisitor;
pub use self::context::VisitorContext;
pub use self::date_math::{DateMathEvaluator, DateMathVisitor, Rounding};
pub use self::field_resolver::{FieldMap, FieldNameResolver, FieldRename, FieldResolverVisitor};
pub use self::include::{IncludeResolver, IncludeSkipPredicate, IncludeVisitor};
pub use self::validation::{ValidationOptions, ValidationResult, ValidationVisitor};

/// A polymorphic handler bundle over the AST variants.
///
/// Dispatch is single: [`visit_node`](Self::visit_node) matches on the
/// runtime variant and calls the matching handler. A handler may return a
/// node of a different variant; the traversal of the parent accepts the
/// substitution and links it into the parent's child slot.
#[async_trait]
pub trait QueryNodeVisitor: Send + Sync {
    /// This visitor as `Any`, so compositions can locate it by type.
    fn as_any(&self) -> &dyn Any;

    /// Visit the document root.
    async fn visit_document(
        &mut self,
        document: &mut QueryDocument,
        context: &mut VisitorContext,
    ) -> Result<()> {
        if let Some(query) = document.query.take() {
            document.query = Some(self.visit_node(query, context).await?);
        }
        Ok(())
    }

    /// Dispatch on the runtime variant.
    async fn visit_node(
        &mut self,
        node: QueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        context.check_cancelled()?;
        match node {
            QueryNode::Group(n) => self.visit_group(n, context).await,
            QueryNode::Boolean(n) => self.visit_boolean(n, context).await,
            QueryNode::Not(n) => self.visit_not(n, context).await,
            QueryNode::Field(n) => self.visit_field(n, context).await,
            QueryNode::Term(n) => self.visit_term(n, context).await,
            QueryNode::Phrase(n) => self.visit_phrase(n, context).await,
            QueryNode::Regex(n) => self.visit_regex(n, context).await,
            QueryNode::Range(n) => self.visit_range(n, context).await,
            QueryNode::MultiTerm(n) => self.visit_multi_term(n, context).await,
            QueryNode::Exists(n) => self.visit_exists(n, context).await,
            QueryNode::Missing(n) => self.visit_missing(n, context).await,
            QueryNode::MatchAll(n) => self.visit_match_all(n, context).await,
        }
    }

    /// Visit a group node.
    async fn visit_group(
        &mut self,
        node: GroupNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        walk_group(self, node, context).await
    }

    /// Visit a boolean node.
    async fn visit_boolean(
        &mut self,
        node: BooleanQueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        walk_boolean(self, node, context).await
    }

    /// Visit a not node.
    async fn visit_not(
        &mut self,
        node: NotNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        walk_not(self, node, context).await
    }

    /// Visit a field query node.
    async fn visit_field(
        &mut self,
        node: FieldQueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        walk_field(self, node, context).await
    }

    /// Visit a term node.
    async fn visit_term(
        &mut self,
        node: TermNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }

    /// Visit a phrase node.
    async fn visit_phrase(
        &mut self,
        node: PhraseNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }

    /// Visit a regex node.
    async fn visit_regex(
        &mut self,
        node: RegexNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }

    /// Visit a range node.
    async fn visit_range(
        &mut self,
        node: RangeNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }

    /// Visit a multi-term node.
    async fn visit_multi_term(
        &mut self,
        node: MultiTermNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        walk_multi_term(self, node, context).await
    }

    /// Visit an exists node.
    async fn visit_exists(
        &mut self,
        node: ExistsNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }

    /// Visit a missing node.
    async fn visit_missing(
        &mut self,
        node: MissingNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }

    /// Visit a match-all node.
    async fn visit_match_all(
        &mut self,
        node: MatchAllNode,
        _context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        Ok(node.into())
    }
}

/// Default traversal of a group: visit the child, relink, return the group.
pub async fn walk_group<V>(
    visitor: &mut V,
    mut node: GroupNode,
    context: &mut VisitorContext,
) -> Result<QueryNode>
where
    V: QueryNodeVisitor + ?Sized,
{
    let child = visitor.visit_node(*node.child, context).await?;
    node.child = Box::new(child);
    Ok(QueryNode::Group(node))
}

/// Default traversal of a boolean: left side first, then right.
pub async fn walk_boolean<V>(
    visitor: &mut V,
    mut node: BooleanQueryNode,
    context: &mut VisitorContext,
) -> Result<QueryNode>
where
    V: QueryNodeVisitor + ?Sized,
{
    let left = visitor.visit_node(*node.left, context).await?;
    node.left = Box::new(left);
    let right = visitor.visit_node(*node.right, context).await?;
    node.right = Box::new(right);
    Ok(QueryNode::Boolean(node))
}

/// Default traversal of a not node.
pub async fn walk_not<V>(
    visitor: &mut V,
    mut node: NotNode,
    context: &mut VisitorContext,
) -> Result<QueryNode>
where
    V: QueryNodeVisitor + ?Sized,
{
    let child = visitor.visit_node(*node.child, context).await?;
    node.child = Box::new(child);
    Ok(QueryNode::Not(node))
}

/// Default traversal of a field query: visit the qualified subquery.
pub async fn walk_field<V>(
    visitor: &mut V,
    mut node: FieldQueryNode,
    context: &mut VisitorContext,
) -> Result<QueryNode>
where
    V: QueryNodeVisitor + ?Sized,
{
    let query = visitor.visit_node(*node.query, context).await?;
    node.query = Box::new(query);
    Ok(QueryNode::Field(node))
}

/// Default traversal of a multi-term: visit each term in order.
///
/// A multi-term body can only hold terms; a handler that substitutes a
/// different variant here is a programming error.
pub async fn walk_multi_term<V>(
    visitor: &mut V,
    mut node: MultiTermNode,
    context: &mut VisitorContext,
) -> Result<QueryNode>
where
    V: QueryNodeVisitor + ?Sized,
{
    let mut terms = Vec::with_capacity(node.terms.len());
    for term in node.terms {
        match visitor.visit_term(term, context).await? {
            QueryNode::Term(term) => terms.push(term),
            other => {
                return Err(LanceaError::visitor(format!(
                    "multi-term child cannot be replaced with a {} node",
                    other.variant_name()
                )));
            }
        }
    }
    node.terms = terms;
    Ok(QueryNode::MultiTerm(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::text::Text;

    /// Rewrites every term to lowercase, in place.
    struct LowercaseVisitor;

    #[async_trait]
    impl QueryNodeVisitor for LowercaseVisitor {
        fn as_any(&self) -> &dyn Any {
            self
        }

        async fn visit_term(
            &mut self,
            mut node: TermNode,
            _context: &mut VisitorContext,
        ) -> Result<QueryNode> {
            let lowered = node.unescaped_term().to_lowercase();
            node.set_unescaped(lowered);
            Ok(node.into())
        }
    }

    /// Replaces every term with a phrase, exercising variant substitution.
    struct TermToPhraseVisitor;

    #[async_trait]
    impl QueryNodeVisitor for TermToPhraseVisitor {
        fn as_any(&self) -> &dyn Any {
            self
        }

        async fn visit_term(
            &mut self,
            node: TermNode,
            _context: &mut VisitorContext,
        ) -> Result<QueryNode> {
            let phrase = PhraseNode::new(Text::owned(node.unescaped_term().into_owned()));
            Ok(phrase.into())
        }
    }

    #[tokio::test]
    async fn test_mutating_visitor_reaches_nested_terms() {
        let mut document = parse("title:RUST AND (Parser OR LEXER)").document;
        let mut context = VisitorContext::new();
        LowercaseVisitor
            .visit_document(&mut document, &mut context)
            .await
            .unwrap();

        let rendered = builder::QueryStringVisitor::build(&document);
        assert_eq!(rendered, "title:rust AND (parser OR lexer)");
    }

    #[tokio::test]
    async fn test_variant_substitution_is_relinked() {
        let mut document = parse("title:rust").document;
        let mut context = VisitorContext::new();
        TermToPhraseVisitor
            .visit_document(&mut document, &mut context)
            .await
            .unwrap();

        match document.query.unwrap() {
            QueryNode::Field(field) => {
                assert!(matches!(field.query.as_ref(), QueryNode::Phrase(_)));
            }
            other => panic!("expected field query, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_traversal() {
        let mut document = parse("a AND b").document;
        let mut context = VisitorContext::new();
        context.cancel();

        let result = LowercaseVisitor
            .visit_document(&mut document, &mut context)
            .await;
        assert!(matches!(
            result,
            Err(LanceaError::OperationCancelled(_))
        ));
    }
}
