//! Expansion of `@include:name` references into saved query fragments.

use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;

use crate::ast::{FieldQueryNode, GroupNode, QueryNode};
use crate::error::Result;
use crate::parser::parse;
use crate::visitor::context::VisitorContext;
use crate::visitor::{walk_field, QueryNodeVisitor};

/// The field name that marks an include reference.
pub const DEFAULT_INCLUDE_FIELD: &str = "@include";

/// Hard cap on nested include expansion.
pub const MAX_INCLUDE_DEPTH: usize = 50;

/// Supplies the saved query text for an include name.
#[async_trait]
pub trait IncludeResolver: Send + Sync {
    /// Resolve an include name to query text. `Ok(None)` means unknown.
    async fn resolve_include(&self, name: &str) -> Result<Option<String>>;
}

#[async_trait]
impl IncludeResolver for AHashMap<String, String> {
    async fn resolve_include(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name).cloned())
    }
}

/// Decides whether an include reference should be left unexpanded.
#[async_trait]
pub trait IncludeSkipPredicate: Send + Sync {
    /// Return true to leave the reference in place.
    async fn should_skip(&self, name: &str, context: &VisitorContext) -> Result<bool>;
}

/// A visitor that inlines `@include:name` references, supporting nested
/// includes with cycle detection and a depth cap.
///
/// The expanded subtree is wrapped in a group so operator precedence at the
/// reference site is preserved. Cycles, depth overruns, unknown names, and
/// resolver failures leave the reference unexpanded and record a message on
/// the validation result.
pub struct IncludeVisitor {
    resolver: Option<Arc<dyn IncludeResolver>>,
    skip_predicate: Option<Arc<dyn IncludeSkipPredicate>>,
    include_field: String,
}

impl Default for IncludeVisitor {
    fn default() -> Self {
        IncludeVisitor::new()
    }
}

impl IncludeVisitor {
    /// Create a visitor that only consults the context resolver.
    pub fn new() -> Self {
        IncludeVisitor {
            resolver: None,
            skip_predicate: None,
            include_field: DEFAULT_INCLUDE_FIELD.to_string(),
        }
    }

    /// Create a visitor with a captured resolver.
    pub fn with_resolver(resolver: Arc<dyn IncludeResolver>) -> Self {
        IncludeVisitor {
            resolver: Some(resolver),
            ..IncludeVisitor::new()
        }
    }

    /// Set a captured skip predicate. A predicate on the context wins.
    pub fn with_skip_predicate(mut self, predicate: Arc<dyn IncludeSkipPredicate>) -> Self {
        self.skip_predicate = Some(predicate);
        self
    }

    /// Use a different marker field than `@include`.
    pub fn with_include_field<S: Into<String>>(mut self, field: S) -> Self {
        self.include_field = field.into();
        self
    }

    async fn expand(
        &mut self,
        node: FieldQueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let name = match node.query.as_ref() {
            QueryNode::Term(term) => term.unescaped_term().into_owned(),
            QueryNode::Phrase(phrase) => phrase.phrase.as_str().to_string(),
            _ => {
                context
                    .validation_result_mut()
                    .add_message("include reference must be a term or phrase");
                return Ok(node.into());
            }
        };

        context
            .validation_result_mut()
            .referenced_includes
            .insert(name.clone());

        let predicate = context
            .include_skip_predicate()
            .or_else(|| self.skip_predicate.clone());
        if let Some(predicate) = predicate {
            if predicate.should_skip(&name, context).await? {
                return Ok(node.into());
            }
        }

        if context.include_stack().iter().any(|entry| entry == &name) {
            context
                .validation_result_mut()
                .add_message(format!("circular include '{name}'"));
            return Ok(node.into());
        }

        if context.include_stack().len() >= MAX_INCLUDE_DEPTH {
            context
                .validation_result_mut()
                .add_message(format!("max include depth of {MAX_INCLUDE_DEPTH} exceeded"));
            return Ok(node.into());
        }

        let resolver = context.include_resolver().or_else(|| self.resolver.clone());
        let Some(resolver) = resolver else {
            context
                .validation_result_mut()
                .unresolved_includes
                .insert(name);
            return Ok(node.into());
        };

        let text = match resolver.resolve_include(&name).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                context
                    .validation_result_mut()
                    .unresolved_includes
                    .insert(name);
                return Ok(node.into());
            }
            Err(error) => {
                context
                    .validation_result_mut()
                    .add_message(format!("error resolving include '{name}': {error}"));
                return Ok(node.into());
            }
        };

        let parsed = parse(&text);
        if !parsed.is_success {
            let detail = parsed
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            context
                .validation_result_mut()
                .add_message(format!("invalid query in include '{name}': {detail}"));
            return Ok(node.into());
        }
        let Some(body) = parsed.document.query else {
            return Ok(node.into());
        };

        context.push_include(&name);
        let expanded = self.visit_node(body, context).await;
        context.pop_include();

        let mut group = GroupNode::new(expanded?);
        group.prefix = node.prefix;
        group.boost = node.boost;
        group.offset = node.offset;
        Ok(QueryNode::Group(group))
    }
}

#[async_trait]
impl QueryNodeVisitor for IncludeVisitor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn visit_field(
        &mut self,
        node: FieldQueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        if node.field.as_str().eq_ignore_ascii_case(&self.include_field) {
            self.expand(node, context).await
        } else {
            walk_field(self, node, context).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitor::builder::QueryStringVisitor;

    fn includes(entries: &[(&str, &str)]) -> Arc<AHashMap<String, String>> {
        Arc::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    async fn expand(input: &str, visitor: &mut IncludeVisitor) -> (String, VisitorContext) {
        let mut document = parse(input).document;
        let mut context = VisitorContext::new();
        visitor
            .visit_document(&mut document, &mut context)
            .await
            .unwrap();
        (QueryStringVisitor::build(&document), context)
    }

    #[tokio::test]
    async fn test_simple_expansion_is_grouped() {
        let mut visitor =
            IncludeVisitor::with_resolver(includes(&[("active", "status:active")]));
        let (rendered, context) = expand("@include:active AND user:1", &mut visitor).await;

        assert_eq!(rendered, "(status:active) AND user:1");
        let result = context.validation_result().unwrap();
        assert!(result.referenced_includes.contains("active"));
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn test_nested_includes_expand() {
        let mut visitor = IncludeVisitor::with_resolver(includes(&[
            ("outer", "@include:inner AND a"),
            ("inner", "b OR c"),
        ]));
        let (rendered, _) = expand("@include:outer", &mut visitor).await;

        assert_eq!(rendered, "((b OR c) AND a)");
    }

    #[tokio::test]
    async fn test_cycle_is_detected_and_terminates() {
        let mut visitor = IncludeVisitor::with_resolver(includes(&[
            ("a", "@include:b"),
            ("b", "@include:a"),
        ]));
        let (rendered, context) = expand("@include:a", &mut visitor).await;

        // The cycle bottoms out with the reference left in place.
        assert_eq!(rendered, "((@include:a))");
        let result = context.validation_result().unwrap();
        assert!(result
            .messages
            .iter()
            .any(|m| m.contains("circular include 'a'")));
    }

    #[tokio::test]
    async fn test_unresolved_include_is_recorded() {
        let mut visitor = IncludeVisitor::with_resolver(includes(&[]));
        let (rendered, context) = expand("@include:ghost", &mut visitor).await;

        assert_eq!(rendered, "@include:ghost");
        assert!(context
            .validation_result()
            .unwrap()
            .unresolved_includes
            .contains("ghost"));
    }

    #[tokio::test]
    async fn test_invalid_include_query_is_reported() {
        let mut visitor = IncludeVisitor::with_resolver(includes(&[("bad", "title:")]));
        let (rendered, context) = expand("@include:bad", &mut visitor).await;

        assert_eq!(rendered, "@include:bad");
        let result = context.validation_result().unwrap();
        assert!(result
            .messages
            .iter()
            .any(|m| m.contains("invalid query in include 'bad'")));
    }

    #[tokio::test]
    async fn test_skip_predicate_leaves_reference() {
        struct SkipAll;

        #[async_trait]
        impl IncludeSkipPredicate for SkipAll {
            async fn should_skip(&self, _name: &str, _context: &VisitorContext) -> Result<bool> {
                Ok(true)
            }
        }

        let mut visitor = IncludeVisitor::with_resolver(includes(&[("x", "a AND b")]))
            .with_skip_predicate(Arc::new(SkipAll));
        let (rendered, context) = expand("@include:x", &mut visitor).await;

        assert_eq!(rendered, "@include:x");
        // The reference is still recorded even when skipped.
        assert!(context
            .validation_result()
            .unwrap()
            .referenced_includes
            .contains("x"));
    }

    #[tokio::test]
    async fn test_phrase_include_name() {
        let mut visitor =
            IncludeVisitor::with_resolver(includes(&[("my saved", "status:active")]));
        let (rendered, _) = expand("@include:\"my saved\"", &mut visitor).await;

        assert_eq!(rendered, "(status:active)");
    }

    #[tokio::test]
    async fn test_include_prefix_carries_to_group() {
        let mut visitor = IncludeVisitor::with_resolver(includes(&[("x", "a OR b")]));
        let (rendered, _) = expand("-@include:x", &mut visitor).await;

        assert_eq!(rendered, "-(a OR b)");
    }
}
