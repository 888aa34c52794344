//! Field name resolution for aliased or hierarchical field schemes.

use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;

use crate::ast::{ExistsNode, FieldQueryNode, MissingNode, QueryNode, RangeNode};
use crate::error::Result;
use crate::text::Text;
use crate::visitor::context::VisitorContext;
use crate::visitor::{walk_field, QueryNodeVisitor};

/// Maps an input field name to an output field name.
///
/// Implemented by [`FieldMap`] and by `AHashMap<String, String>`.
/// Resolution may perform I/O.
#[async_trait]
pub trait FieldNameResolver: Send + Sync {
    /// Resolve a field name. `Ok(None)` means the resolver has no mapping.
    async fn resolve_field(&self, field: &str) -> Result<Option<String>>;
}

#[async_trait]
impl FieldNameResolver for AHashMap<String, String> {
    async fn resolve_field(&self, field: &str) -> Result<Option<String>> {
        Ok(self.get(field).cloned())
    }
}

/// A record of a field rename performed by the resolver, stashed on the
/// context so later visitors can still see the original name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRename {
    /// Offset of the renamed node, if it still maps to the input.
    pub offset: Option<usize>,
    /// The field name as written in the query.
    pub original: String,
    /// The name the resolver produced.
    pub resolved: String,
}

/// A case-insensitive alias-to-canonical field mapping.
///
/// Dotted paths resolve hierarchically, longest prefix first: with `a.b`
/// mapped to `x.y`, the input `a.b.c` resolves to `x.y.c`.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: AHashMap<String, String>,
}

impl FieldMap {
    /// Create an empty field map.
    pub fn new() -> Self {
        FieldMap::default()
    }

    /// Add an alias. Aliases compare case-insensitively.
    pub fn insert<A: Into<String>, C: Into<String>>(&mut self, alias: A, canonical: C) {
        self.entries
            .insert(alias.into().to_lowercase(), canonical.into());
    }

    /// Number of aliases in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the map has no aliases.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a field name, trying the full name first and then dotted
    /// prefixes from longest to shortest.
    pub fn resolve(&self, field: &str) -> Option<String> {
        let lower = field.to_lowercase();
        if let Some(canonical) = self.entries.get(&lower) {
            return Some(canonical.clone());
        }

        let mut end = lower.len();
        while let Some(dot) = lower[..end].rfind('.') {
            if let Some(canonical) = self.entries.get(&lower[..dot]) {
                return Some(format!("{}{}", canonical, &field[dot..]));
            }
            end = dot;
        }
        None
    }
}

impl<A: Into<String>, C: Into<String>> FromIterator<(A, C)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (A, C)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (alias, canonical) in iter {
            map.insert(alias, canonical);
        }
        map
    }
}

#[async_trait]
impl FieldNameResolver for FieldMap {
    async fn resolve_field(&self, field: &str) -> Result<Option<String>> {
        Ok(self.resolve(field))
    }
}

/// A visitor that rewrites field names on every node carrying a field:
/// field queries, exists, missing, and ranges.
///
/// A resolver set on the context runs first; the resolver captured at
/// construction runs second. When neither produces a mapping the field is
/// recorded in the result's unresolved set and left unchanged. Resolver
/// errors become validation errors naming the field.
#[derive(Default)]
pub struct FieldResolverVisitor {
    resolver: Option<Arc<dyn FieldNameResolver>>,
}

impl FieldResolverVisitor {
    /// Create a visitor that only consults the context resolver.
    pub fn new() -> Self {
        FieldResolverVisitor::default()
    }

    /// Create a visitor with a captured resolver.
    pub fn with_resolver(resolver: Arc<dyn FieldNameResolver>) -> Self {
        FieldResolverVisitor {
            resolver: Some(resolver),
        }
    }

    async fn resolve(
        &self,
        field: &mut Text,
        offset: Option<usize>,
        context: &mut VisitorContext,
    ) {
        let original = field.as_str().to_string();
        if original.is_empty() {
            return;
        }

        let mut resolved = None;
        let mut failed = false;

        if let Some(resolver) = context.field_resolver() {
            match resolver.resolve_field(&original).await {
                Ok(outcome) => resolved = outcome,
                Err(error) => {
                    context
                        .validation_result_mut()
                        .add_message(format!("error resolving field '{original}': {error}"));
                    failed = true;
                }
            }
        }

        if resolved.is_none() && !failed {
            if let Some(resolver) = &self.resolver {
                match resolver.resolve_field(&original).await {
                    Ok(outcome) => resolved = outcome,
                    Err(error) => {
                        context
                            .validation_result_mut()
                            .add_message(format!("error resolving field '{original}': {error}"));
                        failed = true;
                    }
                }
            }
        }

        match resolved {
            Some(name) => {
                if name != original {
                    context.record_field_rename(FieldRename {
                        offset,
                        original: original.clone(),
                        resolved: name.clone(),
                    });
                    field.set(name);
                }
            }
            None if !failed => {
                context
                    .validation_result_mut()
                    .unresolved_fields
                    .insert(original);
            }
            None => {}
        }
    }
}

#[async_trait]
impl QueryNodeVisitor for FieldResolverVisitor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn visit_field(
        &mut self,
        mut node: FieldQueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        self.resolve(&mut node.field, node.offset, context).await;
        walk_field(self, node, context).await
    }

    async fn visit_exists(
        &mut self,
        mut node: ExistsNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        self.resolve(&mut node.field, node.offset, context).await;
        Ok(node.into())
    }

    async fn visit_missing(
        &mut self,
        mut node: MissingNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        self.resolve(&mut node.field, node.offset, context).await;
        Ok(node.into())
    }

    async fn visit_range(
        &mut self,
        mut node: RangeNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let offset = node.offset;
        if let Some(field) = node.field.as_mut() {
            self.resolve(field, offset, context).await;
        }
        Ok(node.into())
    }
}
