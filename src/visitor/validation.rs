//! Query validation against configurable allow/restrict rules.

use std::any::Any;

use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ast::{
    ExistsNode, FieldQueryNode, GroupNode, MissingNode, NotNode, PhraseNode, QueryDocument,
    QueryNode, RangeNode, RegexNode, TermNode,
};
use crate::error::{LanceaError, Result};
use crate::visitor::context::VisitorContext;
use crate::visitor::{walk_field, walk_group, walk_not, QueryNodeVisitor};

/// Operation names recorded in [`ValidationResult::operations`].
pub mod operations {
    pub const TERM: &str = "term";
    pub const PHRASE: &str = "phrase";
    pub const RANGE: &str = "range";
    pub const REGEX: &str = "regex";
    pub const FIELD: &str = "field";
    pub const NOT: &str = "not";
    pub const EXISTS: &str = "exists";
    pub const MISSING: &str = "missing";
}

/// Options controlling what a query is allowed to contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// When non-empty, every referenced field must appear here.
    pub allowed_fields: Vec<String>,
    /// Fields that must not be referenced.
    pub restricted_fields: Vec<String>,
    /// When non-empty, every used operation must appear here.
    pub allowed_operations: Vec<String>,
    /// Operations that must not be used.
    pub restricted_operations: Vec<String>,
    /// Whether a term may start with `*` or `?`.
    pub allow_leading_wildcards: bool,
    /// Maximum group nesting depth; zero means unlimited.
    pub allowed_max_node_depth: u32,
    /// Raise a [`LanceaError::Validation`] after the post-pass when any
    /// error was recorded.
    pub should_throw: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions {
            allowed_fields: Vec::new(),
            restricted_fields: Vec::new(),
            allowed_operations: Vec::new(),
            restricted_operations: Vec::new(),
            allow_leading_wildcards: true,
            allowed_max_node_depth: 0,
            should_throw: false,
        }
    }
}

/// What a validation traversal observed and concluded.
///
/// Also the shared result object the field resolver and include visitors
/// write their unresolved-name sets into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Validation error messages; empty means the query is valid.
    pub messages: Vec<String>,
    /// Every field literally referenced in the query, before resolution.
    pub referenced_fields: AHashSet<String>,
    /// Fields no resolver could map.
    pub unresolved_fields: AHashSet<String>,
    /// Every `@include` name referenced.
    pub referenced_includes: AHashSet<String>,
    /// Include names no resolver could supply.
    pub unresolved_includes: AHashSet<String>,
    /// Count of each operation kind used in the query.
    pub operations: AHashMap<String, u32>,
    /// High-water mark of group nesting depth.
    pub max_node_depth: u32,
}

impl ValidationResult {
    /// True when no validation errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.messages.is_empty()
    }

    /// Record a validation error.
    pub fn add_message<S: Into<String>>(&mut self, message: S) {
        self.messages.push(message.into());
    }

    /// Record one use of an operation kind.
    pub fn record_operation(&mut self, operation: &str) {
        *self.operations.entry(operation.to_string()).or_insert(0) += 1;
    }

    /// Record a referenced field name.
    pub fn record_field(&mut self, field: &str) {
        if !field.is_empty() {
            self.referenced_fields.insert(field.to_string());
        }
    }
}

/// A visitor that collects referenced fields and operations and enforces
/// [`ValidationOptions`] in a post-pass after the traversal completes.
#[derive(Debug, Default)]
pub struct ValidationVisitor {
    options: ValidationOptions,
    current_depth: u32,
}

impl ValidationVisitor {
    /// Create a validator with default options. Options set on the context
    /// take precedence over the captured ones.
    pub fn new() -> Self {
        ValidationVisitor::default()
    }

    /// Create a validator with captured options.
    pub fn with_options(options: ValidationOptions) -> Self {
        ValidationVisitor {
            options,
            current_depth: 0,
        }
    }

    fn options<'a>(&'a self, context: &'a VisitorContext) -> &'a ValidationOptions {
        context.validation_options().unwrap_or(&self.options)
    }

    fn apply_restrictions(options: &ValidationOptions, result: &mut ValidationResult) {
        let restricted: Vec<&String> = sorted(
            result
                .referenced_fields
                .iter()
                .filter(|f| options.restricted_fields.contains(f)),
        );
        if !restricted.is_empty() {
            result.add_message(format!("restricted fields used: {}", join(&restricted)));
        }

        if !options.allowed_fields.is_empty() {
            let disallowed: Vec<&String> = sorted(
                result
                    .referenced_fields
                    .iter()
                    .filter(|f| !options.allowed_fields.contains(f)),
            );
            if !disallowed.is_empty() {
                result.add_message(format!("fields not allowed: {}", join(&disallowed)));
            }
        }

        let restricted_ops: Vec<&String> = sorted(
            result
                .operations
                .keys()
                .filter(|op| options.restricted_operations.contains(op)),
        );
        if !restricted_ops.is_empty() {
            result.add_message(format!(
                "restricted operations used: {}",
                join(&restricted_ops)
            ));
        }

        if !options.allowed_operations.is_empty() {
            let disallowed_ops: Vec<&String> = sorted(
                result
                    .operations
                    .keys()
                    .filter(|op| !options.allowed_operations.contains(op)),
            );
            if !disallowed_ops.is_empty() {
                result.add_message(format!(
                    "operations not allowed: {}",
                    join(&disallowed_ops)
                ));
            }
        }

        if options.allowed_max_node_depth > 0
            && result.max_node_depth > options.allowed_max_node_depth
        {
            result.add_message(format!(
                "query exceeds maximum node depth of {}",
                options.allowed_max_node_depth
            ));
        }
    }
}

fn sorted<'a, I: Iterator<Item = &'a String>>(iter: I) -> Vec<&'a String> {
    let mut values: Vec<&String> = iter.collect();
    values.sort();
    values
}

fn join(values: &[&String]) -> String {
    values
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl QueryNodeVisitor for ValidationVisitor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn visit_document(
        &mut self,
        document: &mut QueryDocument,
        context: &mut VisitorContext,
    ) -> Result<()> {
        self.current_depth = 0;

        if let Some(query) = document.query.take() {
            document.query = Some(self.visit_node(query, context).await?);
        }

        let options = self.options(context).clone();
        let result = context.validation_result_mut();
        Self::apply_restrictions(&options, result);

        if options.should_throw && !result.is_valid() {
            return Err(LanceaError::validation(result.messages.clone()));
        }
        Ok(())
    }

    async fn visit_group(
        &mut self,
        node: GroupNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        if let Some(field) = &node.field {
            context.validation_result_mut().record_field(field.as_str());
        }
        self.current_depth += 1;
        if self.current_depth > context.validation_result_mut().max_node_depth {
            context.validation_result_mut().max_node_depth = self.current_depth;
        }
        let visited = walk_group(self, node, context).await;
        self.current_depth -= 1;
        visited
    }

    async fn visit_not(
        &mut self,
        node: NotNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        context
            .validation_result_mut()
            .record_operation(operations::NOT);
        walk_not(self, node, context).await
    }

    async fn visit_field(
        &mut self,
        node: FieldQueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let result = context.validation_result_mut();
        result.record_field(node.field.as_str());
        result.record_operation(operations::FIELD);
        walk_field(self, node, context).await
    }

    async fn visit_term(
        &mut self,
        node: TermNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let allow_wildcards = self.options(context).allow_leading_wildcards;
        let result = context.validation_result_mut();
        result.record_operation(operations::TERM);
        if !allow_wildcards && node.has_leading_wildcard() {
            result.add_message(format!(
                "terms must not start with a wildcard: '{}'",
                node.unescaped_term()
            ));
        }
        Ok(node.into())
    }

    async fn visit_phrase(
        &mut self,
        node: PhraseNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        context
            .validation_result_mut()
            .record_operation(operations::PHRASE);
        Ok(node.into())
    }

    async fn visit_regex(
        &mut self,
        node: RegexNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let result = context.validation_result_mut();
        result.record_operation(operations::REGEX);
        if let Err(error) = Regex::new(node.pattern.as_str()) {
            result.add_message(format!(
                "invalid regex '{}': {}",
                node.pattern.as_str(),
                error
            ));
        }
        Ok(node.into())
    }

    async fn visit_range(
        &mut self,
        node: RangeNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let result = context.validation_result_mut();
        result.record_operation(operations::RANGE);
        if let Some(field) = &node.field {
            result.record_field(field.as_str());
        }
        Ok(node.into())
    }

    async fn visit_exists(
        &mut self,
        node: ExistsNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let result = context.validation_result_mut();
        result.record_operation(operations::EXISTS);
        result.record_field(node.field.as_str());
        Ok(node.into())
    }

    async fn visit_missing(
        &mut self,
        node: MissingNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let result = context.validation_result_mut();
        result.record_operation(operations::MISSING);
        result.record_field(node.field.as_str());
        Ok(node.into())
    }
}
