//! Shared state that travels with a visitor traversal.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{LanceaError, Result};
use crate::visitor::field_resolver::{FieldNameResolver, FieldRename};
use crate::visitor::include::{IncludeResolver, IncludeSkipPredicate};
use crate::visitor::validation::{ValidationOptions, ValidationResult};

const KEY_VALIDATION_RESULT: &str = "validation_result";
const KEY_VALIDATION_OPTIONS: &str = "validation_options";
const KEY_FIELD_RESOLVER: &str = "field_resolver";
const KEY_INCLUDE_RESOLVER: &str = "include_resolver";
const KEY_INCLUDE_SKIP: &str = "include_skip_predicate";
const KEY_INCLUDE_STACK: &str = "include_stack";
const KEY_FIELD_RENAMES: &str = "field_renames";

/// Per-traversal context shared by all visitors in a chain.
///
/// The context is a string-keyed, untyped store plus typed accessors for
/// the well-known slots. Values written by one visitor are readable by
/// later visitors in the same traversal. Not safe for concurrent use.
#[derive(Default)]
pub struct VisitorContext {
    values: AHashMap<String, Box<dyn Any + Send + Sync>>,
    cancelled: Arc<AtomicBool>,
}

impl VisitorContext {
    /// Create an empty context.
    pub fn new() -> Self {
        VisitorContext::default()
    }

    // ----- untyped store --------------------------------------------------

    /// Store a value under a key, replacing any previous value.
    pub fn set_value<V: Any + Send + Sync>(&mut self, key: &str, value: V) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// Get a value by key, downcast to the requested type.
    pub fn get_value<V: Any>(&self, key: &str) -> Option<&V> {
        self.values.get(key)?.downcast_ref::<V>()
    }

    /// Get a mutable value by key, downcast to the requested type.
    pub fn get_value_mut<V: Any>(&mut self, key: &str) -> Option<&mut V> {
        self.values.get_mut(key)?.downcast_mut::<V>()
    }

    /// Remove a value by key.
    pub fn remove_value(&mut self, key: &str) {
        self.values.remove(key);
    }

    // ----- cancellation ---------------------------------------------------

    /// The cancellation flag observed by this traversal. Clone it to signal
    /// cancellation from another task.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Request cancellation of the traversal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Error out if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            Err(LanceaError::cancelled("query traversal was cancelled"))
        } else {
            Ok(())
        }
    }

    // ----- validation slots -----------------------------------------------

    /// The validation result accumulated so far, if any visitor wrote one.
    pub fn validation_result(&self) -> Option<&ValidationResult> {
        self.get_value(KEY_VALIDATION_RESULT)
    }

    /// The validation result, created on first access.
    pub fn validation_result_mut(&mut self) -> &mut ValidationResult {
        if !self.values.contains_key(KEY_VALIDATION_RESULT) {
            self.set_value(KEY_VALIDATION_RESULT, ValidationResult::default());
        }
        self.get_value_mut(KEY_VALIDATION_RESULT)
            .expect("validation result was just inserted")
    }

    /// Take the validation result out of the context.
    pub fn take_validation_result(&mut self) -> ValidationResult {
        let result = self
            .values
            .remove(KEY_VALIDATION_RESULT)
            .and_then(|boxed| boxed.downcast::<ValidationResult>().ok())
            .map(|boxed| *boxed);
        result.unwrap_or_default()
    }

    /// Set the validation options for this traversal.
    pub fn set_validation_options(&mut self, options: ValidationOptions) {
        self.set_value(KEY_VALIDATION_OPTIONS, options);
    }

    /// The validation options for this traversal, if set.
    pub fn validation_options(&self) -> Option<&ValidationOptions> {
        self.get_value(KEY_VALIDATION_OPTIONS)
    }

    // ----- resolver slots -------------------------------------------------

    /// Set a per-traversal field resolver. It takes precedence over a
    /// resolver captured at visitor construction.
    pub fn set_field_resolver(&mut self, resolver: Arc<dyn FieldNameResolver>) {
        self.set_value(KEY_FIELD_RESOLVER, resolver);
    }

    /// The per-traversal field resolver, if set.
    pub fn field_resolver(&self) -> Option<Arc<dyn FieldNameResolver>> {
        self.get_value::<Arc<dyn FieldNameResolver>>(KEY_FIELD_RESOLVER)
            .cloned()
    }

    /// Set a per-traversal include resolver.
    pub fn set_include_resolver(&mut self, resolver: Arc<dyn IncludeResolver>) {
        self.set_value(KEY_INCLUDE_RESOLVER, resolver);
    }

    /// The per-traversal include resolver, if set.
    pub fn include_resolver(&self) -> Option<Arc<dyn IncludeResolver>> {
        self.get_value::<Arc<dyn IncludeResolver>>(KEY_INCLUDE_RESOLVER)
            .cloned()
    }

    /// Set the predicate that decides whether an include is left unexpanded.
    pub fn set_include_skip_predicate(&mut self, predicate: Arc<dyn IncludeSkipPredicate>) {
        self.set_value(KEY_INCLUDE_SKIP, predicate);
    }

    /// The include skip predicate, if set.
    pub fn include_skip_predicate(&self) -> Option<Arc<dyn IncludeSkipPredicate>> {
        self.get_value::<Arc<dyn IncludeSkipPredicate>>(KEY_INCLUDE_SKIP)
            .cloned()
    }

    // ----- include stack --------------------------------------------------

    /// The stack of include names currently being expanded.
    pub fn include_stack(&self) -> &[String] {
        self.get_value::<Vec<String>>(KEY_INCLUDE_STACK)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Push an include name onto the expansion stack.
    pub fn push_include(&mut self, name: &str) {
        if !self.values.contains_key(KEY_INCLUDE_STACK) {
            self.set_value(KEY_INCLUDE_STACK, Vec::<String>::new());
        }
        self.get_value_mut::<Vec<String>>(KEY_INCLUDE_STACK)
            .expect("include stack was just inserted")
            .push(name.to_string());
    }

    /// Pop the most recently pushed include name.
    pub fn pop_include(&mut self) {
        if let Some(stack) = self.get_value_mut::<Vec<String>>(KEY_INCLUDE_STACK) {
            stack.pop();
        }
    }

    // ----- field renames --------------------------------------------------

    /// Record that a resolver rewrote a field name, keeping the original
    /// visible to later visitors without growing the node itself.
    pub fn record_field_rename(&mut self, rename: FieldRename) {
        if !self.values.contains_key(KEY_FIELD_RENAMES) {
            self.set_value(KEY_FIELD_RENAMES, Vec::<FieldRename>::new());
        }
        self.get_value_mut::<Vec<FieldRename>>(KEY_FIELD_RENAMES)
            .expect("rename list was just inserted")
            .push(rename);
    }

    /// All field renames recorded during this traversal.
    pub fn field_renames(&self) -> &[FieldRename] {
        self.get_value::<Vec<FieldRename>>(KEY_FIELD_RENAMES)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
