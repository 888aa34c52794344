//! Priority-ordered composition of visitors.

use std::any::Any;

use async_trait::async_trait;

use crate::ast::{QueryDocument, QueryNode};
use crate::error::{LanceaError, Result};
use crate::visitor::context::VisitorContext;
use crate::visitor::QueryNodeVisitor;

struct ChainEntry {
    priority: i32,
    visitor: Box<dyn QueryNodeVisitor>,
}

/// A visitor that applies child visitors to the entire document in
/// ascending priority order, sharing one context.
///
/// Children with equal priorities run in insertion order. Each child runs
/// to completion over the whole document before the next starts, so values
/// written to the context by earlier children are visible to later ones.
#[derive(Default)]
pub struct ChainedVisitor {
    children: Vec<ChainEntry>,
}

impl ChainedVisitor {
    /// Create an empty chain.
    pub fn new() -> Self {
        ChainedVisitor::default()
    }

    /// Number of visitors in the chain.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Add a visitor with a priority.
    pub fn add(&mut self, visitor: Box<dyn QueryNodeVisitor>, priority: i32) {
        self.children.push(ChainEntry { priority, visitor });
        // Stable sort keeps insertion order for equal priorities.
        self.children.sort_by_key(|entry| entry.priority);
    }

    /// Insert a visitor directly before the first child of type `T`,
    /// sharing its priority.
    pub fn add_before<T: QueryNodeVisitor + 'static>(
        &mut self,
        visitor: Box<dyn QueryNodeVisitor>,
    ) -> Result<()> {
        let index = self.position_of::<T>().ok_or_else(Self::not_in_chain)?;
        let priority = self.children[index].priority;
        self.children.insert(index, ChainEntry { priority, visitor });
        Ok(())
    }

    /// Insert a visitor directly after the first child of type `T`,
    /// sharing its priority.
    pub fn add_after<T: QueryNodeVisitor + 'static>(
        &mut self,
        visitor: Box<dyn QueryNodeVisitor>,
    ) -> Result<()> {
        let index = self.position_of::<T>().ok_or_else(Self::not_in_chain)?;
        let priority = self.children[index].priority;
        self.children
            .insert(index + 1, ChainEntry { priority, visitor });
        Ok(())
    }

    /// Remove the first child of type `T`, returning it.
    pub fn remove<T: QueryNodeVisitor + 'static>(&mut self) -> Option<Box<dyn QueryNodeVisitor>> {
        let index = self.position_of::<T>()?;
        Some(self.children.remove(index).visitor)
    }

    /// Replace the first child of type `T`, keeping its priority and slot.
    pub fn replace<T: QueryNodeVisitor + 'static>(
        &mut self,
        visitor: Box<dyn QueryNodeVisitor>,
    ) -> Result<()> {
        let index = self.position_of::<T>().ok_or_else(Self::not_in_chain)?;
        self.children[index].visitor = visitor;
        Ok(())
    }

    fn position_of<T: QueryNodeVisitor + 'static>(&self) -> Option<usize> {
        self.children
            .iter()
            .position(|entry| entry.visitor.as_any().is::<T>())
    }

    fn not_in_chain() -> LanceaError {
        LanceaError::invalid_argument("no visitor of the requested type in the chain")
    }
}

#[async_trait]
impl QueryNodeVisitor for ChainedVisitor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn visit_document(
        &mut self,
        document: &mut QueryDocument,
        context: &mut VisitorContext,
    ) -> Result<()> {
        for entry in self.children.iter_mut() {
            entry.visitor.visit_document(document, context).await?;
        }
        Ok(())
    }

    async fn visit_node(
        &mut self,
        node: QueryNode,
        context: &mut VisitorContext,
    ) -> Result<QueryNode> {
        let mut node = node;
        for entry in self.children.iter_mut() {
            node = entry.visitor.visit_node(node, context).await?;
        }
        Ok(node)
    }
}
