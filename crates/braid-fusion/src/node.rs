//! Composition nodes and the algebra that builds them.
//!
//! ```text
//! sequence(a, b)         a → b            (Pipeline)
//! union_of(a, b)         a ∪ b            (Fusion::Union)
//! intersection_of(a, b)  a ∩ b            (Fusion::Intersection)
//! vote_of(a, b)          vote(a, b)       (Fusion::Vote)
//! ```
//!
//! Composing two nodes of the same family flattens them into one node, so
//! `union_of(union_of(a, b), c)` has three operands. Nothing runs at
//! construction; invalid shapes are rejected with a [`FusionError`] right
//! away, before any query is answered.

use crate::collect::collect;
use crate::pipeline::{DocumentMap, Pipeline};
use crate::strategy::Strategy;
use anyhow::Result;
use braid_core::{
    Document, FusionError, Indexable, Operand, OperandId, Recorded, Request, Resettable, Results,
    StoreHandle, Visited, VoteScoring, index_operand, reset_operand,
};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, instrument};

/// Any participant in a fusion graph.
///
/// Cloning a node shares leaf operands and stores; the graph is a DAG, and the
/// same operand may appear under several parents.
#[derive(Clone)]
pub enum Node {
    Leaf(Rc<dyn Operand>),
    Map(DocumentMap),
    Pipeline(Pipeline),
    Fusion(Fusion),
}

impl Node {
    #[must_use]
    pub fn leaf<O: Operand + 'static>(operand: O) -> Self {
        Self::Leaf(Rc::new(operand))
    }

    #[must_use]
    pub const fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Composition family of this node, or `"operand"` for leaves.
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "operand",
            Self::Map(_) => "document map",
            Self::Pipeline(_) => "pipeline",
            Self::Fusion(fusion) => fusion.strategy().family(),
        }
    }

    /// Index `documents` into every indexable operand reachable from this
    /// node. Each operand, and each store shared between operands, is
    /// indexed at most once.
    ///
    /// # Errors
    ///
    /// The first indexing error raised by any operand.
    pub fn add(&self, documents: &[Document]) -> Result<&Self> {
        let mut visited = Visited::new();
        index_operand(self, documents, &mut visited)?;
        info!(
            documents = documents.len(),
            operands = visited.operand_count(),
            "indexed"
        );
        Ok(self)
    }

    /// Clear every resettable operand reachable from this node, once each.
    ///
    /// # Errors
    ///
    /// The first reset error raised by any operand.
    pub fn reset(&self) -> Result<&Self> {
        let mut visited = Visited::new();
        reset_operand(self, &mut visited)?;
        info!(operands = visited.operand_count(), "reset");
        Ok(self)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(operand) => f
                .debug_struct("Leaf")
                .field("id", &operand.id())
                .field("name", &operand.name())
                .finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Pipeline(pipeline) => f.debug_tuple("Pipeline").field(pipeline).finish(),
            Self::Fusion(fusion) => f.debug_tuple("Fusion").field(fusion).finish(),
        }
    }
}

impl Operand for Node {
    fn id(&self) -> OperandId {
        match self {
            Self::Leaf(operand) => operand.id(),
            Self::Map(map) => map.id(),
            Self::Pipeline(pipeline) => pipeline.id(),
            Self::Fusion(fusion) => fusion.id(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Leaf(operand) => operand.name(),
            Self::Map(map) => map.name(),
            Self::Pipeline(pipeline) => pipeline.name(),
            Self::Fusion(fusion) => fusion.name(),
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            Self::Leaf(operand) => operand.key(),
            Self::Map(map) => map.key(),
            Self::Pipeline(pipeline) => pipeline.key(),
            Self::Fusion(fusion) => fusion.key(),
        }
    }

    fn call(&self, request: &Request) -> Result<Results> {
        match self {
            Self::Leaf(operand) => operand.call(request),
            Self::Map(map) => map.call(request),
            Self::Pipeline(pipeline) => pipeline.call(request),
            Self::Fusion(fusion) => fusion.call(request),
        }
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        match self {
            Self::Leaf(operand) => operand.as_indexable(),
            Self::Map(map) => map.as_indexable(),
            Self::Pipeline(pipeline) => pipeline.as_indexable(),
            Self::Fusion(fusion) => fusion.as_indexable(),
        }
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        match self {
            Self::Leaf(operand) => operand.as_resettable(),
            Self::Map(map) => map.as_resettable(),
            Self::Pipeline(pipeline) => pipeline.as_resettable(),
            Self::Fusion(fusion) => fusion.as_resettable(),
        }
    }

    fn store(&self) -> Option<StoreHandle> {
        match self {
            Self::Leaf(operand) => operand.store(),
            Self::Map(map) => map.store(),
            Self::Pipeline(_) | Self::Fusion(_) => None,
        }
    }
}

impl From<Rc<dyn Operand>> for Node {
    fn from(operand: Rc<dyn Operand>) -> Self {
        Self::Leaf(operand)
    }
}

impl From<Recorded> for Node {
    fn from(recorded: Recorded) -> Self {
        Self::leaf(recorded)
    }
}

impl From<DocumentMap> for Node {
    fn from(map: DocumentMap) -> Self {
        Self::Map(map)
    }
}

impl From<Pipeline> for Node {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(pipeline)
    }
}

impl From<Fusion> for Node {
    fn from(fusion: Fusion) -> Self {
        Self::Fusion(fusion)
    }
}

/// A set-fusion node: union, intersection or vote over its operands.
#[derive(Debug, Clone)]
pub struct Fusion {
    id: OperandId,
    strategy: Strategy,
    key: String,
    operands: Vec<Node>,
}

impl Fusion {
    /// Build a fusion node. The key field is inherited from the first operand
    /// that declares one.
    ///
    /// # Errors
    ///
    /// - [`FusionError::EmptyComposition`] without operands
    /// - [`FusionError::NotComposable`] when an operand is a document map
    /// - [`FusionError::MissingKeyField`] when no operand declares a key
    pub fn new(strategy: Strategy, operands: Vec<Node>) -> Result<Self, FusionError> {
        let family = strategy.family();
        if operands.is_empty() {
            return Err(FusionError::EmptyComposition { family });
        }
        if operands.iter().any(Node::is_map) {
            return Err(FusionError::NotComposable {
                stage: "document map",
                family,
            });
        }
        let key = operands
            .iter()
            .find_map(Operand::key)
            .ok_or(FusionError::MissingKeyField { family })?
            .to_string();

        debug!(family, operands = operands.len(), key = %key, "fusion node built");
        Ok(Self {
            id: OperandId::next(),
            strategy,
            key,
            operands,
        })
    }

    /// # Errors
    ///
    /// See [`Fusion::new`].
    pub fn union(operands: Vec<Node>) -> Result<Self, FusionError> {
        Self::new(Strategy::Union, operands)
    }

    /// # Errors
    ///
    /// See [`Fusion::new`].
    pub fn intersection(operands: Vec<Node>) -> Result<Self, FusionError> {
        Self::new(Strategy::Intersection, operands)
    }

    /// Vote with softmax scoring.
    ///
    /// # Errors
    ///
    /// See [`Fusion::new`].
    pub fn vote(operands: Vec<Node>) -> Result<Self, FusionError> {
        Self::new(Strategy::vote(), operands)
    }

    /// # Errors
    ///
    /// See [`Fusion::new`].
    pub fn vote_with(scoring: VoteScoring, operands: Vec<Node>) -> Result<Self, FusionError> {
        Self::new(Strategy::Vote { scoring }, operands)
    }

    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[must_use]
    pub fn operands(&self) -> &[Node] {
        &self.operands
    }

    #[must_use]
    pub fn into_operands(self) -> Vec<Node> {
        self.operands
    }
}

impl Operand for Fusion {
    fn id(&self) -> OperandId {
        self.id
    }

    fn name(&self) -> &str {
        self.strategy.family()
    }

    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    #[instrument(skip_all, fields(strategy = self.strategy.family(), queries = request.len()))]
    fn call(&self, request: &Request) -> Result<Results> {
        // Operands see no cutoff; k applies to the fused ranking only.
        let matched = collect(&self.operands, &request.unbounded())?;
        let results = self
            .strategy
            .rank(&matched, &self.key, self.operands.len(), request.k)?;
        debug!(
            returned = results.iter().map(Vec::len).sum::<usize>(),
            "fused"
        );
        Ok(results)
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        Some(self)
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }
}

impl Indexable for Fusion {
    fn index(&self, documents: &[Document], visited: &mut Visited) -> Result<()> {
        for operand in &self.operands {
            index_operand(operand, documents, visited)?;
        }
        Ok(())
    }
}

impl Resettable for Fusion {
    fn clear(&self, visited: &mut Visited) -> Result<()> {
        for operand in &self.operands {
            reset_operand(operand, visited)?;
        }
        Ok(())
    }
}

/// `left → right`. Pipelines on either side are spliced in.
///
/// # Errors
///
/// [`FusionError::NotComposable`] when the result would start with a
/// document map.
pub fn sequence(left: impl Into<Node>, right: impl Into<Node>) -> Result<Node, FusionError> {
    let mut stages = Vec::new();
    for side in [left.into(), right.into()] {
        match side {
            Node::Pipeline(pipeline) => stages.extend(pipeline.into_stages()),
            other => stages.push(other),
        }
    }
    Pipeline::new(stages).map(Node::Pipeline)
}

/// `left ∪ right`.
///
/// # Errors
///
/// See [`Fusion::new`].
pub fn union_of(left: impl Into<Node>, right: impl Into<Node>) -> Result<Node, FusionError> {
    fuse_pair(Strategy::Union, left.into(), right.into())
}

/// `left ∩ right`.
///
/// # Errors
///
/// See [`Fusion::new`].
pub fn intersection_of(left: impl Into<Node>, right: impl Into<Node>) -> Result<Node, FusionError> {
    fuse_pair(Strategy::Intersection, left.into(), right.into())
}

/// Softmax vote over `left` and `right`.
///
/// # Errors
///
/// See [`Fusion::new`].
pub fn vote_of(left: impl Into<Node>, right: impl Into<Node>) -> Result<Node, FusionError> {
    fuse_pair(Strategy::vote(), left.into(), right.into())
}

fn fuse_pair(strategy: Strategy, left: Node, right: Node) -> Result<Node, FusionError> {
    let mut operands = Vec::new();
    for side in [left, right] {
        match side {
            Node::Fusion(fusion) if fusion.strategy() == strategy => {
                operands.extend(fusion.into_operands());
            }
            other => operands.push(other),
        }
    }
    Fusion::new(strategy, operands).map(Node::Fusion)
}
