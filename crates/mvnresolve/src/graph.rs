// mvnkit: Dependency resolution and effective-model engine for Maven-style builds.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Expansion of a root model into the full dependency graph.
//!
//! The graph is built one depth level at a time. Each level is planned in
//! declaration order, its metadata is fetched concurrently, and its nodes are
//! then created in the planned order, so node ids always follow the
//! breadth-first enqueue order no matter how the fetches interleave.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use mvnutil::{
    coordinate::{Coordinate, Exclusion, VersionlessKey},
    dependency::{Dependency, Scope},
    environment::Environment,
    model::Model,
    version::{NoMatchingVersionError, Version, VersionRange},
};
use petgraph::graphmap::DiGraphMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    cancel::CancellationToken,
    diagnostics::{Diagnostic, Diagnostics},
    error::{DependencyPath, MetadataError, ModelBuildError, ResolveError},
    model_builder::ModelBuilder,
    reader::MetadataReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    /// `None` once ids no longer fit in a `u32`.
    pub fn new_usize(id: usize) -> Option<Self> {
        u32::try_from(id).ok().map(Self)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    /// The node's own dependencies were added below it.
    Expanded,
    /// Its scope or optionality stops expansion here.
    Leaf,
    /// Its `groupId:artifactId` is already on the path from the root.
    Cycle,
    /// Its versionless key was already taken by an earlier node, so it can
    /// never win and its subtree is not explored.
    Omitted,
    /// An optional dependency, or one below an optional dependency, whose
    /// metadata could not be read.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub coordinate: Coordinate,
    /// The version requirement as declared. `None` for the root.
    pub requested: Option<VersionRange>,
    pub scope: Scope,
    pub depth: usize,
    pub optional: bool,
    /// Exclusions in effect below this node, inherited ones included.
    pub exclusions: Vec<Exclusion>,
    pub parent: Option<NodeId>,
    pub state: NodeState,
}

impl GraphNode {
    pub fn key(&self) -> VersionlessKey {
        self.coordinate.key()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    fn excludes(&self, dep: &Dependency) -> bool {
        self.exclusions
            .iter()
            .any(|e| e.matches(&dep.group_id, &dep.artifact_id))
    }
}

/// Every node reached from the root, in breadth-first order.
///
/// Serialized as its node list. Edges are rebuilt from the parent links.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<GraphNode>", into = "Vec<GraphNode>")]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    edges: DiGraphMap<NodeId, ()>,
}

impl TryFrom<Vec<GraphNode>> for DependencyGraph {
    type Error = String;

    fn try_from(nodes: Vec<GraphNode>) -> Result<Self, Self::Error> {
        let mut nodes = nodes.into_iter();
        let root = match nodes.next() {
            Some(root) if root.is_root() && root.id == NodeId::ROOT => root,
            _ => return Err("a dependency graph starts with its root".into()),
        };
        let mut graph = DependencyGraph::with_root(root);
        for node in nodes {
            let expected = NodeId::new_usize(graph.len());
            match node.parent {
                Some(parent) if Some(node.id) == expected && parent < node.id => {}
                _ => return Err(format!("node {} is out of order", node.coordinate)),
            }
            graph.add_node(node).map_err(|e| e.to_string())?;
        }
        Ok(graph)
    }
}

impl From<DependencyGraph> for Vec<GraphNode> {
    fn from(graph: DependencyGraph) -> Self {
        graph.nodes
    }
}

impl PartialEq for DependencyGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for DependencyGraph {}

impl DependencyGraph {
    fn with_root(root: GraphNode) -> Self {
        let mut edges = DiGraphMap::new();
        edges.add_node(root.id);
        DependencyGraph {
            nodes: vec![root],
            edges,
        }
    }

    fn add_node(&mut self, mut node: GraphNode) -> Result<NodeId, ResolveError> {
        let id = NodeId::new_usize(self.nodes.len()).ok_or(ResolveError::TooManyNodes {
            limit: u32::MAX as usize,
        })?;
        node.id = id;
        self.edges.add_node(id);
        if let Some(parent) = node.parent {
            self.edges.add_edge(parent, id, ());
        }
        self.nodes.push(node);
        Ok(id)
    }

    pub fn root(&self) -> &GraphNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.as_usize()]
    }

    /// Number of nodes, the root included, so never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn graph(&self) -> &DiGraphMap<NodeId, ()> {
        &self.edges
    }

    /// Direct children of a node, in declaration order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &GraphNode> + '_ {
        let mut ids: Vec<_> = self
            .edges
            .neighbors_directed(id, petgraph::Direction::Outgoing)
            .collect();
        ids.sort();
        ids.into_iter().map(|id| self.node(id))
    }

    /// Whether `id` or one of its ancestors below the root is optional.
    pub fn under_optional(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id);
            if node.optional {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Coordinates from the root down to `id`, both included.
    pub fn path_to(&self, id: NodeId) -> DependencyPath {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id);
            path.push(node.coordinate.clone());
            current = node.parent;
        }
        path.reverse();
        path
    }

    fn write_subtree(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        node: &GraphNode,
    ) -> std::fmt::Result {
        write!(f, "{:indent$}{}", "", node.coordinate, indent = node.depth * 2)?;
        if !node.is_root() {
            write!(f, " ({})", node.scope)?;
        }
        if node.optional {
            write!(f, " optional")?;
        }
        match node.state {
            NodeState::Expanded | NodeState::Leaf => {}
            NodeState::Cycle => write!(f, " [cycle]")?,
            NodeState::Omitted => write!(f, " [omitted]")?,
            NodeState::Skipped => write!(f, " [skipped]")?,
        }
        writeln!(f)?;
        for child in self.children(node.id) {
            self.write_subtree(f, child)?;
        }
        Ok(())
    }
}

/// Indented tree, one node per line.
impl std::fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_subtree(f, self.root())
    }
}

/// Where the graph builder gets effective models and version listings from.
pub trait ModelSource: Sync {
    fn effective_model(&self, coordinate: &Coordinate) -> Result<Arc<Model>, ModelBuildError>;

    fn available_versions(&self, key: &VersionlessKey)
    -> Result<Arc<Vec<Version>>, MetadataError>;
}

/// Builds every requested model from scratch.
pub struct DirectModelSource<'a> {
    reader: &'a dyn MetadataReader,
    env: Environment,
    max_parent_depth: usize,
}

impl<'a> DirectModelSource<'a> {
    pub fn new(reader: &'a dyn MetadataReader, env: Environment) -> Self {
        DirectModelSource {
            reader,
            env,
            max_parent_depth: crate::model_builder::DEFAULT_MAX_PARENT_DEPTH,
        }
    }

    pub fn max_parent_depth(mut self, depth: usize) -> Self {
        self.max_parent_depth = depth;
        self
    }
}

impl ModelSource for DirectModelSource<'_> {
    fn effective_model(&self, coordinate: &Coordinate) -> Result<Arc<Model>, ModelBuildError> {
        ModelBuilder::new(self.reader)
            .max_parent_depth(self.max_parent_depth)
            .build_coordinate(coordinate, &self.env)
            .map(Arc::new)
    }

    fn available_versions(
        &self,
        key: &VersionlessKey,
    ) -> Result<Arc<Vec<Version>>, MetadataError> {
        self.reader.available_versions(key).map(Arc::new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanKind {
    Expand,
    Leaf,
    Cycle,
    Omitted,
}

/// A dependency accepted into the current level, before any I/O.
#[derive(Debug)]
struct Plan {
    parent: NodeId,
    dependency: Dependency,
    requested: VersionRange,
    scope: Scope,
    depth: usize,
    optional: bool,
    /// Optional itself or below an optional dependency, so a metadata
    /// failure skips it instead of failing the resolution.
    tolerant: bool,
    exclusions: Vec<Exclusion>,
    kind: PlanKind,
}

impl Plan {
    /// The declaration as a coordinate, with the requested range as version.
    fn declared(&self) -> Coordinate {
        self.dependency.to_coordinate(self.requested.to_string())
    }
}

#[derive(Debug)]
enum FetchError {
    Cancelled,
    Versions(MetadataError),
    NoMatch(NoMatchingVersionError),
    Model(ModelBuildError),
}

/// The version a node is recorded with, and the model to expand it with.
type Fetched = Result<(String, Option<Arc<Model>>), FetchError>;

fn fetch(plan: &Plan, source: &dyn ModelSource, cancel: &CancellationToken) -> Fetched {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    let range = &plan.requested;
    // a node that cannot win keeps its declared range, which conflict
    // resolution checks against the winner
    if range.is_hard() && matches!(plan.kind, PlanKind::Omitted | PlanKind::Cycle) {
        return Ok((range.to_string(), None));
    }
    let version = match range.recommended().filter(|_| range.is_soft()) {
        Some(v) => v.clone(),
        None => {
            let versions = source
                .available_versions(&plan.dependency.key())
                .map_err(FetchError::Versions)?;
            range
                .select_highest(versions.iter())
                .map_err(FetchError::NoMatch)?
        }
    };
    if plan.kind != PlanKind::Expand {
        return Ok((version.to_string(), None));
    }
    let coordinate = plan.dependency.to_coordinate(version.as_str());
    log::debug!("Expanding {}", coordinate);
    let model = source
        .effective_model(&coordinate)
        .map_err(FetchError::Model)?;
    Ok((version.to_string(), Some(model)))
}

/// Applies the root's dependency management to a transitive declaration.
/// A managed version overrides the declared one and managed exclusions are
/// added. The managed scope is applied after scope derivation.
fn manage(dep: &Dependency, managed: &Dependency) -> Dependency {
    let mut dep = dep.clone();
    if managed.version.is_some() {
        dep.version = managed.version.clone();
    }
    if dep.system_path.is_none() {
        dep.system_path = managed.system_path.clone();
    }
    for e in &managed.exclusions {
        if !dep.exclusions.contains(e) {
            dep.exclusions.push(e.clone());
        }
    }
    dep
}

struct GraphBuilder<'a> {
    source: &'a dyn ModelSource,
    pool: Option<&'a rayon::ThreadPool>,
    cancel: &'a CancellationToken,
    diagnostics: &'a mut Diagnostics,
    graph: DependencyGraph,
    /// Versionless keys that already have a node able to win.
    taken: HashSet<VersionlessKey>,
    /// The root's dependency management, applied below the first level.
    managed: HashMap<VersionlessKey, Dependency>,
}

impl GraphBuilder<'_> {
    fn plan_level(&mut self, frontier: &[(NodeId, Arc<Model>)]) -> Result<Vec<Plan>, ResolveError> {
        let mut plans = Vec::new();
        for (parent_id, model) in frontier {
            self.cancel.check()?;
            let parent = self.graph.node(*parent_id).clone();
            let path = self.graph.path_to(parent.id);
            let on_path: HashSet<String> = path.iter().map(|c| c.ga()).collect();
            let parent_tolerant = self.graph.under_optional(parent.id);

            for declared in model.dependencies() {
                let managed = if parent.is_root() {
                    None
                } else {
                    self.managed.get(&declared.key())
                };
                let dep = match managed {
                    Some(managed) => {
                        let dep = manage(declared, managed);
                        if dep != *declared {
                            log::debug!("Managed {} to {} below {}", declared, dep, parent.coordinate);
                        }
                        dep
                    }
                    None => declared.clone(),
                };
                let dep = &dep;
                if parent.excludes(dep) {
                    log::debug!("Excluding {} below {}", dep, parent.coordinate);
                    continue;
                }

                let declared_scope = dep.effective_scope();
                if declared_scope == Scope::Import {
                    self.diagnostics.report(Diagnostic::Ignored {
                        dependency: dep.to_string(),
                        declared_by: parent.coordinate.clone(),
                        reason: "`import` scope only applies to dependency management".into(),
                    });
                    continue;
                }
                let scope = if parent.is_root() {
                    declared_scope
                } else {
                    match parent.scope.transitive(declared_scope) {
                        Some(scope) => managed.and_then(|m| m.scope).unwrap_or(scope),
                        None => continue,
                    }
                };

                let requested = match dep.version_range() {
                    Some(Ok(range)) => range,
                    Some(Err(error)) => {
                        return Err(ResolveError::RangeSyntax { error, path });
                    }
                    None if parent.is_root() => {
                        return Err(ResolveError::InvalidModel {
                            coordinate: parent.coordinate.to_string(),
                            reason: format!("dependency {} has no version", dep.key()),
                        });
                    }
                    None => {
                        self.diagnostics.report(Diagnostic::MissingVersion {
                            dependency: dep.key().to_string(),
                            declared_by: parent.coordinate.clone(),
                        });
                        continue;
                    }
                };

                let optional = dep.is_optional();
                let key = dep.key();
                let kind = if on_path.contains(&dep.ga()) {
                    PlanKind::Cycle
                } else if self.taken.contains(&key) {
                    PlanKind::Omitted
                } else if !scope.propagates() || (optional && !parent.is_root()) {
                    PlanKind::Leaf
                } else {
                    PlanKind::Expand
                };
                if matches!(kind, PlanKind::Expand | PlanKind::Leaf) {
                    self.taken.insert(key);
                }

                let mut exclusions = parent.exclusions.clone();
                for e in &dep.exclusions {
                    if !exclusions.contains(e) {
                        exclusions.push(e.clone());
                    }
                }

                plans.push(Plan {
                    parent: parent.id,
                    dependency: dep.clone(),
                    requested,
                    scope,
                    depth: parent.depth + 1,
                    optional,
                    tolerant: optional || parent_tolerant,
                    exclusions,
                    kind,
                });
            }
        }
        Ok(plans)
    }

    fn fetch_level(&self, plans: &[Plan]) -> Vec<Fetched> {
        let source = self.source;
        let cancel = self.cancel;
        match self.pool {
            Some(pool) => pool.install(|| {
                plans
                    .par_iter()
                    .map(|plan| fetch(plan, source, cancel))
                    .collect()
            }),
            None => plans.iter().map(|plan| fetch(plan, source, cancel)).collect(),
        }
    }

    fn add(
        &mut self,
        plan: &Plan,
        coordinate: Coordinate,
        state: NodeState,
    ) -> Result<NodeId, ResolveError> {
        self.graph.add_node(GraphNode {
            id: NodeId::ROOT,
            coordinate,
            requested: Some(plan.requested.clone()),
            scope: plan.scope,
            depth: plan.depth,
            optional: plan.optional,
            exclusions: plan.exclusions.clone(),
            parent: Some(plan.parent),
            state,
        })
    }

    /// Records a failed optional dependency, or turns the failure into the
    /// error of the whole resolution.
    fn skip_or_fail(
        &mut self,
        plan: &Plan,
        error: MetadataError,
        lift: impl FnOnce(MetadataError, DependencyPath) -> ResolveError,
    ) -> Result<(), ResolveError> {
        let mut path = self.graph.path_to(plan.parent);
        let coordinate = plan.declared();
        path.push(coordinate.clone());
        if !plan.tolerant {
            return Err(lift(error, path));
        }

        if matches!(plan.kind, PlanKind::Expand | PlanKind::Leaf) {
            self.taken.remove(&plan.dependency.key());
        }
        self.add(plan, coordinate.clone(), NodeState::Skipped)?;
        self.diagnostics.report(Diagnostic::SkippedOptional {
            coordinate,
            path,
            error,
        });
        Ok(())
    }

    fn create_level(
        &mut self,
        plans: &[Plan],
        fetched: Vec<Fetched>,
    ) -> Result<Vec<(NodeId, Arc<Model>)>, ResolveError> {
        let mut next = Vec::new();
        for (plan, result) in plans.iter().zip(fetched) {
            match result {
                Ok((version, model)) => {
                    let coordinate = plan.dependency.to_coordinate(version);
                    let state = match plan.kind {
                        PlanKind::Expand => NodeState::Expanded,
                        PlanKind::Leaf => NodeState::Leaf,
                        PlanKind::Cycle => NodeState::Cycle,
                        PlanKind::Omitted => NodeState::Omitted,
                    };
                    if state == NodeState::Cycle {
                        self.diagnostics.report(Diagnostic::Cycle {
                            coordinate: coordinate.clone(),
                            path: self.graph.path_to(plan.parent),
                        });
                    }
                    let id = self.add(plan, coordinate, state)?;
                    if let Some(model) = model {
                        next.push((id, model));
                    }
                }
                Err(FetchError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(FetchError::NoMatch(error)) => {
                    let mut path = self.graph.path_to(plan.parent);
                    path.push(plan.declared());
                    return Err(ResolveError::NoMatchingVersion {
                        key: plan.dependency.key(),
                        error,
                        path,
                    });
                }
                Err(FetchError::Versions(error)) => {
                    let coordinate = plan.declared();
                    self.skip_or_fail(plan, error, |e, path| ResolveError::MetadataUnavailable {
                        coordinate,
                        path,
                        kind: e.kind,
                        message: e.message,
                    })?;
                }
                Err(FetchError::Model(ModelBuildError::Metadata(error))) => {
                    self.skip_or_fail(plan, error, |e, path| {
                        ResolveError::from_model_error(ModelBuildError::Metadata(e), path)
                    })?;
                }
                Err(FetchError::Model(error)) => {
                    let mut path = self.graph.path_to(plan.parent);
                    path.push(plan.declared());
                    return Err(ResolveError::from_model_error(error, path));
                }
            }
        }
        Ok(next)
    }
}

/// The root's managed dependencies by versionless key. Imports were already
/// inlined by the model builder, and the first declaration of a key wins.
fn managed_dependencies(root: &Model) -> HashMap<VersionlessKey, Dependency> {
    let mut managed = HashMap::new();
    for dep in root.dependency_management() {
        if dep.effective_scope() == Scope::Import {
            continue;
        }
        managed.entry(dep.key()).or_insert_with(|| dep.clone());
    }
    managed
}

/// Expands `root` (an effective model) into its dependency graph.
///
/// Fetches of one level run on `pool` when given, and sequentially
/// otherwise. The result does not depend on which.
pub fn build_graph(
    root: &Model,
    source: &dyn ModelSource,
    pool: Option<&rayon::ThreadPool>,
    cancel: &CancellationToken,
    diagnostics: &mut Diagnostics,
) -> Result<DependencyGraph, ResolveError> {
    let root_node = GraphNode {
        id: NodeId::ROOT,
        coordinate: root.coordinate(),
        requested: None,
        scope: Scope::Compile,
        depth: 0,
        optional: false,
        exclusions: Vec::new(),
        parent: None,
        state: NodeState::Expanded,
    };
    let mut taken = HashSet::new();
    taken.insert(root_node.key());

    let mut builder = GraphBuilder {
        source,
        pool,
        cancel,
        diagnostics,
        graph: DependencyGraph::with_root(root_node),
        taken,
        managed: managed_dependencies(root),
    };

    let mut frontier = vec![(NodeId::ROOT, Arc::new(root.clone()))];
    let mut depth = 0;
    while !frontier.is_empty() {
        cancel.check()?;
        let plans = builder.plan_level(&frontier)?;
        log::debug!("Level {}: {} dependencies", depth + 1, plans.len());
        let fetched = builder.fetch_level(&plans);
        frontier = builder.create_level(&plans, fetched)?;
        depth += 1;
    }
    Ok(builder.graph)
}
