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

//! Nearest-wins conflict resolution.

use indexmap::IndexMap;
use mvnutil::{
    coordinate::{Coordinate, VersionlessKey},
    dependency::Scope,
    version::{Version, VersionRange},
};
use serde::{Deserialize, Serialize};

use crate::{
    diagnostics::Diagnostic,
    error::{DependencyPath, display_path},
    graph::{DependencyGraph, GraphNode, NodeId, NodeState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictReason {
    /// The winner is closer to the root.
    Nearer,
    /// Both are at the same depth and the winner was declared first.
    FirstDeclared,
    /// The loser requires a range the winner's version is outside of.
    UnsatisfiedRange,
    /// The loser's range has nothing in common with the ranges before it.
    DisjointRanges,
}

impl ConflictReason {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ConflictReason::UnsatisfiedRange | ConflictReason::DisjointRanges
        )
    }
}

/// Two declarations of the same versionless key that disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub key: VersionlessKey,
    pub winner: Coordinate,
    pub winner_path: DependencyPath,
    pub loser: Coordinate,
    pub loser_path: DependencyPath,
    pub reason: ConflictReason,
    /// The range the loser asked for, when it was a hard one.
    pub requested: Option<String>,
}

impl Conflict {
    pub fn is_error(&self) -> bool {
        self.reason.is_error()
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let requested = self.requested.as_deref().unwrap_or_default();
        match self.reason {
            ConflictReason::Nearer => write!(
                f,
                "{} is nearer than {} (at {})",
                self.winner,
                self.loser,
                display_path(&self.loser_path)
            ),
            ConflictReason::FirstDeclared => write!(
                f,
                "{} is declared before {} (at {})",
                self.winner,
                self.loser,
                display_path(&self.loser_path)
            ),
            ConflictReason::UnsatisfiedRange => write!(
                f,
                "{} (at {}) is outside `{}` required at {}",
                self.winner,
                display_path(&self.winner_path),
                requested,
                display_path(&self.loser_path)
            ),
            ConflictReason::DisjointRanges => write!(
                f,
                "`{}` required at {} cannot be satisfied together with {} (at {})",
                requested,
                display_path(&self.loser_path),
                self.winner,
                display_path(&self.winner_path)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub key: VersionlessKey,
    pub coordinate: Coordinate,
    pub node: NodeId,
    pub depth: usize,
    /// The widest scope the key was reached with.
    pub scope: Scope,
    pub optional: bool,
    pub path: DependencyPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClasspathScope {
    Compile,
    Runtime,
    Test,
}

impl ClasspathScope {
    pub fn includes(&self, scope: Scope) -> bool {
        match self {
            ClasspathScope::Compile => {
                matches!(scope, Scope::Compile | Scope::Provided | Scope::System)
            }
            ClasspathScope::Runtime => matches!(scope, Scope::Compile | Scope::Runtime),
            ClasspathScope::Test => scope != Scope::Import,
        }
    }
}

/// One winner per versionless key, in the order the keys were first reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependencySet {
    #[serde(with = "indexmap::map::serde_seq")]
    entries: IndexMap<VersionlessKey, ResolvedDependency>,
    conflicts: Vec<Conflict>,
    diagnostics: Vec<Diagnostic>,
}

impl ResolvedDependencySet {
    pub fn get(&self, key: &VersionlessKey) -> Option<&ResolvedDependency> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &VersionlessKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.entries.values()
    }

    /// Every conflict, informational ones included.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn has_errors(&self) -> bool {
        self.conflicts.iter().any(Conflict::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(|c| c.is_error())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics = diagnostics;
    }

    /// Coordinates on the given class path, in resolution order.
    pub fn classpath(&self, scope: ClasspathScope) -> Vec<&Coordinate> {
        self.iter()
            .filter(|d| scope.includes(d.scope))
            .map(|d| &d.coordinate)
            .collect()
    }
}

impl std::fmt::Display for ResolvedDependencySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for dep in self.iter() {
            write!(f, "{} ({})", dep.coordinate, dep.scope)?;
            if dep.optional {
                write!(f, " optional")?;
            }
            writeln!(f)?;
        }
        for conflict in &self.conflicts {
            let marker = if conflict.is_error() { "error" } else { "note" };
            writeln!(f, "{}: {}", marker, conflict)?;
        }
        Ok(())
    }
}

fn hard_range(node: &GraphNode) -> Option<&VersionRange> {
    node.requested.as_ref().filter(|r| r.is_hard())
}

/// Picks a winner for every versionless key of the graph.
///
/// The winner is the shallowest node, ties going to the one reached first.
/// Every hard range declared for the key must contain the winner's version
/// and the hard ranges must have a common intersection. Violations are
/// recorded as error conflicts.
pub fn resolve_conflicts(graph: &DependencyGraph) -> ResolvedDependencySet {
    let root = graph.root();
    let root_ga = root.coordinate.ga();

    let mut groups: IndexMap<VersionlessKey, Vec<&GraphNode>> = IndexMap::new();
    for node in graph.nodes() {
        if node.is_root() || node.state == NodeState::Skipped || node.coordinate.ga() == root_ga {
            continue;
        }
        groups.entry(node.key()).or_default().push(node);
    }

    let mut set = ResolvedDependencySet::default();
    for (key, nodes) in groups {
        let Some(winner) = nodes.iter().copied().min_by_key(|n| (n.depth, n.id)) else {
            continue;
        };
        let winner_path = graph.path_to(winner.id);
        let winner_version = Version::new(&winner.coordinate.version);
        let scope = nodes
            .iter()
            .fold(winner.scope, |acc, n| acc.wider(n.scope));

        let conflict = |loser: &GraphNode, reason: ConflictReason| Conflict {
            key: key.clone(),
            winner: winner.coordinate.clone(),
            winner_path: winner_path.clone(),
            loser: loser.coordinate.clone(),
            loser_path: graph.path_to(loser.id),
            reason,
            requested: hard_range(loser).map(|r| r.to_string()),
        };

        // ranges are folded in enqueue order, the winner's included
        let mut ordered = nodes.clone();
        ordered.sort_by_key(|n| n.id);
        let mut combined: Option<VersionRange> = hard_range(winner).cloned();
        for node in ordered {
            if node.id == winner.id {
                continue;
            }
            if let Some(range) = hard_range(node) {
                let intersection = match &combined {
                    Some(c) => c.intersect(range),
                    None => Some(range.clone()),
                };
                match intersection {
                    None => {
                        set.conflicts.push(conflict(node, ConflictReason::DisjointRanges));
                        continue;
                    }
                    Some(i) => combined = Some(i),
                }
                if !range.contains(&winner_version) {
                    set.conflicts.push(conflict(node, ConflictReason::UnsatisfiedRange));
                }
                // a losing hard range records the range, not a version
                continue;
            }
            if Version::new(&node.coordinate.version) != winner_version {
                let reason = if node.depth > winner.depth {
                    ConflictReason::Nearer
                } else {
                    ConflictReason::FirstDeclared
                };
                set.conflicts.push(conflict(node, reason));
            }
        }

        if scope != winner.scope {
            log::debug!("{} widened from {} to {}", key, winner.scope, scope);
        }
        set.entries.insert(
            key.clone(),
            ResolvedDependency {
                key,
                coordinate: winner.coordinate.clone(),
                node: winner.id,
                depth: winner.depth,
                scope,
                optional: winner.optional,
                path: winner_path,
            },
        );
    }
    set
}
