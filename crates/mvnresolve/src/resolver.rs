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

//! The `resolve` pipeline: effective root model, dependency graph, then
//! conflict resolution, with repository access going through a
//! [`RequestCache`].

use std::sync::Arc;

use mvnutil::{
    coordinate::{Coordinate, VersionlessKey},
    environment::Environment,
    model::Model,
    version::Version,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    cache::{CacheRetention, CachedError, Request, RequestCache, RequestScope},
    cancel::CancellationToken,
    conflict::{ResolvedDependencySet, resolve_conflicts},
    diagnostics::Diagnostics,
    error::{MetadataError, ModelBuildError, ResolutionFailure, ResolveError},
    graph::{DependencyGraph, ModelSource, build_graph},
    model_builder::ModelBuilder,
    options::{ConflictPolicy, ResolveOptions},
    reader::MetadataReader,
};

/// The cacheable steps of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionRequest {
    /// The raw model of a coordinate, as the repository returns it.
    ReadModel(Coordinate),
    /// The version listing of an artifact.
    Versions(VersionlessKey),
    /// The effective model of a dependency under one environment.
    EffectiveModel {
        coordinate: Coordinate,
        env: Arc<Environment>,
    },
    /// A whole [`resolve`] call, by the digest of its root model,
    /// environment and options. Lives as long as the version listings it
    /// was computed from.
    Resolve { fingerprint: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionResponse {
    Model(Arc<Model>),
    Versions(Arc<Vec<Version>>),
    Resolution(Arc<Resolution>),
}

impl CachedError for ResolutionFailure {
    fn is_transient(&self) -> bool {
        ResolutionFailure::is_transient(self)
    }
}

impl Request for ResolutionRequest {
    type Response = ResolutionResponse;
    type Error = ResolutionFailure;

    fn retention(&self) -> CacheRetention {
        match self {
            ResolutionRequest::ReadModel(_) => CacheRetention::Persistent,
            ResolutionRequest::Versions(_) | ResolutionRequest::Resolve { .. } => {
                CacheRetention::SessionScoped
            }
            ResolutionRequest::EffectiveModel { .. } => CacheRetention::RequestScoped,
        }
    }

    fn persistent_key(&self) -> Option<String> {
        match self {
            ResolutionRequest::ReadModel(coordinate) => Some(format!("read-model:{}", coordinate)),
            _ => None,
        }
    }
}

pub type ResolutionCache = RequestCache<ResolutionRequest>;

/// A reader answering from the cache, and from `inner` on a miss.
struct CachingReader<'a> {
    inner: &'a dyn MetadataReader,
    cache: &'a ResolutionCache,
    scope: &'a RequestScope<ResolutionRequest>,
}

/// Takes the metadata error back out of a cached outcome.
fn metadata_error(target: &dyn std::fmt::Display, error: ResolutionFailure) -> MetadataError {
    match error {
        ResolutionFailure::Model(ModelBuildError::Metadata(e)) => e,
        other => MetadataError::malformed(target, other.to_string()),
    }
}

impl MetadataReader for CachingReader<'_> {
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
        let req = ResolutionRequest::ReadModel(coordinate.clone());
        let outcome = self.cache.request(self.scope, &req, |_| {
            let model = self.inner.read(coordinate).map_err(ModelBuildError::from)?;
            Ok(ResolutionResponse::Model(Arc::new(model)))
        });
        match outcome {
            Ok(ResolutionResponse::Model(model)) => Ok((*model).clone()),
            Ok(other) => Err(MetadataError::malformed(
                coordinate,
                format!("unexpected cache entry {:?}", other),
            )),
            Err(e) => Err(metadata_error(coordinate, e)),
        }
    }

    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
        self.versions(key).map(|vs| (*vs).clone())
    }
}

impl CachingReader<'_> {
    fn versions(&self, key: &VersionlessKey) -> Result<Arc<Vec<Version>>, MetadataError> {
        let req = ResolutionRequest::Versions(key.clone());
        let outcome = self.cache.request(self.scope, &req, |_| {
            let versions = self
                .inner
                .available_versions(key)
                .map_err(ModelBuildError::from)?;
            Ok(ResolutionResponse::Versions(Arc::new(versions)))
        });
        match outcome {
            Ok(ResolutionResponse::Versions(versions)) => Ok(versions),
            Ok(other) => Err(MetadataError::malformed(
                key,
                format!("unexpected cache entry {:?}", other),
            )),
            Err(e) => Err(metadata_error(key, e)),
        }
    }
}

/// Effective dependency models for one `resolve` call.
struct Session<'a> {
    reader: CachingReader<'a>,
    env: Arc<Environment>,
    max_parent_depth: usize,
}

impl ModelSource for Session<'_> {
    fn effective_model(&self, coordinate: &Coordinate) -> Result<Arc<Model>, ModelBuildError> {
        let req = ResolutionRequest::EffectiveModel {
            coordinate: coordinate.clone(),
            env: self.env.clone(),
        };
        let outcome = self.reader.cache.request(self.reader.scope, &req, |_| {
            let model = ModelBuilder::new(&self.reader)
                .max_parent_depth(self.max_parent_depth)
                .build_coordinate(coordinate, &self.env)?;
            Ok(ResolutionResponse::Model(Arc::new(model)))
        });
        let unexpected = |what: String| ModelBuildError::InvalidModel {
            coordinate: coordinate.to_string(),
            reason: format!("unexpected cache entry {}", what),
        };
        match outcome {
            Ok(ResolutionResponse::Model(model)) => Ok(model),
            Ok(other) => Err(unexpected(format!("{:?}", other))),
            Err(ResolutionFailure::Model(e)) => Err(e),
            Err(other) => Err(unexpected(other.to_string())),
        }
    }

    fn available_versions(
        &self,
        key: &VersionlessKey,
    ) -> Result<Arc<Vec<Version>>, MetadataError> {
        self.reader.versions(key)
    }
}

/// The outcome of a successful [`resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The effective model of the root project.
    pub model: Model,
    pub graph: DependencyGraph,
    pub dependencies: ResolvedDependencySet,
}

fn thread_pool(threads: usize) -> Option<rayon::ThreadPool> {
    if threads <= 1 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("mvnkit-read-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!(
                "Failed to start {} reader threads, reading sequentially: {}",
                threads,
                e
            );
            None
        }
    }
}

/// Resolves the dependencies of the raw project model `root`.
///
/// Profiles of `root` and its parents are activated against `env`.
/// Dependency models see an empty environment unless
/// [`ResolveOptions::inherit_environment`] is set.
pub fn resolve(
    root: &Model,
    reader: &dyn MetadataReader,
    env: &Environment,
    cache: &ResolutionCache,
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    resolve_with_cancel(root, reader, env, cache, options, &CancellationToken::new())
}

/// [`resolve`], stopping with [`ResolveError::Cancelled`] once `cancel` is
/// set.
pub fn resolve_with_cancel(
    root: &Model,
    reader: &dyn MetadataReader,
    env: &Environment,
    cache: &ResolutionCache,
    options: &ResolveOptions,
    cancel: &CancellationToken,
) -> Result<Resolution, ResolveError> {
    let coordinate = root.coordinate();
    let _span = tracing::info_span!("resolve", root = %coordinate).entered();

    let result = resolve_cached(root, reader, env, cache, options, cancel);
    if let Err(e) = &result
        && e.is_cancelled()
    {
        log::debug!("Resolution of {} cancelled", coordinate);
    }
    result
}

/// Digest of everything a resolution depends on besides the repository.
fn fingerprint(
    root: &Model,
    env: &Environment,
    options: &ResolveOptions,
) -> serde_json::Result<String> {
    let input = serde_json::to_vec(&(root, env, options))?;
    Ok(format!("{:x}", Sha256::digest(&input)))
}

fn resolve_cached(
    root: &Model,
    reader: &dyn MetadataReader,
    env: &Environment,
    cache: &ResolutionCache,
    options: &ResolveOptions,
    cancel: &CancellationToken,
) -> Result<Resolution, ResolveError> {
    cancel.check()?;
    let scope = RequestScope::new();
    let fingerprint = match fingerprint(root, env, options) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            log::warn!("Not caching the resolution of {}: {}", root.coordinate(), e);
            return resolve_inner(root, reader, env, cache, &scope, options, cancel);
        }
    };

    let req = ResolutionRequest::Resolve { fingerprint };
    let outcome = cache.request(&scope, &req, |_| {
        let resolution = resolve_inner(root, reader, env, cache, &scope, options, cancel)?;
        Ok(ResolutionResponse::Resolution(Arc::new(resolution)))
    });
    match outcome {
        Ok(ResolutionResponse::Resolution(resolution)) => Ok((*resolution).clone()),
        Ok(other) => Err(ResolveError::InvalidModel {
            coordinate: root.coordinate().to_string(),
            reason: format!("unexpected cache entry {:?}", other),
        }),
        Err(ResolutionFailure::Resolve(e)) => Err(e),
        Err(ResolutionFailure::Model(e)) => {
            Err(ResolveError::from_model_error(e, vec![root.coordinate()]))
        }
    }
}

fn resolve_inner(
    root: &Model,
    reader: &dyn MetadataReader,
    env: &Environment,
    cache: &ResolutionCache,
    scope: &RequestScope<ResolutionRequest>,
    options: &ResolveOptions,
    cancel: &CancellationToken,
) -> Result<Resolution, ResolveError> {
    let reader = CachingReader {
        inner: reader,
        cache,
        scope,
    };

    let model = ModelBuilder::new(&reader)
        .max_parent_depth(options.max_parent_depth)
        .build(root, env)
        .map_err(|e| ResolveError::from_model_error(e, vec![root.coordinate()]))?;
    log::debug!("Effective model of {} is ready", model.coordinate());

    let dependency_env = if options.inherit_environment {
        env.clone()
    } else {
        Environment::empty()
    };
    let session = Session {
        reader,
        env: Arc::new(dependency_env),
        max_parent_depth: options.max_parent_depth,
    };

    let pool = thread_pool(options.max_concurrent_reads);
    let mut diagnostics = Diagnostics::new();
    let graph = {
        let _span = tracing::debug_span!("build_graph").entered();
        build_graph(&model, &session, pool.as_ref(), cancel, &mut diagnostics)?
    };
    cancel.check()?;

    let mut dependencies = {
        let _span = tracing::debug_span!("resolve_conflicts").entered();
        resolve_conflicts(&graph)
    };
    for diagnostic in diagnostics.iter() {
        log::debug!("{}", diagnostic);
    }
    dependencies.set_diagnostics(diagnostics.into_vec());

    if dependencies.has_errors() {
        match options.conflict_policy {
            ConflictPolicy::Fail => {
                return Err(ResolveError::VersionConflict {
                    conflicts: dependencies.errors().cloned().collect(),
                });
            }
            ConflictPolicy::Warn => {
                for conflict in dependencies.errors() {
                    log::warn!("{}", conflict);
                }
            }
        }
    }

    Ok(Resolution {
        model,
        graph,
        dependencies,
    })
}

#[cfg(test)]
mod test {
    use expect_test::expect;
    use mvnutil::{
        dependency::Dependency,
        model::{Activation, ActivationProperty, Profile},
    };
    use test_log::test;

    use super::*;
    use crate::{
        cache::MemoryCacheStore, conflict::ConflictReason, options::ResolveOptionsBuilder,
        reader::MemoryRepository,
    };

    fn dep(a: &str, v: &str) -> Dependency {
        Dependency::new("g", a).with_version(v)
    }

    fn root(deps: impl IntoIterator<Item = Dependency>) -> Model {
        let mut m = Model::new("g", "app", "1");
        m.base.dependencies = deps.into_iter().collect();
        m
    }

    fn sequential() -> ResolveOptions {
        ResolveOptionsBuilder::default()
            .max_concurrent_reads(1usize)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_small_tree() {
        let mut repo = MemoryRepository::new();
        repo.add_artifact("g", "a", "1", [dep("c", "1.0")])
            .add_artifact("g", "b", "1", [dep("c", "2.0")])
            .add_artifact("g", "c", "1.0", [])
            .add_artifact("g", "c", "2.0", []);

        let cache = ResolutionCache::new();
        let resolution = resolve(
            &root([dep("a", "1"), dep("b", "1")]),
            &repo,
            &Environment::empty(),
            &cache,
            &sequential(),
        )
        .unwrap();
        expect![[r#"
            g:a:1 (compile)
            g:b:1 (compile)
            g:c:1.0 (compile)
            note: g:c:1.0 is declared before g:c:2.0 (at g:app:1 -> g:b:1 -> g:c:2.0)
        "#]]
        .assert_eq(&resolution.dependencies.to_string());
        assert_eq!(resolution.graph.len(), 5);
    }

    #[test]
    fn test_conflict_policy() {
        let mut repo = MemoryRepository::new();
        repo.add_artifact("g", "a", "1", [dep("c", "[2.0,3.0)")])
            .add_artifact("g", "b", "1", [dep("c", "[1.0,2.0)")])
            .add_artifact("g", "c", "1.0", [])
            .add_artifact("g", "c", "2.0", []);
        let app = root([dep("a", "1"), dep("b", "1")]);
        let cache = ResolutionCache::new();

        let e = resolve(&app, &repo, &Environment::empty(), &cache, &sequential()).unwrap_err();
        let ResolveError::VersionConflict { conflicts } = e else {
            panic!("expected a version conflict, got {e:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].reason, ConflictReason::DisjointRanges);

        let warn = ResolveOptions {
            conflict_policy: ConflictPolicy::Warn,
            ..sequential()
        };
        let resolution = resolve(&app, &repo, &Environment::empty(), &cache, &warn).unwrap();
        assert!(resolution.dependencies.has_errors());
        assert_eq!(
            resolution.dependencies.get(&VersionlessKey::new("g", "c")).unwrap().coordinate.version,
            "2.0"
        );
    }

    #[test]
    fn test_cache_is_shared_across_calls() {
        let mut repo = MemoryRepository::new();
        repo.add_artifact("g", "a", "1", [dep("b", "[1,2)")])
            .add_artifact("g", "b", "1.0", [])
            .add_artifact("g", "b", "1.5", []);
        let app = root([dep("a", "1")]);
        let cache = ResolutionCache::new();

        let first = resolve(&app, &repo, &Environment::empty(), &cache, &sequential()).unwrap();
        let reads = repo.read_count();
        assert_eq!(reads, 2);
        assert_eq!(repo.version_lookup_count(), 1);

        let second = resolve(&app, &repo, &Environment::empty(), &cache, &sequential()).unwrap();
        assert_eq!(first.dependencies, second.dependencies);
        assert_eq!(repo.read_count(), reads);
        assert_eq!(repo.version_lookup_count(), 1);

        assert_eq!(first, second);

        let stats = cache.stats();
        assert_eq!(stats.get(CacheRetention::Persistent).misses, 2);
        assert_eq!(stats.get(CacheRetention::Persistent).hits, 0);
        // the listing of b and the resolution, which the second call reused
        assert_eq!(stats.get(CacheRetention::SessionScoped).misses, 2);
        assert_eq!(stats.get(CacheRetention::SessionScoped).hits, 1);
    }

    #[test]
    fn test_whole_resolution_is_cached() {
        let mut repo = MemoryRepository::new();
        repo.add_artifact("g", "a", "1", [dep("b", "1")])
            .add_artifact("g", "b", "1", []);
        let app = root([dep("a", "1")]);
        let cache = ResolutionCache::new();
        let empty = MemoryRepository::new();

        let first = resolve(&app, &repo, &Environment::empty(), &cache, &sequential()).unwrap();
        let again = resolve(&app, &empty, &Environment::empty(), &cache, &sequential()).unwrap();
        assert_eq!(first, again);
        assert_eq!(empty.read_count(), 0);

        let sessions = || cache.stats().get(CacheRetention::SessionScoped);
        assert_eq!((sessions().hits, sessions().misses), (1, 1));

        // other options or another environment are another resolution,
        // computed from the reads already cached
        let warn = ResolveOptions {
            conflict_policy: ConflictPolicy::Warn,
            ..sequential()
        };
        resolve(&app, &empty, &Environment::empty(), &cache, &warn).unwrap();
        let env = Environment::empty().with_user_property("x", "1");
        resolve(&app, &empty, &env, &cache, &sequential()).unwrap();
        assert_eq!((sessions().hits, sessions().misses), (1, 3));
        assert_eq!(repo.read_count(), 2);

        cache.clear_session();
        let e = resolve(&app, &empty, &Environment::empty(), &cache, &sequential()).unwrap_err();
        assert!(matches!(e, ResolveError::MetadataUnavailable { .. }), "{e:?}");
    }

    /// Cancels `cancel` once `inner` has served `after` reads.
    struct CancellingReader<'a> {
        inner: &'a MemoryRepository,
        cancel: CancellationToken,
        after: usize,
    }

    impl MetadataReader for CancellingReader<'_> {
        fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
            let model = self.inner.read(coordinate);
            if self.inner.read_count() == self.after {
                self.cancel.cancel();
            }
            model
        }

        fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
            self.inner.available_versions(key)
        }
    }

    #[test]
    fn test_cancelled_mid_flight() {
        let mut repo = MemoryRepository::new();
        repo.add_artifact("g", "a", "1", [dep("b", "1")])
            .add_artifact("g", "b", "1", [dep("c", "1")])
            .add_artifact("g", "c", "1", []);
        let app = root([dep("a", "1")]);
        let cache = ResolutionCache::new();
        let cancel = CancellationToken::new();
        let reader = CancellingReader {
            inner: &repo,
            cancel: cancel.clone(),
            after: 2,
        };

        let e = resolve_with_cancel(
            &app,
            &reader,
            &Environment::empty(),
            &cache,
            &sequential(),
            &cancel,
        )
        .unwrap_err();
        assert!(e.is_cancelled(), "{e:?}");
        assert!(cancel.is_cancelled());
        // c was never read
        assert_eq!(repo.read_count(), 2);

        // the cancelled outcome is not kept, and completed reads are reused
        let resolution =
            resolve(&app, &repo, &Environment::empty(), &cache, &sequential()).unwrap();
        assert_eq!(resolution.dependencies.len(), 3);
        assert_eq!(repo.read_count(), 3);
    }

    #[test]
    fn test_persistent_store_outlives_the_cache() {
        let mut repo = MemoryRepository::new();
        repo.add_artifact("g", "a", "1", [dep("b", "1")])
            .add_artifact("g", "b", "1", []);
        let app = root([dep("a", "1")]);
        let store = Arc::new(MemoryCacheStore::new());

        let first = ResolutionCache::with_store(store.clone());
        resolve(&app, &repo, &Environment::empty(), &first, &sequential()).unwrap();
        assert_eq!(repo.read_count(), 2);
        assert_eq!(first.stats().store_saves(), 2);

        let second = ResolutionCache::with_store(store);
        let resolution =
            resolve(&app, &repo, &Environment::empty(), &second, &sequential()).unwrap();
        assert_eq!(repo.read_count(), 2);
        assert_eq!(second.stats().store_loads(), 2);
        assert!(resolution.dependencies.contains(&VersionlessKey::new("g", "b")));
    }

    #[test]
    fn test_dependency_profiles_see_empty_environment() {
        let mut lib = Model::new("g", "lib", "1");
        let mut profile = Profile::new("extra");
        profile.activation = Some(Activation {
            property: Some(ActivationProperty {
                name: "with-extra".into(),
                value: None,
            }),
            ..Default::default()
        });
        profile.base.dependencies.push(dep("extra", "1"));
        lib.profiles.push(profile);

        let mut repo = MemoryRepository::new();
        repo.add_model(lib).add_artifact("g", "extra", "1", []);
        let app = root([dep("lib", "1")]);
        let env = Environment::empty().with_user_property("with-extra", "true");
        let cache = ResolutionCache::new();

        let plain = resolve(&app, &repo, &env, &cache, &sequential()).unwrap();
        assert!(!plain.dependencies.contains(&VersionlessKey::new("g", "extra")));

        let inherit = ResolveOptions {
            inherit_environment: true,
            ..sequential()
        };
        let inherited = resolve(&app, &repo, &env, &cache, &inherit).unwrap();
        assert!(inherited.dependencies.contains(&VersionlessKey::new("g", "extra")));
    }

    #[test]
    fn test_root_model_errors_carry_the_root() {
        let mut app = root([]);
        app.group_id = None;
        let e = resolve(
            &app,
            &MemoryRepository::new(),
            &Environment::empty(),
            &ResolutionCache::new(),
            &sequential(),
        )
        .unwrap_err();
        assert!(matches!(e, ResolveError::InvalidModel { .. }), "{e:?}");
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let e = resolve_with_cancel(
            &root([dep("a", "1")]),
            &MemoryRepository::new(),
            &Environment::empty(),
            &ResolutionCache::new(),
            &ResolveOptions::default(),
            &cancel,
        )
        .unwrap_err();
        assert!(e.is_cancelled());
    }

    #[test]
    fn test_pool_matches_sequential() {
        let mut repo = MemoryRepository::new();
        for i in 0..20 {
            let name = format!("m{}", i);
            let next = format!("m{}", (i * 7 + 3) % 20);
            repo.add_artifact("g", &name, "1", [dep(&next, "1"), dep("leaf", "1")]);
        }
        repo.add_artifact("g", "leaf", "1", []);
        let app = root((0..5).map(|i| dep(&format!("m{}", i * 3), "1")));

        let seq = resolve(&app, &repo, &Environment::empty(), &ResolutionCache::new(), &sequential())
            .unwrap();
        let par = resolve(
            &app,
            &repo,
            &Environment::empty(),
            &ResolutionCache::new(),
            &ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(seq.dependencies, par.dependencies);
        assert_eq!(seq.graph.to_string(), par.graph.to_string());
    }
}
