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

mod util;

use mvnresolve::{
    LocalRepository, ResolutionCache, ResolveOptions, cache::FileCacheStore, resolve,
};
use mvnutil::{
    common::{read_model_from_json, write_model_json_to_file},
    dependency::Dependency,
    environment::Environment,
    model::Model,
};
use test_log::test;
use util::{parent, pom, versions};

fn write(repo: &LocalRepository, model: &Model) {
    write_model_json_to_file(model, &repo.model_path(&model.coordinate())).unwrap();
}

#[test]
fn resolve_from_disk_then_from_persistent_cache() {
    let dir = tempfile::tempdir().unwrap();
    let repo_dir = dir.path().join("repository");
    let cache_dir = dir.path().join("cache");
    let repo = LocalRepository::new(&repo_dir);

    let mut base = pom("org.example", "base", "3");
    base.base.properties.insert("lib.version".into(), "2.0".into());
    base.base.dependency_management =
        vec![Dependency::new("org.example", "lib").with_version("${lib.version}")];
    write(&repo, &base);

    let mut lib = Model::new("org.example", "lib", "2.0");
    lib.base.dependencies = vec![Dependency::new("org.example", "util").with_version("1.0")];
    write(&repo, &lib);
    write(&repo, &Model::new("org.example", "util", "1.0"));

    let mut project = Model {
        artifact_id: "app".into(),
        parent: parent("org.example", "base", "3"),
        ..Default::default()
    };
    project.base.dependencies = vec![Dependency::new("org.example", "lib")];
    let project_file = dir.path().join("project").join("model.json");
    write_model_json_to_file(&project, &project_file).unwrap();
    let project = read_model_from_json(&project_file).unwrap();

    let options = ResolveOptions::default();
    let cache = ResolutionCache::with_store(FileCacheStore::new(&cache_dir));
    let first = resolve(&project, &repo, &Environment::empty(), &cache, &options).unwrap();
    assert_eq!(first.model.coordinate().to_string(), "org.example:app:3");
    assert_eq!(versions(&first), vec!["lib:2.0", "util:1.0"]);
    assert_eq!(cache.stats().store_saves(), 3);

    // the repository is gone, every model now comes from the store
    std::fs::remove_dir_all(&repo_dir).unwrap();
    let cache = ResolutionCache::with_store(FileCacheStore::new(&cache_dir));
    let second = resolve(&project, &repo, &Environment::empty(), &cache, &options).unwrap();
    assert_eq!(first.dependencies, second.dependencies);
    assert_eq!(cache.stats().store_loads(), 3);
}

#[test]
fn missing_model_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let repo = LocalRepository::new(dir.path());
    let mut a = Model::new("org.example", "a", "1");
    a.base.dependencies = vec![Dependency::new("org.example", "gone").with_version("1")];
    write(&repo, &a);

    let mut project = Model::new("org.example", "app", "1");
    project.base.dependencies = vec![Dependency::new("org.example", "a").with_version("1")];
    let e = resolve(
        &project,
        &repo,
        &Environment::empty(),
        &ResolutionCache::new(),
        &ResolveOptions::default(),
    )
    .unwrap_err();
    expect_test::expect!["metadata of org.example:gone:1 is unavailable (not found): no such artifact, required at org.example:app:1 -> org.example:a:1 -> org.example:gone:1"]
        .assert_eq(&e.to_string());
}
