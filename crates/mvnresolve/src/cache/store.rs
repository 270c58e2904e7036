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

//! Backing stores for persistent cache entries.

use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

/// Text storage keyed by a request's persistent key.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn store(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).load(key)
    }

    fn store(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).store(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// One JSON file per entry, named by the SHA-256 of its key.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCacheStore { dir: dir.into() }
    }

    /// The store under the user's mvnkit cache directory.
    pub fn default_location() -> anyhow::Result<Self> {
        Ok(Self::new(mvnutil::mvn_dir::cache_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.entry_path(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read `{}`", path.display())),
        }
    }

    fn store(&self, key: &str, value: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create `{}`", self.dir.display()))?;
        let path = self.entry_path(key);
        // concurrent writers of the same key each replace the file whole
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path)
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        Ok(())
    }
}
