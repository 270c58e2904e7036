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

//! Access to repository metadata.

pub mod local;
pub mod memory;

use std::sync::Arc;

use mvnutil::{
    coordinate::{Coordinate, VersionlessKey},
    model::Model,
    version::Version,
};

pub use local::LocalRepository;
pub use memory::MemoryRepository;

use crate::error::MetadataError;

/// Reads raw (not yet merged) models from some repository.
///
/// Implementations are shared across the worker threads of one resolution
/// and must tolerate concurrent calls.
pub trait MetadataReader: Send + Sync {
    /// Reads the model of an exact coordinate.
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError>;

    /// Lists every known version of an artifact, lowest first.
    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError>;
}

impl<R> MetadataReader for &R
where
    R: MetadataReader + ?Sized,
{
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
        (**self).read(coordinate)
    }

    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
        (**self).available_versions(key)
    }
}

impl<R> MetadataReader for Arc<R>
where
    R: MetadataReader + ?Sized,
{
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
        (**self).read(coordinate)
    }

    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
        (**self).available_versions(key)
    }
}

/// Tries each reader in turn, moving on when an artifact is not found.
pub struct ReaderChain {
    readers: Vec<Box<dyn MetadataReader>>,
}

impl ReaderChain {
    pub fn new(readers: Vec<Box<dyn MetadataReader>>) -> Self {
        ReaderChain { readers }
    }
}

impl MetadataReader for ReaderChain {
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
        let mut last = MetadataError::not_found(coordinate);
        for reader in &self.readers {
            match reader.read(coordinate) {
                Ok(model) => return Ok(model),
                Err(e) if e.kind == crate::error::MetadataErrorKind::NotFound => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
        let mut versions: Vec<Version> = Vec::new();
        let mut found = false;
        for reader in &self.readers {
            match reader.available_versions(key) {
                Ok(vs) => {
                    found = true;
                    for v in vs {
                        if !versions.contains(&v) {
                            versions.push(v);
                        }
                    }
                }
                Err(e) if e.kind == crate::error::MetadataErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        if !found {
            return Err(MetadataError::not_found(key));
        }
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_chain_falls_through_not_found() {
        let mut first = MemoryRepository::new();
        first.add_model(Model::new("g", "a", "1.0"));
        let mut second = MemoryRepository::new();
        second
            .add_model(Model::new("g", "a", "2.0"))
            .add_model(Model::new("g", "b", "1.0"));

        let chain = ReaderChain::new(vec![Box::new(first), Box::new(second)]);
        assert!(chain.read(&Coordinate::new("g", "b", "1.0")).is_ok());
        assert!(chain.read(&Coordinate::new("g", "c", "1.0")).is_err());

        let versions = chain
            .available_versions(&VersionlessKey::new("g", "a"))
            .unwrap();
        assert_eq!(versions, vec![Version::new("1.0"), Version::new("2.0")]);
    }

    #[test]
    fn test_chain_stops_at_transient() {
        let mut first = MemoryRepository::new();
        first.fail_with(
            Coordinate::new("g", "b", "1.0"),
            crate::error::MetadataErrorKind::Transient,
        );
        let mut second = MemoryRepository::new();
        second.add_model(Model::new("g", "b", "1.0"));

        let chain = ReaderChain::new(vec![Box::new(first), Box::new(second)]);
        let e = chain.read(&Coordinate::new("g", "b", "1.0")).unwrap_err();
        assert!(e.is_transient());
    }
}
