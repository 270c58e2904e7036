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

//! Dependency declarations and their scopes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, Exclusion, VersionlessKey, default_type, is_default_type};
use crate::version::{RangeSyntaxError, VersionRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Compile,
    Runtime,
    Provided,
    Test,
    System,
    /// Only meaningful on `pom` entries in dependency management.
    Import,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Compile => "compile",
            Scope::Runtime => "runtime",
            Scope::Provided => "provided",
            Scope::Test => "test",
            Scope::System => "system",
            Scope::Import => "import",
        }
    }

    /// Whether dependencies in this scope pull in their own dependencies.
    pub fn propagates(&self) -> bool {
        matches!(self, Scope::Compile | Scope::Runtime)
    }

    /// Scope of a dependency declared with `child` scope by a node in scope
    /// `self`. `None` means the declaration is not transitive.
    pub fn transitive(&self, child: Scope) -> Option<Scope> {
        match (self, child) {
            (Scope::Compile, Scope::Compile) => Some(Scope::Compile),
            (Scope::Compile, Scope::Runtime) => Some(Scope::Runtime),
            (Scope::Runtime, Scope::Compile | Scope::Runtime) => Some(Scope::Runtime),
            _ => None,
        }
    }

    /// compile > runtime > provided > system > test
    pub fn width(&self) -> u8 {
        match self {
            Scope::Compile => 4,
            Scope::Runtime => 3,
            Scope::Provided => 2,
            Scope::System => 1,
            Scope::Test | Scope::Import => 0,
        }
    }

    pub fn wider(self, other: Scope) -> Scope {
        if other.width() > self.width() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Scope::Compile),
            "runtime" => Ok(Scope::Runtime),
            "provided" => Ok(Scope::Provided),
            "test" => Ok(Scope::Test),
            "system" => Ok(Scope::System),
            "import" => Ok(Scope::Import),
            _ => Err(format!("unknown scope `{}`", s)),
        }
    }
}

/// A declared dependency. Fields left unset may be filled in from dependency
/// management.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,

    /// A soft version (`1.5`) or a range (`[1.0,2.0)`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(
        rename = "type",
        default = "default_type",
        skip_serializing_if = "is_default_type"
    )]
    pub artifact_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub classifier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<Exclusion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_path: Option<String>,
}

impl Dependency {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Dependency {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: None,
            artifact_type: default_type(),
            classifier: String::new(),
            scope: None,
            optional: None,
            exclusions: Vec::new(),
            system_path: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = artifact_type.into();
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn exclude(mut self, group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        self.exclusions.push(Exclusion::new(group_id, artifact_id));
        self
    }

    pub fn key(&self) -> VersionlessKey {
        VersionlessKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            artifact_type: self.artifact_type.clone(),
            classifier: self.classifier.clone(),
        }
    }

    pub fn ga(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    pub fn effective_scope(&self) -> Scope {
        self.scope.unwrap_or(Scope::Compile)
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Parses the version requirement, if any.
    pub fn version_range(&self) -> Option<Result<VersionRange, RangeSyntaxError>> {
        self.version.as_deref().map(VersionRange::parse)
    }

    pub fn to_coordinate(&self, version: impl Into<String>) -> Coordinate {
        self.key().with_version(version)
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())?;
        if let Some(v) = &self.version {
            write!(f, ":{}", v)?;
        }
        if let Some(scope) = self.scope {
            write!(f, " ({})", scope)?;
        }
        Ok(())
    }
}
