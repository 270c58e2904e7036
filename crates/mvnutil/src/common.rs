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

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::bail;

use crate::model::Model;

pub const MODEL_JSON: &str = "pom.json";

#[derive(Debug, thiserror::Error)]
#[error("failed to load `{}`", path.display())]
pub struct ModelJsonFormatError {
    pub path: Box<Path>,
    #[source]
    pub kind: ModelJsonFormatErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelJsonFormatErrorKind {
    #[error("I/O error")]
    IO(#[from] std::io::Error),
    #[error("Parse error")]
    Parse(#[from] serde_json_lenient::Error),
    #[error("`artifactId` should not be empty")]
    EmptyArtifactId,
}

impl ModelJsonFormatError {
    pub fn is_not_found(&self) -> bool {
        matches!(&self.kind, ModelJsonFormatErrorKind::IO(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Parses a model from JSON text.
pub fn parse_model_json(text: &str) -> Result<Model, ModelJsonFormatErrorKind> {
    let model: Model = serde_json_lenient::from_str(text)?;
    validate(model)
}

fn validate(model: Model) -> Result<Model, ModelJsonFormatErrorKind> {
    if model.artifact_id.is_empty() {
        return Err(ModelJsonFormatErrorKind::EmptyArtifactId);
    }
    Ok(model)
}

pub fn read_model_from_json(path: &Path) -> Result<Model, ModelJsonFormatError> {
    let wrap = |kind: ModelJsonFormatErrorKind| ModelJsonFormatError {
        path: path.into(),
        kind,
    };
    let file = File::open(path).map_err(|e| wrap(e.into()))?;
    let reader = BufReader::new(file);
    let model: Model = serde_json_lenient::from_reader(reader).map_err(|e| wrap(e.into()))?;
    validate(model).map_err(wrap)
}

pub fn write_model_json_to_file(m: &Model, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json_lenient::to_writer_pretty(&mut writer, &m)?;
    Ok(())
}

pub fn read_model_desc_file_in_dir(dir: &Path) -> anyhow::Result<Model> {
    if !dir.join(MODEL_JSON).exists() {
        bail!("`{:?}` does not exist", dir.join(MODEL_JSON));
    }
    Ok(read_model_from_json(&dir.join(MODEL_JSON))?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_model_json() {
        let model = parse_model_json(
            r#"{
                "groupId": "g",
                "artifactId": "a",
                "version": "1"
            }"#,
        )
        .unwrap();
        assert_eq!(model.artifact_id, "a");

        assert!(matches!(
            parse_model_json(r#"{ "artifactId": "" }"#),
            Err(ModelJsonFormatErrorKind::EmptyArtifactId)
        ));
        assert!(matches!(
            parse_model_json("{"),
            Err(ModelJsonFormatErrorKind::Parse(_))
        ));
    }

    #[test]
    fn test_write_then_read_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new("g", "a", "1.0");
        model.base.properties.insert("k".into(), "v".into());
        write_model_json_to_file(&model, &dir.path().join(MODEL_JSON)).unwrap();
        let read = read_model_desc_file_in_dir(dir.path()).unwrap();
        assert_eq!(read, model);

        let missing = read_model_from_json(&dir.path().join("nope.json")).unwrap_err();
        assert!(missing.is_not_found());
    }
}
