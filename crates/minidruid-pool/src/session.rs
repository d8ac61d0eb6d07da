//! Session factory settings
//!
//! The settings an ORM layer reads to build its session factory: where the
//! mapper files live and how column names map to properties.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use minidruid_core::{MiniDruidError, Result};
use serde::{Deserialize, Serialize};

/// Mapper location used when none is configured
pub const DEFAULT_MAPPER_LOCATION: &str = "classpath*:sqlmap/*Mapper.xml";

const LOCATION_PREFIXES: [&str; 3] = ["classpath*:", "classpath:", "file:"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFactoryConfig {
    mapper_locations: String,
    map_underscore_to_camel_case: bool,
}

impl Default for SessionFactoryConfig {
    fn default() -> Self {
        Self {
            mapper_locations: DEFAULT_MAPPER_LOCATION.to_string(),
            map_underscore_to_camel_case: true,
        }
    }
}

impl SessionFactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the mapper locations; blank values keep the default
    pub fn with_mapper_locations(mut self, locations: impl Into<String>) -> Self {
        let locations = locations.into();
        if !locations.trim().is_empty() {
            self.mapper_locations = locations;
        }
        self
    }

    pub fn mapper_locations(&self) -> &str {
        &self.mapper_locations
    }

    pub fn map_underscore_to_camel_case(&self) -> bool {
        self.map_underscore_to_camel_case
    }

    /// The configured locations as plain glob patterns
    ///
    /// Locations are separated by `,` or `;`; `classpath*:`, `classpath:`
    /// and `file:` prefixes and leading slashes are dropped.
    pub fn mapper_patterns(&self) -> Vec<String> {
        self.mapper_locations
            .split([',', ';'])
            .map(str::trim)
            .filter(|location| !location.is_empty())
            .map(|location| {
                let stripped = LOCATION_PREFIXES
                    .iter()
                    .find_map(|prefix| location.strip_prefix(prefix))
                    .unwrap_or(location);
                stripped.trim_start_matches('/').to_string()
            })
            .collect()
    }

    /// Find the mapper files under `root`, sorted
    pub fn resolve_mapper_files(&self, root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let root = root.as_ref();
        let globs = self.build_globset()?;

        let mut found = BTreeSet::new();
        for entry in WalkBuilder::new(root).standard_filters(false).build() {
            let entry = entry.map_err(|e| MiniDruidError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if globs.is_match(relative) {
                found.insert(entry.path().to_path_buf());
            }
        }

        tracing::debug!(
            root = %root.display(),
            locations = %self.mapper_locations,
            count = found.len(),
            "resolved mapper files"
        );
        Ok(found.into_iter().collect())
    }

    fn build_globset(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in self.mapper_patterns() {
            let glob = GlobBuilder::new(&pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    MiniDruidError::Config(format!("invalid mapper location '{}': {}", pattern, e))
                })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| MiniDruidError::Config(format!("invalid mapper locations: {}", e)))
    }

    /// Map a column name to a property name
    ///
    /// `user_name` becomes `userName` when underscore mapping is on;
    /// otherwise the column name is returned unchanged.
    pub fn column_to_property(&self, column: &str) -> String {
        if !self.map_underscore_to_camel_case {
            return column.to_string();
        }

        let mut property = String::with_capacity(column.len());
        let mut upper_next = false;
        for c in column.chars() {
            if c == '_' {
                upper_next = !property.is_empty();
                continue;
            }
            if upper_next {
                property.extend(c.to_uppercase());
                upper_next = false;
            } else {
                property.extend(c.to_lowercase());
            }
        }
        property
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_locations() {
        let config = SessionFactoryConfig::new();
        assert_eq!(config.mapper_locations(), DEFAULT_MAPPER_LOCATION);
        assert!(config.map_underscore_to_camel_case());
        assert_eq!(config.mapper_patterns(), vec!["sqlmap/*Mapper.xml"]);
    }

    #[test]
    fn test_blank_override_keeps_default() {
        let config = SessionFactoryConfig::new().with_mapper_locations("  ");
        assert_eq!(config.mapper_locations(), DEFAULT_MAPPER_LOCATION);
    }

    #[test]
    fn test_multiple_locations() {
        let config = SessionFactoryConfig::new()
            .with_mapper_locations("classpath:mapper/**/*.xml; file:/extra/*Mapper.xml");
        assert_eq!(
            config.mapper_patterns(),
            vec!["mapper/**/*.xml", "extra/*Mapper.xml"]
        );
    }

    #[test]
    fn test_resolve_mapper_files() {
        let dir = tempfile::tempdir().unwrap();
        let sqlmap = dir.path().join("sqlmap");
        fs::create_dir_all(sqlmap.join("nested")).unwrap();
        fs::write(sqlmap.join("UserMapper.xml"), "<mapper/>").unwrap();
        fs::write(sqlmap.join("OrderMapper.xml"), "<mapper/>").unwrap();
        fs::write(sqlmap.join("notes.txt"), "").unwrap();
        fs::write(sqlmap.join("nested/DeepMapper.xml"), "<mapper/>").unwrap();

        let files = SessionFactoryConfig::new()
            .resolve_mapper_files(dir.path())
            .unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        // `*` does not cross directories
        assert_eq!(names, vec!["OrderMapper.xml", "UserMapper.xml"]);
    }

    #[test]
    fn test_resolve_recursive_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mapper/a/b")).unwrap();
        fs::write(dir.path().join("mapper/a/b/X.xml"), "").unwrap();
        fs::write(dir.path().join("mapper/Y.xml"), "").unwrap();

        let files = SessionFactoryConfig::new()
            .with_mapper_locations("classpath*:mapper/**/*.xml")
            .resolve_mapper_files(dir.path())
            .unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionFactoryConfig::new()
            .with_mapper_locations("sqlmap/[*.xml")
            .resolve_mapper_files(dir.path())
            .unwrap_err();
        assert!(matches!(err, MiniDruidError::Config(_)));
    }

    #[test]
    fn test_column_to_property() {
        let config = SessionFactoryConfig::new();
        assert_eq!(config.column_to_property("user_name"), "userName");
        assert_eq!(config.column_to_property("CREATED_AT"), "createdAt");
        assert_eq!(config.column_to_property("_id"), "id");
        assert_eq!(config.column_to_property("id"), "id");
    }
}
