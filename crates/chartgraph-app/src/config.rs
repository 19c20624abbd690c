use crate::error::AppError;
use chartgraph_graph::{NavigatorSettings, ResolveSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables of a [`crate::Diagram`], stored as JSON.
///
/// Every field has a default, so a partial file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    /// Half-size of the box a point query is widened to.
    pub hit_radius: f32,
    /// Distance from a wall that still counts as touching it.
    pub wall_radius: f32,
    pub spacing: f32,
    pub rim_offset: f32,
    pub start_offset: f32,
    pub navigator: NavigatorSettings,
    /// Maximum number of undo steps kept; unbounded when `None`.
    pub history_limit: Option<usize>,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        let resolve = ResolveSettings::default();
        Self {
            hit_radius: 1.0,
            wall_radius: 8.0,
            spacing: resolve.spacing,
            rim_offset: resolve.rim_offset,
            start_offset: resolve.start_offset,
            navigator: NavigatorSettings::default(),
            history_limit: None,
        }
    }
}

impl DiagramConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "diagram config loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn resolve_settings(&self) -> ResolveSettings {
        ResolveSettings {
            spacing: self.spacing,
            rim_offset: self.rim_offset,
            start_offset: self.start_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartgraph_core::Vec2;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagram.json");
        let mut config = DiagramConfig {
            spacing: 14.0,
            history_limit: Some(50),
            ..DiagramConfig::default()
        };
        config.navigator.default_open_size = Vec2::new(1024.0, 768.0);
        config.save(&path).unwrap();

        let loaded = DiagramConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.resolve_settings().spacing, 14.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "wall_radius": 4.0 }"#).unwrap();

        let loaded = DiagramConfig::load(&path).unwrap();
        assert_eq!(loaded.wall_radius, 4.0);
        assert_eq!(loaded.hit_radius, 1.0);
        assert_eq!(loaded.rim_offset, 7.5);
        assert_eq!(loaded.history_limit, None);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = DiagramConfig::load(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(AppError::Io(_))));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(DiagramConfig::load(&path), Err(AppError::Config(_))));
    }
}
