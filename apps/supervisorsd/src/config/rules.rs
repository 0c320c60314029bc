use std::path::PathBuf;

use serde::Deserialize;

/// Path consumed by the rules collaborator at startup (spec.md §6:
/// `rules_file`). Absent means every application/process falls back to
/// the Rules Loader's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}
