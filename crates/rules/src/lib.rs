//! TOML rules file loader (C10): the concrete [`RulesSource`] that reads
//! `application_name -> rules` and `group:name -> rules` tables from a
//! file on disk, the way [`supervisors_types::NoRules`] stands in for it
//! in tests.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use supervisors_types::{ApplicationRules, Namespec, ProcessRules, RulesSource, RunningFailureStrategy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read or parse rules file: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize)]
struct ApplicationRulesEntry {
    #[serde(default)]
    start_sequence: u32,
    #[serde(default)]
    running_failure_strategy: RunningFailureStrategy,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessRulesEntry {
    #[serde(default)]
    extra_args: String,
}

#[derive(Debug, Deserialize, Default)]
struct RulesFile {
    #[serde(default)]
    application: HashMap<String, ApplicationRulesEntry>,
    #[serde(default)]
    process: HashMap<String, ProcessRulesEntry>,
}

/// Rules loaded once from a TOML file and held in memory for the lifetime
/// of the run (spec.md §4.3: "loaded once, at creation time").
#[derive(Debug)]
pub struct FileRules {
    file: RulesFile,
}

impl FileRules {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let built = config::Config::builder()
            .add_source(config::File::from(path.as_ref().to_path_buf()))
            .build()?;

        let file: RulesFile = built.try_deserialize().unwrap_or_default();
        Ok(Self { file })
    }
}

impl RulesSource for FileRules {
    fn rules_for_application(&self, name: &str) -> ApplicationRules {
        match self.file.application.get(name) {
            Some(entry) => ApplicationRules {
                start_sequence: entry.start_sequence,
                running_failure_strategy: entry.running_failure_strategy,
            },
            None => ApplicationRules {
                start_sequence: 0,
                running_failure_strategy: RunningFailureStrategy::Continue,
            },
        }
    }

    fn rules_for_process(&self, namespec: &Namespec) -> ProcessRules {
        match self.file.process.get(&namespec.to_string()) {
            Some(entry) => ProcessRules {
                extra_args: entry.extra_args.clone(),
            },
            None => ProcessRules::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_application_and_process_rules_from_toml() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
            [application.my_app]
            start_sequence = 3
            running_failure_strategy = "restart_process"

            [process."my_app:worker"]
            extra_args = "--verbose"
            "#
        )
        .unwrap();

        let rules = FileRules::from_path(file.path()).unwrap();

        let app_rules = rules.rules_for_application("my_app");
        assert_eq!(app_rules.start_sequence, 3);
        assert_eq!(
            app_rules.running_failure_strategy,
            RunningFailureStrategy::RestartProcess
        );

        let process_rules = rules.rules_for_process(&Namespec::new("my_app", "worker"));
        assert_eq!(process_rules.extra_args, "--verbose");
    }

    #[test]
    fn falls_back_to_defaults_for_unlisted_application() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[application.known]\nstart_sequence = 1\n").unwrap();

        let rules = FileRules::from_path(file.path()).unwrap();
        let defaults = rules.rules_for_application("unknown");
        assert_eq!(defaults.start_sequence, 0);
        assert_eq!(
            defaults.running_failure_strategy,
            RunningFailureStrategy::Continue
        );
    }
}
