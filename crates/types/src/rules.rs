use crate::application::{ApplicationRules, ProcessRules};
use crate::process::Namespec;

/// Interface the Process/Application model (C3) uses to load rules at
/// application/process creation time, without depending on how those
/// rules are actually stored (spec.md §4.3, SPEC_FULL.md §4.3).
pub trait RulesSource: Send + Sync {
    fn rules_for_application(&self, application_name: &str) -> ApplicationRules;
    fn rules_for_process(&self, namespec: &Namespec) -> ProcessRules;
}

/// A `RulesSource` that returns defaults for everything; used by tests and
/// as a safe fallback when no `rules_file` is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl RulesSource for NoRules {
    fn rules_for_application(&self, _application_name: &str) -> ApplicationRules {
        ApplicationRules::default()
    }

    fn rules_for_process(&self, _namespec: &Namespec) -> ProcessRules {
        ProcessRules::default()
    }
}
