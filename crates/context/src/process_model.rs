use std::collections::BTreeMap;
use std::sync::Arc;

use supervisors_types::{
    ApplicationStatus, LocalProcessInfo, Namespec, PeerAddress, ProcessEvent, ProcessState,
    ProcessStatus, RulesSource,
};

/// The process/application model (C3): per-process observed state across
/// peers, and the conflict predicate.
pub struct ProcessModel {
    applications: BTreeMap<String, ApplicationStatus>,
    rules: Arc<dyn RulesSource>,
}

impl ProcessModel {
    pub fn new(rules: Arc<dyn RulesSource>) -> Self {
        Self {
            applications: BTreeMap::new(),
            rules,
        }
    }

    pub fn applications(&self) -> impl Iterator<Item = &ApplicationStatus> {
        self.applications.values()
    }

    pub fn application(&self, name: &str) -> Option<&ApplicationStatus> {
        self.applications.get(name)
    }

    /// Returns the named application, creating and loading its rules from
    /// the rules collaborator if this is the first time it's seen.
    pub fn setdefault_application(&mut self, name: &str) -> &mut ApplicationStatus {
        if !self.applications.contains_key(name) {
            let rules = self.rules.rules_for_application(name);
            self.applications
                .insert(name.to_owned(), ApplicationStatus::new(name, rules));
        }

        self.applications.get_mut(name).expect("just inserted")
    }

    /// Returns the named process within `application_name`, creating it
    /// (inheriting the application's running-failure strategy, and loading
    /// its own rules) if this is the first time it's seen.
    pub fn setdefault_process(
        &mut self,
        application_name: &str,
        namespec: &Namespec,
    ) -> &mut ProcessStatus {
        let process_rules = self.rules.rules_for_process(namespec);
        let application = self.setdefault_application(application_name);
        let strategy = application.rules.running_failure_strategy;

        application
            .processes
            .entry(namespec.clone())
            .or_insert_with(|| {
                ProcessStatus::new(
                    namespec.clone(),
                    application_name,
                    strategy,
                    process_rules.extra_args,
                )
            })
    }

    /// Bulk-creates processes and populates `peer`'s entry for each,
    /// invoked once per peer after its first authorized tick.
    pub fn load_processes(
        &mut self,
        peer: &PeerAddress,
        infos: Vec<(String, Namespec, LocalProcessInfo)>,
    ) {
        for (application_name, namespec, info) in infos {
            let process = self.setdefault_process(&application_name, &namespec);
            process.entries.insert(peer.clone(), info);
        }
    }

    /// Applies an inbound process event, creating neither the application
    /// nor the process — spec.md §4.2: "if absent, drop the event (no
    /// tick/load yet)".
    pub fn apply_event(&mut self, event: &ProcessEvent) -> Option<&ProcessStatus> {
        let application = self.applications.get_mut(&event.application_name)?;
        let process = application.processes.get_mut(&event.namespec)?;

        process.entries.insert(
            event.origin.clone(),
            LocalProcessInfo {
                state: event.state,
                start_time: event.start_time,
                stop_time: event.stop_time,
                extra_args: event.extra_args.clone(),
            },
        );

        Some(process)
    }

    /// Invalidates every process entry hosted on `peer`, because that peer
    /// left `Running`. Returns the namespecs whose entry had been running,
    /// together with the application's failure strategy, for the caller to
    /// decide whether the failure handler should fire.
    pub fn invalidate_peer(
        &mut self,
        peer: &PeerAddress,
    ) -> Vec<(Namespec, supervisors_types::RunningFailureStrategy)> {
        let mut affected = Vec::new();

        for application in self.applications.values_mut() {
            for process in application.processes.values_mut() {
                if process.invalidate_peer(peer).is_some() {
                    affected.push((process.namespec.clone(), process.running_failure_strategy));
                }
            }
        }

        affected
    }

    /// The set of processes currently conflicting (ProcessStatus::conflicting).
    pub fn conflicts(&self) -> Vec<&ProcessStatus> {
        self.applications
            .values()
            .flat_map(|app| app.processes.values())
            .filter(|process| process.conflicting())
            .collect()
    }

    pub fn conflicting(&self) -> bool {
        self.applications.values().any(ApplicationStatus::conflicting)
    }

    pub fn mark_job_in_progress(&mut self, application_name: &str, namespec: Namespec) {
        self.setdefault_application(application_name)
            .jobs_in_progress
            .insert(namespec);
    }

    pub fn clear_job_in_progress(&mut self, application_name: &str, namespec: &Namespec) {
        if let Some(application) = self.applications.get_mut(application_name) {
            application.jobs_in_progress.remove(namespec);
        }
    }

    pub fn is_job_in_progress(&self, application_name: &str, namespec: &Namespec) -> bool {
        self.applications
            .get(application_name)
            .is_some_and(|app| app.jobs_in_progress.contains(namespec))
    }

    pub fn all_process_states(&self) -> impl Iterator<Item = (&Namespec, &ProcessStatus)> {
        self.applications
            .values()
            .flat_map(|app| app.processes.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisors_types::{ApplicationRules, NoRules, ProcessRules, RunningFailureStrategy};

    struct FixedRules;
    impl RulesSource for FixedRules {
        fn rules_for_application(&self, _name: &str) -> ApplicationRules {
            ApplicationRules {
                start_sequence: 1,
                running_failure_strategy: RunningFailureStrategy::RestartProcess,
            }
        }

        fn rules_for_process(&self, _namespec: &Namespec) -> ProcessRules {
            ProcessRules {
                extra_args: "--flag".into(),
            }
        }
    }

    #[test]
    fn setdefault_process_inherits_application_strategy() {
        let mut model = ProcessModel::new(Arc::new(FixedRules));
        let namespec = Namespec::new("app", "worker");

        let process = model.setdefault_process("app", &namespec);
        assert_eq!(
            process.running_failure_strategy,
            RunningFailureStrategy::RestartProcess
        );
        assert_eq!(process.default_extra_args, "--flag");
    }

    #[test]
    fn process_event_for_unknown_process_is_dropped() {
        let mut model = ProcessModel::new(Arc::new(NoRules));
        let event = ProcessEvent {
            origin: PeerAddress::new("a"),
            namespec: Namespec::new("app", "worker"),
            application_name: "app".into(),
            state: ProcessState::Running,
            start_time: Some(1),
            stop_time: None,
            extra_args: String::new(),
        };

        assert!(model.apply_event(&event).is_none());
        assert!(model.application("app").is_none());
    }

    #[test]
    fn conflict_detected_with_two_running_entries() {
        let mut model = ProcessModel::new(Arc::new(NoRules));
        let namespec = Namespec::new("app", "worker");
        model.setdefault_process("app", &namespec);

        let peer_a = PeerAddress::new("a");
        let peer_b = PeerAddress::new("b");

        model.load_processes(
            &peer_a,
            vec![(
                "app".into(),
                namespec.clone(),
                LocalProcessInfo::new(ProcessState::Running),
            )],
        );
        assert!(!model.conflicting());

        model.load_processes(
            &peer_b,
            vec![(
                "app".into(),
                namespec.clone(),
                LocalProcessInfo::new(ProcessState::Running),
            )],
        );
        assert!(model.conflicting());
        assert_eq!(model.conflicts().len(), 1);
    }

    #[test]
    fn invalidate_peer_clears_running_entries() {
        let mut model = ProcessModel::new(Arc::new(NoRules));
        let namespec = Namespec::new("app", "worker");
        let peer = PeerAddress::new("a");

        model.load_processes(
            &peer,
            vec![(
                "app".into(),
                namespec.clone(),
                LocalProcessInfo::new(ProcessState::Running),
            )],
        );

        let affected = model.invalidate_peer(&peer);
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].0, namespec);
    }
}
