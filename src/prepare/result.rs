//! The terminal outcome of a prepare run.

use crate::environ::Environ;
use crate::project::CommandExecInfo;
use crate::requirements::{
    RequirementClass, RequirementStatus, UserConfigOverrides, WhitelistEntry,
};

/// Whether the run succeeded, with what only that outcome carries.
#[derive(Debug, Clone)]
pub enum PrepareOutcome {
    Success {
        /// How to launch the requested command, if one was requested.
        command_exec_info: Option<CommandExecInfo>,
    },
    Failure {
        /// Error lines, in the order they were produced.
        errors: Vec<String>,
    },
}

/// What a prepare run produced.
///
/// The environment here is the run's private copy; the caller's
/// environment is never touched.
#[derive(Debug, Clone)]
pub struct PrepareResult {
    statuses: Vec<RequirementStatus>,
    environ: Environ,
    overrides: UserConfigOverrides,
    env_spec_name: Option<String>,
    outcome: PrepareOutcome,
}

impl PrepareResult {
    pub fn success(
        statuses: Vec<RequirementStatus>,
        command_exec_info: Option<CommandExecInfo>,
        environ: Environ,
        overrides: UserConfigOverrides,
        env_spec_name: Option<String>,
    ) -> Self {
        Self {
            statuses,
            environ,
            overrides,
            env_spec_name,
            outcome: PrepareOutcome::Success { command_exec_info },
        }
    }

    pub fn failure(
        statuses: Vec<RequirementStatus>,
        errors: Vec<String>,
        environ: Environ,
        overrides: UserConfigOverrides,
        env_spec_name: Option<String>,
    ) -> Self {
        Self {
            statuses,
            environ,
            overrides,
            env_spec_name,
            outcome: PrepareOutcome::Failure { errors },
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, PrepareOutcome::Failure { .. })
    }

    pub fn outcome(&self) -> &PrepareOutcome {
        &self.outcome
    }

    /// Latest status of every requirement. Empty if the run failed before
    /// any status was checked.
    pub fn statuses(&self) -> &[RequirementStatus] {
        &self.statuses
    }

    /// The environment the run computed.
    pub fn environ(&self) -> &Environ {
        &self.environ
    }

    pub fn overrides(&self) -> &UserConfigOverrides {
        &self.overrides
    }

    /// The env spec the run used (or would have used).
    pub fn env_spec_name(&self) -> Option<&str> {
        self.env_spec_name.as_deref()
    }

    /// Error lines; always empty on success.
    pub fn errors(&self) -> &[String] {
        match &self.outcome {
            PrepareOutcome::Failure { errors } => errors,
            PrepareOutcome::Success { .. } => &[],
        }
    }

    pub fn command_exec_info(&self) -> Option<&CommandExecInfo> {
        match &self.outcome {
            PrepareOutcome::Success { command_exec_info } => command_exec_info.as_ref(),
            PrepareOutcome::Failure { .. } => None,
        }
    }

    /// The first status matching `entry`.
    pub fn status_for(&self, entry: impl Into<WhitelistEntry>) -> Option<&RequirementStatus> {
        let entry = entry.into();
        self.statuses
            .iter()
            .find(|status| entry.matches(&status.requirement))
    }

    /// Prefix of the prepared package environment, if one was set.
    pub fn env_prefix(&self) -> Option<&str> {
        let status = self.status_for(RequirementClass::CondaEnv)?;
        self.environ
            .get(&status.requirement.env_var)
            .map(String::as_str)
    }

    /// Copy additions and changes from the prepared environment into
    /// `environ`. Nothing is removed, and a failed result changes nothing.
    pub fn update_environ(&self, environ: &mut Environ) {
        if !self.failed() {
            crate::environ::update_environ(environ, &self.environ);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environ(pairs: &[(&str, &str)]) -> Environ {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn failure_exposes_errors() {
        let result = PrepareResult::failure(
            vec![],
            vec!["broken".into()],
            Environ::new(),
            UserConfigOverrides::default(),
            Some("default".into()),
        );
        assert!(result.failed());
        assert_eq!(result.errors(), ["broken"]);
        assert!(result.command_exec_info().is_none());
        assert_eq!(result.env_spec_name(), Some("default"));
    }

    #[test]
    fn success_has_no_errors() {
        let result = PrepareResult::success(
            vec![],
            None,
            Environ::new(),
            UserConfigOverrides::default(),
            None,
        );
        assert!(!result.failed());
        assert!(result.errors().is_empty());
        assert!(result.env_prefix().is_none());
    }

    #[test]
    fn update_environ_adds_and_changes_only() {
        let result = PrepareResult::success(
            vec![],
            None,
            environ(&[("A", "new"), ("B", "added")]),
            UserConfigOverrides::default(),
            None,
        );
        let mut target = environ(&[("A", "old"), ("KEEP", "me")]);
        result.update_environ(&mut target);
        assert_eq!(target, environ(&[("A", "new"), ("B", "added"), ("KEEP", "me")]));
    }

    #[test]
    fn failed_result_leaves_environ_alone() {
        let result = PrepareResult::failure(
            vec![],
            vec!["x".into()],
            environ(&[("A", "new")]),
            UserConfigOverrides::default(),
            None,
        );
        let mut target = environ(&[("A", "old")]);
        result.update_environ(&mut target);
        assert_eq!(target["A"], "old");
    }
}
