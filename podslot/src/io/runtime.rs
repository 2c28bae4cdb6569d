//! Container runtime adapter and the slot running-state probe.
//!
//! The probe is the only way the store learns whether a slot is in use. A
//! failed query is always an error; it is never read as "not running".

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::process::run_query;
use crate::core::identity::{ProjectIdentity, SlotIdentity, container_name};
use crate::error::SlotError;

const QUERY_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Queries the store and build-cache caller need from a container runtime.
pub trait ContainerRuntime {
    /// Names of all currently running containers.
    fn list_running_container_names(&self) -> Result<Vec<String>, SlotError>;

    /// Whether an image with this name exists locally.
    fn inspect_image(&self, name: &str) -> Result<bool, SlotError>;
}

/// Runtime driven through a docker-compatible CLI (`docker`, `podman`).
#[derive(Debug, Clone)]
pub struct CliRuntime {
    program: String,
    timeout: Duration,
}

impl CliRuntime {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl ContainerRuntime for CliRuntime {
    #[instrument(skip_all, fields(program = %self.program))]
    fn list_running_container_names(&self) -> Result<Vec<String>, SlotError> {
        let out = run_query(
            &self.program,
            &["ps", "--format", "{{.Names}}"],
            self.timeout,
            QUERY_OUTPUT_LIMIT_BYTES,
        )
        .map_err(|err| SlotError::RuntimeUnavailable(format!("{err:#}")))?;
        if out.timed_out {
            return Err(SlotError::RuntimeUnavailable(format!(
                "{} ps timed out after {}s",
                self.program,
                self.timeout.as_secs()
            )));
        }
        if !out.success() {
            return Err(SlotError::RuntimeUnavailable(format!(
                "{} ps failed: {}",
                self.program,
                out.stderr_summary()
            )));
        }
        if out.stdout_truncated > 0 {
            return Err(SlotError::RuntimeUnavailable(format!(
                "{} ps output exceeded limit ({} bytes dropped)",
                self.program, out.stdout_truncated
            )));
        }
        let names = parse_container_names(&out.stdout_text());
        debug!(count = names.len(), "listed running containers");
        Ok(names)
    }

    #[instrument(skip_all, fields(program = %self.program, image = name))]
    fn inspect_image(&self, name: &str) -> Result<bool, SlotError> {
        let out = run_query(
            &self.program,
            &["image", "inspect", "--format", "{{.Id}}", name],
            self.timeout,
            QUERY_OUTPUT_LIMIT_BYTES,
        )
        .map_err(|err| SlotError::RuntimeUnavailable(format!("{err:#}")))?;
        if out.timed_out {
            return Err(SlotError::RuntimeUnavailable(format!(
                "{} image inspect timed out after {}s",
                self.program,
                self.timeout.as_secs()
            )));
        }
        // Non-zero exit means "no such image"; the daemon being down also
        // lands here, which at worst forces a rebuild.
        Ok(out.success())
    }
}

/// One `ps --format {{.Names}}` line per container; docker may report
/// several comma-separated names for one container.
fn parse_container_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .flat_map(|line| line.split(','))
        .map(|name| name.trim().trim_start_matches('/'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Point-in-time set of running container names.
#[derive(Debug, Clone, Default)]
pub struct RunningContainers {
    names: BTreeSet<String>,
}

impl RunningContainers {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Exact match, or the expected name followed by a `-`/`.` suffix
    /// (replica or compose-style decorations).
    pub fn matches(&self, expected: &str) -> bool {
        self.names.iter().any(|name| {
            name == expected
                || name
                    .strip_prefix(expected)
                    .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('.'))
        })
    }
}

/// Answers "is this slot's container running?" for one project.
pub struct RuntimeProbe<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    prefix: String,
    project: ProjectIdentity,
}

impl<'a, R: ContainerRuntime + ?Sized> RuntimeProbe<'a, R> {
    pub fn new(runtime: &'a R, prefix: impl Into<String>, project: ProjectIdentity) -> Self {
        Self {
            runtime,
            prefix: prefix.into(),
            project,
        }
    }

    pub fn container_name(&self, slot: &SlotIdentity) -> String {
        container_name(&self.prefix, &self.project, slot)
    }

    /// Fetch running containers once, for checking many slots.
    pub fn snapshot(&self) -> Result<RunningContainers, SlotError> {
        match self.runtime.list_running_container_names() {
            Ok(names) => Ok(RunningContainers::new(names)),
            Err(err) => {
                warn!(err = %err, "runtime probe failed");
                Err(err)
            }
        }
    }

    pub fn is_running(&self, slot: &SlotIdentity) -> Result<bool, SlotError> {
        Ok(self.is_running_in(&self.snapshot()?, slot))
    }

    pub fn is_running_in(&self, running: &RunningContainers, slot: &SlotIdentity) -> bool {
        running.matches(&self.container_name(slot))
    }
}
