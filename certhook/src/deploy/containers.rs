//! Container and swarm service notification through the docker CLI.

use certhook_core::{AutoCommand, AutoRestart, CommandSpec};
use std::fmt;
use thiserror::Error;

use crate::exec::{CommandError, CommandRunner, Invocation};

const DOCKER_BIN: &str = "docker";

#[derive(Debug, Error)]
#[error("{target}: {source}")]
pub struct NotifyFailure {
    pub target: String,
    #[source]
    pub source: CommandError,
}

#[derive(Debug)]
pub struct NotifyError {
    pub attempted: usize,
    pub failures: Vec<NotifyFailure>,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets = self
            .failures
            .iter()
            .map(|failure| failure.target.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{} of {} container operation(s) failed ({})",
            self.failures.len(),
            self.attempted,
            targets
        )
    }
}

impl std::error::Error for NotifyError {}

#[derive(Debug, Default)]
pub struct NotifyReport {
    pub attempted: usize,
    pub failures: Vec<NotifyFailure>,
}

impl NotifyReport {
    pub fn into_result(self) -> Result<usize, NotifyError> {
        if self.failures.is_empty() {
            Ok(self.attempted)
        } else {
            Err(NotifyError {
                attempted: self.attempted,
                failures: self.failures,
            })
        }
    }
}

pub fn exec_invocation(container: &str, cmd: &CommandSpec) -> Invocation {
    let invocation = Invocation::new(DOCKER_BIN).args(["exec", container]);
    match cmd {
        CommandSpec::Shell(line) => invocation.args(["sh", "-c", line.as_str()]),
        CommandSpec::Argv(argv) => invocation.args(argv.iter().map(String::as_str)),
    }
}

pub fn restart_invocation(container: &str) -> Invocation {
    Invocation::new(DOCKER_BIN).args(["restart", container])
}

pub fn service_update_invocation(service: &str) -> Invocation {
    Invocation::new(DOCKER_BIN).args(["service", "update", "--detach=false", "--force", service])
}

pub struct ContainerNotifier<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ContainerNotifier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Run each entry's command in each of its containers, in listed order.
    pub fn exec(&self, entries: &[AutoCommand]) -> NotifyReport {
        let mut report = NotifyReport::default();
        for entry in entries {
            for container in &entry.containers {
                tracing::info!(container = %container, "Executing autocmd in container");
                self.attempt(&mut report, container, exec_invocation(container, &entry.cmd));
            }
        }
        report
    }

    /// Restart containers and force-update swarm services.
    pub fn restart(&self, entries: &[AutoRestart]) -> NotifyReport {
        let mut report = NotifyReport::default();
        for entry in entries {
            for container in &entry.containers {
                tracing::info!(container = %container, "Restarting container");
                self.attempt(&mut report, container, restart_invocation(container));
            }
            for service in &entry.swarm_services {
                tracing::info!(service = %service, "Force-updating swarm service");
                self.attempt(&mut report, service, service_update_invocation(service));
            }
        }
        report
    }

    fn attempt(&self, report: &mut NotifyReport, target: &str, invocation: Invocation) {
        report.attempted += 1;
        if let Err(source) = self.runner.run(&invocation) {
            tracing::error!(target_name = %target, "{}", source);
            report.failures.push(NotifyFailure {
                target: target.to_string(),
                source,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::RecordingRunner;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn exec_runs_command_per_container_in_order() {
        let runner = RecordingRunner::new();
        let entries = vec![AutoCommand {
            cmd: CommandSpec::Shell("echo 'Hello World!'".to_string()),
            containers: vec!["foo".to_string(), "bar".to_string()],
        }];

        let report = ContainerNotifier::new(&runner).exec(&entries);

        assert_eq!(report.into_result().unwrap(), 2);
        assert_eq!(
            runner.argvs(),
            vec![
                argv(&["docker", "exec", "foo", "sh", "-c", "echo 'Hello World!'"]),
                argv(&["docker", "exec", "bar", "sh", "-c", "echo 'Hello World!'"]),
            ]
        );
    }

    #[test]
    fn error_lists_every_failed_target() {
        let runner = RecordingRunner::failing_on(&["web", "api"]);
        let entries = vec![AutoRestart {
            containers: vec!["web".to_string(), "db".to_string()],
            swarm_services: vec!["api".to_string()],
        }];

        let err = ContainerNotifier::new(&runner)
            .restart(&entries)
            .into_result()
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "2 of 3 container operation(s) failed (web, api)"
        );
    }

    #[test]
    fn exec_passes_argv_verbatim() {
        let runner = RecordingRunner::new();
        let entries = vec![AutoCommand {
            cmd: CommandSpec::Argv(argv(&["nginx", "-s", "reload"])),
            containers: vec!["web".to_string()],
        }];

        ContainerNotifier::new(&runner).exec(&entries);

        assert_eq!(
            runner.argvs(),
            vec![argv(&["docker", "exec", "web", "nginx", "-s", "reload"])]
        );
    }

    #[test]
    fn restart_handles_containers_and_services() {
        let runner = RecordingRunner::new();
        let entries = vec![
            AutoRestart {
                containers: vec!["container1".to_string(), "container2".to_string()],
                swarm_services: Vec::new(),
            },
            AutoRestart {
                containers: Vec::new(),
                swarm_services: vec!["service1".to_string(), "service2".to_string()],
            },
        ];

        let report = ContainerNotifier::new(&runner).restart(&entries);

        assert_eq!(report.attempted, 4);
        assert_eq!(
            runner.argvs(),
            vec![
                argv(&["docker", "restart", "container1"]),
                argv(&["docker", "restart", "container2"]),
                argv(&["docker", "service", "update", "--detach=false", "--force", "service1"]),
                argv(&["docker", "service", "update", "--detach=false", "--force", "service2"]),
            ]
        );
    }

    #[test]
    fn failure_does_not_stop_remaining_targets() {
        let runner = RecordingRunner::failing_on(&["foo"]);
        let entries = vec![AutoCommand {
            cmd: CommandSpec::Shell("reload".to_string()),
            containers: vec!["foo".to_string(), "bar".to_string()],
        }];

        let report = ContainerNotifier::new(&runner).exec(&entries);

        assert_eq!(runner.calls.borrow().len(), 2);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.attempted, 2);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].target, "foo");
        assert_eq!(err.to_string(), "1 of 2 container operation(s) failed (foo)");
    }
}
