use crate::amplify_project::AmplifyEnv;
use crate::errors::PushardError;
use crate::logging::append_run_log;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::types::StackState;
use serde_json::json;
use std::path::{Path, PathBuf};

pub const INIT_SCRIPT: &str = "amplify-init.sh";
pub const PULL_SCRIPT: &str = "amplify-pull.sh";
pub const PUSH_SCRIPT: &str = "amplify-push.sh";

/// Amplify CLI and CloudFormation operations behind the replay loop.
pub trait BackendDeployTool {
    fn prepare_scripts(&self) -> Result<(), PushardError>;
    fn configure_credentials(&self, region: &str) -> Result<(), PushardError>;
    fn pull(&self, env: &AmplifyEnv) -> Result<(), PushardError>;
    fn initialize(&self, env: &AmplifyEnv) -> Result<(), PushardError>;
    fn push(&self) -> Result<(), PushardError>;
    fn stack_status(&self, stack_name: &str) -> Result<StackState, PushardError>;
    /// Blocks until the stack's current operation reaches a terminal state.
    fn wait_for_stack(&self, stack_name: &str) -> Result<(), PushardError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub profile: Option<String>,
}

pub struct AmplifyClient<'a> {
    runner: &'a dyn ProcessRunner,
    scripts_dir: PathBuf,
    project_dir: PathBuf,
    credentials: AwsCredentials,
}

impl<'a> AmplifyClient<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        scripts_dir: impl AsRef<Path>,
        project_dir: impl AsRef<Path>,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            runner,
            scripts_dir: scripts_dir.as_ref().to_path_buf(),
            project_dir: project_dir.as_ref().to_path_buf(),
            credentials,
        }
    }

    fn script(&self, name: &str) -> String {
        self.scripts_dir.join(name).display().to_string()
    }

    /// Arguments shared by the init and pull wrapper scripts.
    fn env_script_args(&self, env: &AmplifyEnv) -> Vec<String> {
        vec![
            env.env_name.clone(),
            env.app_id.clone(),
            self.credentials.access_key_id.clone(),
            self.credentials.secret_access_key.clone(),
            env.project_name.clone(),
            self.project_dir.display().to_string(),
        ]
    }

    fn aws_args<'s>(&'s self, args: &[&'s str]) -> Vec<&'s str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(profile) = &self.credentials.profile {
            full.push("--profile");
            full.push(profile.as_str());
        }
        full.extend_from_slice(args);
        full
    }

    fn run_script(
        &self,
        event: &str,
        script: &str,
        args: Vec<String>,
    ) -> Result<ProcessOutput, PushardError> {
        let out = self.runner.run(
            ProcessRequest::new(&self.script(script), args)
                .in_dir(&self.scripts_dir)
                .streaming(),
        )?;
        if !out.success() {
            append_run_log(
                "error",
                &format!("amplify.{event}.failed"),
                json!({
                    "script": script,
                    "exit_code": out.exit_code,
                    "stderr": out.stderr
                }),
            );
            return Err(PushardError::Backend(format!(
                "amplify {event} failed (exit {})",
                out.exit_code
            )));
        }
        append_run_log(
            "info",
            &format!("amplify.{event}.succeeded"),
            json!({ "script": script }),
        );
        Ok(out)
    }
}

impl BackendDeployTool for AmplifyClient<'_> {
    fn prepare_scripts(&self) -> Result<(), PushardError> {
        if cfg!(windows) {
            return Ok(());
        }
        for script in [INIT_SCRIPT, PULL_SCRIPT, PUSH_SCRIPT] {
            let path = self.script(script);
            let out = self
                .runner
                .run(ProcessRequest::new("chmod", ["+x", path.as_str()]))?;
            if !out.success() {
                append_run_log(
                    "error",
                    "amplify.scripts.chmod_failed",
                    json!({ "script": path, "stderr": out.stderr }),
                );
                return Err(PushardError::Backend(format!(
                    "chmod +x {path} failed: {}",
                    out.stderr.trim()
                )));
            }
        }
        append_run_log(
            "info",
            "amplify.scripts.prepared",
            json!({ "scripts_dir": self.scripts_dir.display().to_string() }),
        );
        Ok(())
    }

    fn configure_credentials(&self, region: &str) -> Result<(), PushardError> {
        let mut settings = vec![
            ("aws_access_key_id".to_string(), self.credentials.access_key_id.clone()),
            (
                "aws_secret_access_key".to_string(),
                self.credentials.secret_access_key.clone(),
            ),
            ("default.region".to_string(), region.to_string()),
        ];
        if let Some(profile) = &self.credentials.profile {
            settings.push((format!("profile.{profile}.region"), region.to_string()));
        }
        for (key, value) in &settings {
            let out = self.runner.run(ProcessRequest::new(
                "aws",
                ["configure", "set", key.as_str(), value.as_str()],
            ))?;
            if !out.success() {
                append_run_log(
                    "error",
                    "aws.configure.failed",
                    json!({ "key": key, "exit_code": out.exit_code, "stderr": out.stderr }),
                );
                return Err(PushardError::Backend(format!(
                    "aws configure set {key} failed: {}",
                    out.stderr.trim()
                )));
            }
        }
        append_run_log(
            "info",
            "aws.configure.succeeded",
            json!({
                "region": region,
                "profile": self.credentials.profile,
                "keys": settings.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>()
            }),
        );
        Ok(())
    }

    fn pull(&self, env: &AmplifyEnv) -> Result<(), PushardError> {
        append_run_log(
            "info",
            "amplify.pull.started",
            json!({ "env": env.env_name, "app_id": env.app_id }),
        );
        self.run_script("pull", PULL_SCRIPT, self.env_script_args(env))?;
        Ok(())
    }

    fn initialize(&self, env: &AmplifyEnv) -> Result<(), PushardError> {
        append_run_log(
            "info",
            "amplify.init.started",
            json!({ "env": env.env_name, "app_id": env.app_id }),
        );
        self.run_script("init", INIT_SCRIPT, self.env_script_args(env))?;
        Ok(())
    }

    fn push(&self) -> Result<(), PushardError> {
        append_run_log(
            "info",
            "amplify.push.started",
            json!({ "project_dir": self.project_dir.display().to_string() }),
        );
        let args = vec![self.project_dir.display().to_string()];
        self.run_script("push", PUSH_SCRIPT, args)?;
        Ok(())
    }

    fn stack_status(&self, stack_name: &str) -> Result<StackState, PushardError> {
        let args = self.aws_args(&[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            stack_name,
            "--query",
            "Stacks[].StackStatus",
        ]);
        let out = self.runner.run(ProcessRequest::new("aws", args))?;
        if !out.success() {
            append_run_log(
                "error",
                "aws.stack_status.failed",
                json!({ "stack": stack_name, "exit_code": out.exit_code, "stderr": out.stderr }),
            );
            return Err(PushardError::Backend(format!(
                "describe-stacks for {stack_name} failed: {}",
                out.stderr.trim()
            )));
        }
        let status = parse_stack_status(&out.stdout);
        append_run_log(
            "info",
            "aws.stack_status.fetched",
            json!({ "stack": stack_name, "status": status.as_str() }),
        );
        Ok(status)
    }

    fn wait_for_stack(&self, stack_name: &str) -> Result<(), PushardError> {
        append_run_log(
            "info",
            "aws.stack_wait.started",
            json!({ "stack": stack_name }),
        );
        let args = self.aws_args(&[
            "cloudformation",
            "wait",
            "stack-update-complete",
            "--stack-name",
            stack_name,
        ]);
        let out = self
            .runner
            .run(ProcessRequest::new("aws", args).streaming())?;
        if !out.success() {
            append_run_log(
                "warn",
                "aws.stack_wait.failed",
                json!({ "stack": stack_name, "exit_code": out.exit_code }),
            );
            return Err(PushardError::Backend(format!(
                "waiting for stack {stack_name} failed (exit {})",
                out.exit_code
            )));
        }
        Ok(())
    }
}

/// Reads the `--query Stacks[].StackStatus` output, a JSON array with one
/// status per matching stack. Falls back to the raw text for `--output text`.
pub fn parse_stack_status(stdout: &str) -> StackState {
    if let Ok(statuses) = serde_json::from_str::<Vec<String>>(stdout) {
        return StackState::new(statuses.into_iter().next().unwrap_or_default());
    }
    StackState::new(stdout.trim().trim_matches('"'))
}
