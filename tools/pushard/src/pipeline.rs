//! One deploy run: clone, locate the last deploy marker, pick the commits to
//! promote and hand them to the replay loop.

use crate::amplify::{AmplifyClient, BackendDeployTool};
use crate::amplify_project::{load_amplify_env, AmplifyEnv};
use crate::config::DeployConfig;
use crate::errors::PushardError;
use crate::git::{redact_credentials, GitClient, VersionControl};
use crate::logging::{append_run_log, end_op, error_op, start_op};
use crate::marker::{checkpoint_message, is_merge_message, parse_marker};
use crate::notify::Notifier;
use crate::replay::{ReplayLoop, ReplaySettings};
use crate::runtime::{FileSystem, Terminal};
use crate::select::{select_replay_set, ReplaySet};
use crate::types::{CommitRef, RunOutcome};
use serde_json::json;

/// Where the target branch stands and what is left to replay onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub start_marker: CommitRef,
    pub keep_boundary_merge: bool,
    pub replay: ReplaySet,
}

pub struct Pipeline<'a> {
    config: &'a DeployConfig,
    fs: &'a dyn FileSystem,
    terminal: &'a dyn Terminal,
    vcs: &'a dyn VersionControl,
    backend: &'a dyn BackendDeployTool,
    notifier: &'a dyn Notifier,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a DeployConfig,
        fs: &'a dyn FileSystem,
        terminal: &'a dyn Terminal,
        vcs: &'a dyn VersionControl,
        backend: &'a dyn BackendDeployTool,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            fs,
            terminal,
            vcs,
            backend,
            notifier,
        }
    }

    pub fn run(&self, dry_run: bool) -> Result<RunOutcome, PushardError> {
        start_op(
            self.terminal,
            &format!(
                " ==> Deploy commit hash {} to {} <==",
                self.config.deploy_hash, self.config.dst_branch
            ),
        );
        append_run_log(
            "info",
            "pipeline.started",
            json!({
                "repo": self.config.repo,
                "deploy_hash": self.config.deploy_hash.as_str(),
                "dst_branch": self.config.dst_branch,
                "skip_hashes": self.config.skip_hashes.len(),
                "dry_run": dry_run
            }),
        );

        let plan = self.plan().inspect_err(|error| self.report_fatal("plan", error))?;

        if plan.replay.is_empty() {
            end_op(self.terminal, "nothing to deploy");
            append_run_log(
                "info",
                "pipeline.nothing_to_deploy",
                json!({ "start_marker": plan.start_marker.as_str() }),
            );
            return Ok(RunOutcome::NothingToDeploy);
        }

        if dry_run {
            self.print_plan(&plan)?;
            return Ok(RunOutcome::Planned {
                commits: plan.replay.into_vec(),
            });
        }

        let env = self
            .prepare_backend()
            .inspect_err(|error| self.report_fatal("prepare_backend", error))?;
        self.deploy(&plan, &env)
    }

    /// Clones and aligns the repository, then reads the deploy marker off
    /// the target branch and selects the commits to replay.
    pub fn plan(&self) -> Result<DeployPlan, PushardError> {
        let repository = &self.config.app.repository;
        start_op(
            self.terminal,
            &format!("clone itself - {}", redact_credentials(&self.config.remote_url())),
        );
        if self.fs.exists(&self.config.project_dir) {
            return Err(PushardError::Vcs(format!(
                "{} already exists; remove the stale checkout before deploying",
                self.config.project_dir.display()
            )));
        }
        self.fs.create_dir_all(&repository.clone_dir)?;
        self.vcs.clone_repository(&self.config.remote_url())?;
        self.vcs
            .configure_committer(&repository.committer_name, &repository.committer_email)?;
        self.vcs.fetch()?;
        self.vcs.checkout_and_align(&self.config.dst_branch)?;
        end_op(self.terminal, "done");

        let last_message = self.vcs.last_commit_message(&self.config.dst_branch)?;
        let start_marker = parse_marker(&last_message)?;
        let keep_boundary_merge = is_merge_message(&last_message);
        start_op(
            self.terminal,
            &format!("last commit message: {}", last_message.trim()),
        );
        end_op(
            self.terminal,
            &format!("last deployed hash: {start_marker}"),
        );

        let revisions = self
            .vcs
            .revision_list(&self.config.app.deploy.source_branch)?;
        let replay = select_replay_set(
            &revisions,
            &start_marker,
            &self.config.deploy_hash,
            keep_boundary_merge,
            &self.config.skip_hashes,
        )?;

        append_run_log(
            "info",
            "pipeline.plan.ready",
            json!({
                "start_marker": start_marker.as_str(),
                "keep_boundary_merge": keep_boundary_merge,
                "commits": replay.len()
            }),
        );
        Ok(DeployPlan {
            start_marker,
            keep_boundary_merge,
            replay,
        })
    }

    fn print_plan(&self, plan: &DeployPlan) -> Result<(), PushardError> {
        self.terminal.write_line(&format!(
            "dry run: {} commit(s) would be deployed to {}",
            plan.replay.len(),
            self.config.dst_branch
        ))?;
        for commit in plan.replay.iter() {
            let note = if plan.keep_boundary_merge && commit == &plan.start_marker {
                " (backend only)"
            } else {
                ""
            };
            self.terminal.write_line(&format!("  {commit}{note}"))?;
        }
        append_run_log(
            "info",
            "pipeline.dry_run.printed",
            json!({ "commits": plan.replay.len() }),
        );
        Ok(())
    }

    /// Makes the wrapper scripts executable, reads the Amplify project
    /// metadata and pulls the target env so `init`/`push` can run.
    fn prepare_backend(&self) -> Result<AmplifyEnv, PushardError> {
        self.backend.prepare_scripts()?;

        start_op(
            self.terminal,
            &format!(
                "read {} cloudformation StackId, AppId, Region",
                self.config.dst_branch
            ),
        );
        let env = load_amplify_env(
            self.fs,
            &self.config.team_provider_path(),
            &self.config.project_config_path(),
            self.config.env_name(),
        )?;
        end_op(self.terminal, &format!("StackId: {}", env.stack_name));

        self.backend.configure_credentials(&env.region)?;
        self.backend.pull(&env)?;
        append_run_log(
            "info",
            "pipeline.backend.ready",
            json!({ "env": env.env_name, "stack": env.stack_name, "region": env.region }),
        );
        Ok(env)
    }

    fn deploy(&self, plan: &DeployPlan, env: &AmplifyEnv) -> Result<RunOutcome, PushardError> {
        self.notifier.send(&format!(
            "🟢 START deploying `{}` to `{}` - {} push",
            self.config.deploy_hash,
            self.config.dst_branch,
            plan.replay.len()
        ));
        self.terminal.write_line("\n|---- INIT PUSH LOOP ----|")?;

        // A `Merge commit 🔀h🔀` tip is the resume signal for h's backend
        // push; a baseline on top of it would hide that until h is checkpointed.
        if plan.keep_boundary_merge {
            append_run_log(
                "info",
                "pipeline.baseline.skipped",
                json!({ "start_marker": plan.start_marker.as_str() }),
            );
        } else {
            self.vcs
                .commit_all(&checkpoint_message(&plan.start_marker))
                .inspect_err(|error| self.report_fatal("baseline_checkpoint", error))?;
        }

        let replay_loop = ReplayLoop::new(
            self.vcs,
            self.backend,
            self.notifier,
            self.terminal,
            ReplaySettings {
                target_branch: &self.config.dst_branch,
                env,
                env_config_file: &self.config.app.deploy.env_config_file,
                push_retries: self.config.app.deploy.push_retries,
            },
        );
        let outcome = replay_loop.run(&plan.replay, &plan.start_marker, plan.keep_boundary_merge);
        match &outcome {
            Ok(outcome) => append_run_log(
                "info",
                "pipeline.completed",
                json!({ "outcome": format!("{outcome:?}") }),
            ),
            Err(error) => append_run_log(
                "error",
                "pipeline.failed",
                json!({ "stage": "replay", "kind": error.kind(), "error": error.to_string() }),
            ),
        }
        outcome
    }

    /// Failures outside the replay loop have nothing to push back; they are
    /// reported and the run ends.
    fn report_fatal(&self, stage: &str, error: &PushardError) {
        error_op(self.terminal, &error.to_string());
        self.notifier.send(&format!("🟥  ERROR - {error}"));
        append_run_log(
            "error",
            "pipeline.failed",
            json!({ "stage": stage, "kind": error.kind(), "error": error.to_string() }),
        );
    }
}

/// Builds the git and Amplify clients over `runner` and runs the pipeline.
pub fn run_deploy(
    config: &DeployConfig,
    runtime: &crate::runtime::ProductionRuntime,
    notifier: &dyn Notifier,
    dry_run: bool,
) -> Result<RunOutcome, PushardError> {
    let runner = runtime.process_runner.as_ref();
    let git = GitClient::new(runner, &config.project_dir);
    let amplify = AmplifyClient::new(
        runner,
        &config.app.amplify.scripts_dir,
        &config.project_dir,
        config.aws.clone(),
    );
    Pipeline::new(
        config,
        runtime.file_system.as_ref(),
        runtime.terminal.as_ref(),
        &git,
        &amplify,
        notifier,
    )
    .run(dry_run)
}
