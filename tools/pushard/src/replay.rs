//! Per-commit replay of dev history onto an environment branch.
//!
//! Each commit is merged with `-X theirs`, the Amplify backend is
//! re-initialized and pushed, and a `🔀<hash>🔀` checkpoint commit records
//! progress. A failure pushes whatever is committed so the next run resumes
//! from the last checkpoint.

use crate::amplify::BackendDeployTool;
use crate::amplify_project::AmplifyEnv;
use crate::errors::PushardError;
use crate::git::VersionControl;
use crate::logging::{append_run_log, end_op, error_op, start_op};
use crate::marker::checkpoint_message;
use crate::notify::Notifier;
use crate::runtime::Terminal;
use crate::select::ReplaySet;
use crate::types::{CommitRef, RunOutcome};
use serde_json::json;

pub const DEFAULT_PUSH_RETRIES: u32 = 3;

pub struct ReplaySettings<'a> {
    pub target_branch: &'a str,
    pub env: &'a AmplifyEnv,
    /// Environment-specific file restored to the branch's own version after
    /// every merge.
    pub env_config_file: &'a str,
    pub push_retries: u32,
}

pub struct ReplayLoop<'a> {
    vcs: &'a dyn VersionControl,
    backend: &'a dyn BackendDeployTool,
    notifier: &'a dyn Notifier,
    terminal: &'a dyn Terminal,
    settings: ReplaySettings<'a>,
}

/// How the working tree is cleaned up before the emergency push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cleanup {
    AbortMerge,
    ResetToHead,
}

impl<'a> ReplayLoop<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        backend: &'a dyn BackendDeployTool,
        notifier: &'a dyn Notifier,
        terminal: &'a dyn Terminal,
        settings: ReplaySettings<'a>,
    ) -> Self {
        Self {
            vcs,
            backend,
            notifier,
            terminal,
            settings,
        }
    }

    /// Replays `replay` in order. `start_marker` and `keep_boundary_merge`
    /// identify a boundary commit whose merge already landed on the branch.
    pub fn run(
        &self,
        replay: &ReplaySet,
        start_marker: &CommitRef,
        keep_boundary_merge: bool,
    ) -> Result<RunOutcome, PushardError> {
        if replay.is_empty() {
            append_run_log("info", "replay.nothing_to_deploy", json!({}));
            return Ok(RunOutcome::NothingToDeploy);
        }

        let total = replay.len();
        append_run_log(
            "info",
            "replay.started",
            json!({
                "branch": self.settings.target_branch,
                "commits": total,
                "start_marker": start_marker.as_str(),
                "keep_boundary_merge": keep_boundary_merge
            }),
        );

        for (idx, commit) in replay.iter().enumerate() {
            let message = format!("loop nr. {} of {total}", idx + 1);
            start_op(self.terminal, &format!("{message} - {commit}"));
            self.notifier.send(&message);

            let skip_merge = keep_boundary_merge && commit == start_marker;
            if let Err((error, cleanup)) = self.replay_commit(commit, skip_merge) {
                return Err(self.emergency_push(commit, error, cleanup));
            }
        }

        start_op(self.terminal, "GIT push");
        if let Err(error) = self.vcs.push(self.settings.target_branch) {
            error_op(self.terminal, &format!("final push failed - {error}"));
            self.notifier.send(&format!("🟥  ERROR - {error}"));
            append_run_log(
                "error",
                "replay.final_push.failed",
                json!({
                    "branch": self.settings.target_branch,
                    "commits": total,
                    "kind": error.kind(),
                    "error": error.to_string()
                }),
            );
            return Err(error);
        }
        end_op(self.terminal, "done");
        self.notifier.send("🏁 FINISH 🏁");
        append_run_log(
            "info",
            "replay.completed",
            json!({ "branch": self.settings.target_branch, "commits": total }),
        );
        Ok(RunOutcome::Deployed { commits: total })
    }

    fn replay_commit(
        &self,
        commit: &CommitRef,
        skip_merge: bool,
    ) -> Result<(), (PushardError, Cleanup)> {
        let reset = |error| (error, Cleanup::ResetToHead);

        if skip_merge {
            append_run_log(
                "info",
                "replay.merge.skipped",
                json!({ "commit": commit.as_str(), "reason": "boundary merge already applied" }),
            );
            end_op(self.terminal, "boundary merge already on branch, skipping merge");
        } else {
            start_op(
                self.terminal,
                &format!(
                    "merge {commit} into {} strategy: theirs",
                    self.settings.target_branch
                ),
            );
            self.vcs.merge_with_theirs(commit).map_err(reset)?;
            self.vcs
                .restore_pre_merge_file(self.settings.env_config_file)
                .map_err(reset)?;
            end_op(self.terminal, "done");
        }

        start_op(
            self.terminal,
            &format!("amplify INIT {}", self.settings.env.env_name),
        );
        if let Err(error) = self.backend.initialize(self.settings.env) {
            error_op(self.terminal, ">> I will try to abort the merge and push");
            return Err((error, Cleanup::AbortMerge));
        }
        end_op(self.terminal, "done");

        self.push_with_retry(commit).map_err(reset)?;

        self.vcs
            .commit_all(&checkpoint_message(commit))
            .map_err(reset)?;
        append_run_log(
            "info",
            "replay.checkpoint.committed",
            json!({ "commit": commit.as_str() }),
        );
        Ok(())
    }

    /// Pushes the backend, waiting out a stack that is busy with another
    /// operation. At most `push_retries` extra attempts; any failure while the
    /// stack is idle is returned as-is.
    fn push_with_retry(&self, commit: &CommitRef) -> Result<(), PushardError> {
        let stack = self.settings.env.stack_name.as_str();
        let mut retries_left = self.settings.push_retries;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            start_op(self.terminal, "amplify PUSH");
            let push_error = match self.backend.push() {
                Ok(()) => {
                    end_op(self.terminal, &format!("push {commit} is done"));
                    append_run_log(
                        "info",
                        "replay.backend_push.succeeded",
                        json!({ "commit": commit.as_str(), "attempt": attempt }),
                    );
                    return Ok(());
                }
                Err(error) => error,
            };

            let status = self.backend.stack_status(stack).map_err(|status_error| {
                PushardError::Backend(format!(
                    "{push_error}; stack status unavailable: {status_error}"
                ))
            })?;
            end_op(self.terminal, &format!("stack status: {status}"));
            append_run_log(
                "warn",
                "replay.backend_push.failed",
                json!({
                    "commit": commit.as_str(),
                    "attempt": attempt,
                    "stack_status": status.as_str(),
                    "retries_left": retries_left,
                    "error": push_error.to_string()
                }),
            );

            if !status.is_in_progress() {
                return Err(push_error);
            }
            if retries_left == 0 {
                return Err(PushardError::BackendBusy {
                    attempts: attempt,
                    status: status.to_string(),
                });
            }

            start_op(self.terminal, "stack is in progress, waiting...");
            if let Err(wait_error) = self.backend.wait_for_stack(stack) {
                error_op(self.terminal, &format!("aws wait error - {wait_error}"));
            }
            let message = format!("⚠️ stack operation complete, {retries_left} retry(es) left");
            end_op(self.terminal, &message);
            self.notifier.send(&message);
            retries_left -= 1;
        }
    }

    /// Reports `error`, cleans the working tree and pushes the target branch
    /// so completed checkpoints are not lost. Returns the original error.
    fn emergency_push(
        &self,
        commit: &CommitRef,
        error: PushardError,
        cleanup: Cleanup,
    ) -> PushardError {
        error_op(self.terminal, "CATCH ERROR DURING LOOP");
        error_op(self.terminal, &error.to_string());
        self.notifier.send(&format!("🟥  ERROR - {error}"));
        append_run_log(
            "error",
            "replay.commit.failed",
            json!({
                "commit": commit.as_str(),
                "kind": error.kind(),
                "error": error.to_string(),
                "cleanup": format!("{cleanup:?}")
            }),
        );

        let cleaned = match cleanup {
            Cleanup::AbortMerge => self.vcs.abort_merge(),
            Cleanup::ResetToHead => self.vcs.reset_to_head(),
        };
        if let Err(cleanup_error) = cleaned {
            error_op(self.terminal, &format!("cleanup failed - {cleanup_error}"));
        }

        start_op(self.terminal, "GIT EMERGENCY PUSH");
        match self.vcs.push(self.settings.target_branch) {
            Ok(()) => {
                end_op(self.terminal, "done");
                append_run_log(
                    "warn",
                    "replay.emergency_push.succeeded",
                    json!({ "branch": self.settings.target_branch }),
                );
            }
            Err(push_error) => {
                error_op(self.terminal, &format!("emergency push failed - {push_error}"));
                self.notifier
                    .send(&format!("🟥  EMERGENCY PUSH FAILED - {push_error}"));
                append_run_log(
                    "error",
                    "replay.emergency_push.failed",
                    json!({
                        "branch": self.settings.target_branch,
                        "error": push_error.to_string()
                    }),
                );
            }
        }
        error
    }
}
