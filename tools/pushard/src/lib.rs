pub mod amplify;
pub mod amplify_project;
pub mod config;
pub mod errors;
pub mod git;
pub mod input;
pub mod log_retention;
pub mod logging;
pub mod marker;
pub mod notify;
pub mod pipeline;
pub mod replay;
pub mod runtime;
pub mod select;
pub mod types;

use clap::{error::ErrorKind, Parser};
use config::{load_config, resolve_deploy_config, CliOverrides, EnvMap};
use errors::PushardError;
use logging::{append_run_log, init_run_log, JsonlLogger};
use notify::notifier_from_settings;
use pipeline::run_deploy;
use runtime::ProductionRuntime;
use serde_json::json;
use types::RunOutcome;

#[derive(Debug, Clone, Parser)]
#[command(name = "pushard")]
#[command(about = "Promote dev commits one by one onto an Amplify environment branch")]
pub struct Cli {
    /// TOML file overlaying the built-in defaults.
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    /// Newest dev commit to deploy (overrides DEPLOY_HASH).
    #[arg(long)]
    pub deploy_hash: Option<String>,
    /// Comma-separated commits to leave out (overrides SKIP_HASHES).
    #[arg(long)]
    pub skip_hashes: Option<String>,
    /// Environment branch to deploy to (overrides DST_BRANCH).
    #[arg(long)]
    pub dst_branch: Option<String>,
    /// Repository as host/org/name (overrides AMPLIFY_PROJECT_REPO).
    #[arg(long)]
    pub repo: Option<String>,
    #[arg(long)]
    pub clone_dir: Option<std::path::PathBuf>,
    /// Directory holding the amplify-{init,pull,push}.sh wrappers.
    #[arg(long)]
    pub scripts_dir: Option<std::path::PathBuf>,
    /// Append structured JSONL run events to this file.
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
    /// Print the commits that would be replayed and stop.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

pub fn run() -> Result<i32, PushardError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| PushardError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, PushardError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(PushardError::Cli(error.to_string())),
        },
    };

    let env_map = env_to_map(env);
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        deploy_hash: cli.deploy_hash.clone(),
        skip_hashes: cli.skip_hashes.clone(),
        dst_branch: cli.dst_branch.clone(),
        repo: cli.repo.clone(),
        clone_dir: cli.clone_dir.clone(),
        scripts_dir: cli.scripts_dir.clone(),
        log_path: cli.log_file.clone(),
    };

    let cfg = load_config(&overrides, cwd, &env_map, runtime.file_system.as_ref())?;
    if let Some(path) = &cfg.logging.path {
        let mut logger = JsonlLogger::new(path);
        logger.budget_bytes = cfg.logging.budget_bytes;
        init_run_log(logger);
    }

    let deploy = resolve_deploy_config(cfg, &overrides, &env_map).inspect_err(|error| {
        append_run_log(
            "error",
            "input.rejected",
            json!({ "kind": error.kind(), "error": error.to_string() }),
        );
    })?;

    let notifier = notifier_from_settings(
        deploy.telegram_token.clone(),
        deploy.telegram_chat_id.clone(),
        deploy.notify_timeout(),
    );

    let outcome = run_deploy(&deploy, runtime, notifier.as_ref(), cli.dry_run)?;
    let summary = match &outcome {
        RunOutcome::NothingToDeploy => format!("nothing to deploy to {}", deploy.dst_branch),
        RunOutcome::Deployed { commits } => {
            format!("deployed {commits} commit(s) to {}", deploy.dst_branch)
        }
        RunOutcome::Planned { commits } => {
            format!("dry run complete: {} commit(s) planned", commits.len())
        }
    };
    runtime.terminal.write_line(&summary)?;
    Ok(0)
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
