//! Amplify project metadata checked into the deployed repository.

use crate::errors::PushardError;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

/// Backend coordinates of one Amplify environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmplifyEnv {
    pub env_name: String,
    pub app_id: String,
    pub project_name: String,
    pub stack_name: String,
    pub region: String,
}

#[derive(Debug, Deserialize)]
struct TeamProviderEntry {
    awscloudformation: CloudFormationInfo,
}

#[derive(Debug, Deserialize)]
struct CloudFormationInfo {
    #[serde(rename = "StackId")]
    stack_id: String,
    #[serde(rename = "AmplifyAppId")]
    amplify_app_id: String,
    #[serde(rename = "Region")]
    region: String,
}

#[derive(Debug, Deserialize)]
struct ProjectConfig {
    #[serde(rename = "projectName")]
    project_name: String,
}

/// Reads `team-provider-info.json` and `project-config.json` for `env_name`.
pub fn load_amplify_env(
    fs: &dyn FileSystem,
    team_provider_path: &Path,
    project_config_path: &Path,
    env_name: &str,
) -> Result<AmplifyEnv, PushardError> {
    let team_provider = parse_team_provider(&fs.read_to_string(team_provider_path)?)?;
    let entry = team_provider.get(env_name).ok_or_else(|| {
        PushardError::InvalidConfig(format!(
            "{} has no awscloudformation entry for env {env_name:?}",
            team_provider_path.display()
        ))
    })?;
    let project: ProjectConfig = serde_json::from_str(&fs.read_to_string(project_config_path)?)
        .map_err(|e| {
            PushardError::ConfigParse(format!("{}: {e}", project_config_path.display()))
        })?;

    let env = AmplifyEnv {
        env_name: env_name.to_string(),
        app_id: entry.awscloudformation.amplify_app_id.clone(),
        project_name: project.project_name,
        stack_name: entry.awscloudformation.stack_id.clone(),
        region: entry.awscloudformation.region.clone(),
    };
    append_run_log(
        "info",
        "amplify.project.loaded",
        json!({
            "env": env.env_name,
            "app_id": env.app_id,
            "project_name": env.project_name,
            "stack": env.stack_name,
            "region": env.region
        }),
    );
    Ok(env)
}

fn parse_team_provider(text: &str) -> Result<BTreeMap<String, TeamProviderEntry>, PushardError> {
    serde_json::from_str(text)
        .map_err(|e| PushardError::ConfigParse(format!("team-provider-info.json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::load_amplify_env;
    use crate::errors::PushardError;
    use crate::runtime::FakeFileSystem;
    use std::path::Path;

    const TEAM_PROVIDER: &str = r#"{
        "test": {
            "awscloudformation": {
                "AuthRoleName": "amplify-shop-test-1234-authRole",
                "Region": "eu-west-1",
                "StackId": "arn:aws:cloudformation:eu-west-1:1:stack/amplify-shop-test-1234/x",
                "StackName": "amplify-shop-test-1234",
                "AmplifyAppId": "d1abc"
            },
            "categories": {}
        }
    }"#;

    fn fs() -> FakeFileSystem {
        let fs = FakeFileSystem::with_file("/p/amplify/team-provider-info.json", TEAM_PROVIDER);
        fs.insert(
            "/p/amplify/.config/project-config.json",
            r#"{"projectName":"shop","version":"3.0"}"#,
        );
        fs
    }

    #[test]
    fn loads_stack_app_region_and_project_name() {
        let env = load_amplify_env(
            &fs(),
            Path::new("/p/amplify/team-provider-info.json"),
            Path::new("/p/amplify/.config/project-config.json"),
            "test",
        )
        .expect("loaded");
        assert_eq!(env.app_id, "d1abc");
        assert_eq!(env.region, "eu-west-1");
        assert_eq!(env.project_name, "shop");
        assert!(env.stack_name.contains("amplify-shop-test-1234"));
    }

    #[test]
    fn unknown_env_is_invalid_config() {
        let err = load_amplify_env(
            &fs(),
            Path::new("/p/amplify/team-provider-info.json"),
            Path::new("/p/amplify/.config/project-config.json"),
            "demo",
        )
        .expect_err("fails");
        assert!(matches!(err, PushardError::InvalidConfig(message) if message.contains("demo")));
    }

    #[test]
    fn malformed_json_is_config_parse_error() {
        let fs = FakeFileSystem::with_file("/p/tpi.json", "{not json");
        let err = load_amplify_env(&fs, Path::new("/p/tpi.json"), Path::new("/p/pc.json"), "test")
            .expect_err("fails");
        assert!(matches!(err, PushardError::ConfigParse(_)));
    }
}
