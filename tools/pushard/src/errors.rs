use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushardError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("git error: {0}")]
    Vcs(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("backend stack still busy after {attempts} push attempts: {status}")]
    BackendBusy { attempts: u32, status: String },
}

impl PushardError {
    /// Short machine-readable kind used in run log payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::ConfigParse(_) => "config_parse",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Cli(_) => "cli",
            Self::Input(_) => "input",
            Self::Process(_) => "process",
            Self::Vcs(_) => "vcs",
            Self::Backend(_) => "backend",
            Self::BackendBusy { .. } => "backend_busy",
        }
    }
}
