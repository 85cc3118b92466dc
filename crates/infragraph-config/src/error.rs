use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "No configuration file found. Looked for:\n\
        - current directory: infragraph.local.yaml, .infragraph.local.yaml, infragraph.yaml, .infragraph.yaml\n\
        - the ./.infragraph/ directory\n\
        - <config dir>/infragraph/config.yaml\n\
        A path can also be given with INFRAGRAPH_CONFIG_PATH"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid lifecycle override {0:?}, expected Kind=Lifecycle")]
    InvalidOverride(String),

    #[error(transparent)]
    Engine(#[from] infragraph::EngineError),

    #[error(transparent)]
    Parsed(#[from] infragraph::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
