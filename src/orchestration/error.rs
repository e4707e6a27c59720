use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("registry configuration error: {source}")]
    Registry {
        #[source]
        source: RegistryError,
    },
    #[error("config error: {source}")]
    Config {
        #[source]
        source: ConfigError,
    },
    #[error("session persistence error: {source}")]
    Session {
        #[source]
        source: SessionError,
    },
    #[error("failed to allocate session id: {0}")]
    SessionId(String),
}

impl From<RegistryError> for OrchestratorError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

impl From<SessionError> for OrchestratorError {
    fn from(source: SessionError) -> Self {
        Self::Session { source }
    }
}
