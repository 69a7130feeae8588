/// Container engine query boundary
///
/// The pipeline needs exactly two capabilities from the engine: list all
/// containers and fetch full inspection detail for one of them. Everything
/// else (transport, endpoint, API version) stays behind this trait so the
/// rest of the pipeline never touches a live socket in tests.

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use bollard::{Docker, API_DEFAULT_VERSION};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to connect to container engine: {0}")]
    Connect(#[source] bollard::errors::Error),

    #[error("container engine request failed: {0}")]
    Api(#[from] bollard::errors::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List containers. `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError>;

    /// Fetch full inspection detail for one container.
    async fn inspect_container(
        &self,
        name_or_id: &str,
    ) -> Result<ContainerInspectResponse, EngineError>;

    /// Check that the engine daemon is reachable.
    async fn ping(&self) -> Result<(), EngineError>;
}

/// Docker daemon implementation over a local socket or remote URL.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the engine. `endpoint` may be a socket path or an
    /// http/tcp URL; when absent, platform defaults apply (DOCKER_HOST,
    /// then /var/run/docker.sock).
    pub fn connect(endpoint: Option<&str>) -> Result<Self, EngineError> {
        let docker = match endpoint {
            None => Docker::connect_with_local_defaults(),
            Some(ep) if ep.starts_with("http://") || ep.starts_with("tcp://") => {
                Docker::connect_with_http(ep, 120, API_DEFAULT_VERSION)
            }
            Some(path) => Docker::connect_with_socket(path, 120, API_DEFAULT_VERSION),
        }
        .map_err(EngineError::Connect)?;

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        let options = Some(ListContainersOptions::<String> {
            all,
            ..Default::default()
        });

        Ok(self.docker.list_containers(options).await?)
    }

    async fn inspect_container(
        &self,
        name_or_id: &str,
    ) -> Result<ContainerInspectResponse, EngineError> {
        Ok(self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await?)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }
}
