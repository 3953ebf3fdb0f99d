//! Adapter from `testcontainers` images to the lifecycle [`Container`]
//! contract.

use async_trait::async_trait;
use config::split_image;
use errors::ContainerError;
use hb_core::{Container, ResourceKey};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, Image, ImageExt};
use tracing::{debug, info};

use crate::unique_id;

enum State<I: Image> {
    Pending(ContainerRequest<I>),
    Running(ContainerAsync<I>),
    Stopped
}

/// One container built from a testcontainers [`Image`].
///
/// The image name and tag come from the [`ResourceKey`]; a shared-network
/// key joins `network`, and its alias becomes the container name so other
/// containers on the network can resolve it.
pub struct TestcontainersContainer<I: Image> {
    image: String,
    aliases: Vec<String>,
    state: State<I>
}

impl<I: Image> TestcontainersContainer<I> {
    pub fn new(image: I, key: &ResourceKey, network: &str) -> Self {
        let (name, tag) = split_image(key.image());
        let mut request = image.with_name(name).with_tag(tag);
        let mut aliases = Vec::new();

        if key.shared_network() {
            request = request.with_network(network);
            let container_name = match key.network_alias() {
                Some(alias) => {
                    aliases.push(alias.to_string());
                    alias.to_string()
                }
                None => unique_id("harbor")
            };
            request = request.with_container_name(container_name);
        }

        Self {
            image: key.image().to_string(),
            aliases,
            state: State::Pending(request)
        }
    }

    fn running(&self, operation: &str) -> Result<&ContainerAsync<I>, ContainerError> {
        match &self.state {
            State::Running(container) => Ok(container),
            _ => Err(ContainerError::new(operation, format!("{} is not running", self.image)))
        }
    }
}

#[async_trait]
impl<I: Image> Container for TestcontainersContainer<I> {
    fn image(&self) -> &str {
        &self.image
    }

    async fn start(&mut self) -> Result<(), ContainerError> {
        let request = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Pending(request) => request,
            State::Running(container) => {
                self.state = State::Running(container);
                return Ok(());
            }
            State::Stopped => {
                return Err(ContainerError::new("start", format!("{} was already stopped", self.image)));
            }
        };

        let container = request
            .start()
            .await
            .map_err(|e| ContainerError::new("start", e))?;
        info!(image = %self.image, id = %container.id(), "Container started");
        self.state = State::Running(container);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ContainerError> {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running(container) => {
                debug!(image = %self.image, id = %container.id(), "Stopping container");
                container
                    .stop()
                    .await
                    .map_err(|e| ContainerError::new("stop", e))?;
                container.rm().await.map_err(|e| ContainerError::new("remove", e))
            }
            State::Pending(_) | State::Stopped => Ok(())
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    async fn host(&self) -> Result<String, ContainerError> {
        let host = self
            .running("host")?
            .get_host()
            .await
            .map_err(|e| ContainerError::new("host", e))?;
        Ok(host.to_string())
    }

    async fn mapped_port(&self, internal_port: u16) -> Result<u16, ContainerError> {
        self.running("mapped_port")?
            .get_host_port_ipv4(internal_port)
            .await
            .map_err(|e| ContainerError::new("mapped_port", e))
    }

    fn network_aliases(&self) -> Vec<String> {
        self.aliases.clone()
    }
}
