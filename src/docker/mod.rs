//! Docker Engine implementation of the runtime traits
//!
//! This module provides the [`Manager`](crate::Manager) and
//! [`Container`](crate::Container) implementations used outside of tests,
//! together with the registry helpers image pulls need.

pub mod auth;
pub mod container;
pub mod manager;
pub mod reference;

pub use auth::{resolve_credentials, RegistryCredentials};
pub use container::DockerContainer;
pub use manager::{DockerManager, DOCKER_SOCKET, NETWORK_MODE};
pub use reference::{registry_domain, with_default_tag};
