//! Registry credential lookup from the Docker client config
//!
//! Reads `auths` from `$DOCKER_CONFIG/config.json` (or `~/.docker/config.json`).
//! Credential helpers are not consulted; a registry without a stored entry is
//! pulled anonymously.

use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use super::reference::DEFAULT_REGISTRY;
use crate::error::Result;

const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Username and password stored for one registry
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RegistryCredentials {
    pub fn into_docker(self, registry: &str) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.username),
            password: Some(self.password),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }
    }
}

/// Location of the Docker client config file
pub fn config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker").join("config.json"))
}

/// Credentials stored for `registry`, if any
///
/// A missing or unreadable config file means anonymous access.
pub fn resolve_credentials(registry: &str) -> Option<RegistryCredentials> {
    let path = config_path()?;
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            log::debug!("No Docker config at {}: {}", path.display(), e);
            return None;
        }
    };

    match credentials_from_config(&contents, registry) {
        Ok(credentials) => credentials,
        Err(e) => {
            log::warn!("Ignoring unreadable Docker config {}: {}", path.display(), e);
            None
        }
    }
}

/// Look up `registry` in the JSON contents of a Docker client config
pub fn credentials_from_config(contents: &str, registry: &str) -> Result<Option<RegistryCredentials>> {
    let config: DockerConfigFile = serde_json::from_str(contents)?;

    let found = candidate_keys(registry)
        .iter()
        .find_map(|key| config.auths.get(key))
        .and_then(decode_entry);

    Ok(found)
}

fn candidate_keys(registry: &str) -> Vec<String> {
    let mut keys = vec![
        registry.to_string(),
        format!("https://{}", registry),
        format!("https://{}/v1/", registry),
        format!("http://{}", registry),
    ];
    if registry == DEFAULT_REGISTRY {
        keys.push(DOCKER_HUB_INDEX.to_string());
        keys.push("index.docker.io".to_string());
        keys.push("registry-1.docker.io".to_string());
    }
    keys
}

fn decode_entry(entry: &AuthEntry) -> Option<RegistryCredentials> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Some(RegistryCredentials {
            username: username.clone(),
            password: password.clone(),
        });
    }

    let encoded = entry.auth.as_deref()?;
    let decoded = match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::warn!("Ignoring malformed registry auth entry: {}", e);
            return None;
        }
    };
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(RegistryCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(user_pass: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(user_pass)
    }

    #[test]
    fn test_plain_registry_key() {
        let config = format!(
            r#"{{"auths": {{"ghcr.io": {{"auth": "{}"}}}}}}"#,
            encoded("octocat:s3cret")
        );
        let credentials = credentials_from_config(&config, "ghcr.io").unwrap().unwrap();
        assert_eq!(credentials.username, "octocat");
        assert_eq!(credentials.password, "s3cret");
    }

    #[test]
    fn test_docker_hub_index_alias() {
        let config = format!(
            r#"{{"auths": {{"https://index.docker.io/v1/": {{"auth": "{}"}}}}}}"#,
            encoded("hubuser:pa:ss")
        );
        let credentials = credentials_from_config(&config, "docker.io").unwrap().unwrap();
        assert_eq!(credentials.username, "hubuser");
        assert_eq!(credentials.password, "pa:ss");
    }

    #[test]
    fn test_explicit_username_password() {
        let config = r#"{"auths": {"https://registry.example.com": {"username": "ci", "password": "token"}}}"#;
        let credentials = credentials_from_config(config, "registry.example.com")
            .unwrap()
            .unwrap();
        assert_eq!(credentials.username, "ci");
    }

    #[test]
    fn test_unknown_registry_is_anonymous() {
        let config = r#"{"auths": {"ghcr.io": {"auth": "Zm9vOmJhcg=="}}, "credsStore": "desktop"}"#;
        assert!(credentials_from_config(config, "quay.io").unwrap().is_none());
        assert!(credentials_from_config("{}", "ghcr.io").unwrap().is_none());
    }

    #[test]
    fn test_malformed_auth_is_ignored() {
        let config = r#"{"auths": {"ghcr.io": {"auth": "%%%not-base64"}}}"#;
        assert!(credentials_from_config(config, "ghcr.io").unwrap().is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(credentials_from_config("not json", "ghcr.io").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = RegistryCredentials {
            username: "octocat".to_string(),
            password: "s3cret".to_string(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("octocat"));
        assert!(!rendered.contains("s3cret"));
    }
}
