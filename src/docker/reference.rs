//! Image reference helpers

use crate::error::{ContmanError, Result};

/// Registry used for references without an explicit domain
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Registry domain an image reference resolves to
///
/// `alpine` and `library/alpine` live on Docker Hub; the first path component
/// is only a domain when it looks like one (contains `.` or `:`, or is
/// `localhost`).
pub fn registry_domain(image: &str) -> Result<&str> {
    validate(image)?;

    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            Ok(first)
        }
        _ => Ok(DEFAULT_REGISTRY),
    }
}

/// Reference with an explicit tag, defaulting to `latest`
pub fn with_default_tag(image: &str) -> String {
    let name = image.rsplit('/').next().unwrap_or(image);
    if name.contains(':') || name.contains('@') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

fn validate(image: &str) -> Result<()> {
    let invalid = image.is_empty()
        || image.chars().any(char::is_whitespace)
        || image.starts_with('/')
        || image.ends_with('/')
        || image.contains("//");
    if invalid {
        return Err(ContmanError::InvalidImage(image.to_string()));
    }
    Ok(())
}
