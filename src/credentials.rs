// Credential resolution
// Passwords come inline, from the environment, or from a mounted secret
// directory laid out as <root>/<namespace>/<name>/<key>
//
// Numan Thabit 2025 Nov

use crate::config::{CredentialSource, SecretRef};
use crate::errors::ExporterError;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
}

impl SecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn fetch(&self, secret: &SecretRef) -> Result<String, ExporterError> {
        let dir = self.root.join(&secret.namespace).join(&secret.name);
        if !dir.is_dir() {
            return Err(ExporterError::Credential(format!(
                "failed to find secret {}/{}",
                secret.namespace, secret.name
            )));
        }
        let path = dir.join(&secret.key);
        if !path.is_file() {
            return Err(ExporterError::Credential(format!(
                "failed to find field {} in secret {}/{}",
                secret.key, secret.namespace, secret.name
            )));
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ExporterError::Credential(format!(
                "read field {} in secret {}/{}: {e}",
                secret.key, secret.namespace, secret.name
            ))
        })?;
        Ok(raw.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }

    pub fn resolve(&self, source: &CredentialSource) -> Result<String, ExporterError> {
        if let Some(value) = &source.value {
            return Ok(value.clone());
        }
        if let Some(var) = &source.env {
            return std::env::var(var).map_err(|_| {
                ExporterError::Credential(format!("environment variable {var} is not set"))
            });
        }
        match &source.secret {
            Some(secret) => self.fetch(secret),
            None => Err(ExporterError::Credential("empty credential source".into())),
        }
    }
}
