use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::AccessError;
use crate::models::ClientProfile;

/// Read-only view of the client registry.
pub trait ClientLookup {
    fn lookup(&self, client_id: &str) -> Option<&RegisteredClient>;

    fn clients(&self) -> Box<dyn Iterator<Item = &RegisteredClient> + '_>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredClient {
    pub name: String,
    #[serde(default)]
    pub logo: Option<PathBuf>,
    #[serde(default)]
    pub data: Option<PathBuf>,
    /// Lowercase hex SHA-256 of the access code.
    pub code_sha256: String,
}

impl RegisteredClient {
    pub fn profile(&self) -> ClientProfile {
        ClientProfile {
            name: self.name.clone(),
            logo: self.logo.clone(),
            data: self.data.clone(),
        }
    }

    fn code_matches(&self, code: &str) -> bool {
        let supplied = hash_access_code(code);
        let stored = self.code_sha256.trim().to_ascii_lowercase();
        supplied.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

/// Clients keyed by normalised identifier, loaded from a TOML table per client.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, RegisteredClient>,
}

impl ClientRegistry {
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let parsed: BTreeMap<String, RegisteredClient> =
            toml::from_str(raw).context("client registry is not valid TOML")?;
        let mut clients = BTreeMap::new();
        for (raw_id, client) in parsed {
            let client_id = normalize_client_id(&raw_id);
            if clients.contains_key(&client_id) {
                bail!("duplicate client id `{raw_id}` (normalises to `{client_id}`)");
            }
            clients.insert(client_id, client);
        }
        Ok(ClientRegistry { clients })
    }

    /// Loads the registry file. Relative data and logo paths are resolved
    /// against the registry's own directory.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read client registry {}", path.display()))?;
        let mut registry = Self::from_toml(&raw)
            .with_context(|| format!("failed to parse client registry {}", path.display()))?;

        if let Some(base) = path.parent() {
            for client in registry.clients.values_mut() {
                client.data = client.data.take().map(|data| base.join(data));
                client.logo = client.logo.take().map(|logo| base.join(logo));
            }
        }

        debug!(clients = registry.len(), "client registry loaded");
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

impl ClientLookup for ClientRegistry {
    fn lookup(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    fn clients(&self) -> Box<dyn Iterator<Item = &RegisteredClient> + '_> {
        Box::new(self.clients.values())
    }
}

pub fn normalize_client_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn hash_access_code(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.as_bytes()))
}

/// Grants access when `client_id` is registered and `code` matches its
/// stored digest.
pub fn authenticate(
    client_id: &str,
    code: &str,
    registry: &dyn ClientLookup,
) -> Result<ClientProfile, AccessError> {
    let client_id = normalize_client_id(client_id);
    let Some(client) = registry.lookup(&client_id) else {
        warn!(client_id = %client_id, "login rejected: unknown client");
        return Err(AccessError::UnknownClient);
    };

    if !client.code_matches(code) {
        warn!(client_id = %client_id, "login rejected: access code mismatch");
        return Err(AccessError::BadAccessCode);
    }

    debug!(client_id = %client_id, "login accepted");
    Ok(client.profile())
}

/// Resolves a client from the access code alone. Every entry is checked so
/// the time taken does not depend on which client matched.
pub fn authenticate_code(
    code: &str,
    registry: &dyn ClientLookup,
) -> Result<ClientProfile, AccessError> {
    let mut matched: Option<&RegisteredClient> = None;
    for client in registry.clients() {
        if client.code_matches(code) && matched.is_none() {
            matched = Some(client);
        }
    }

    match matched {
        Some(client) => Ok(client.profile()),
        None => {
            warn!("login rejected: access code matched no client");
            Err(AccessError::BadAccessCode)
        }
    }
}
