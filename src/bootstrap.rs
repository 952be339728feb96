use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use crate::access::{self, ClientLookup};
use crate::dataset::Dataset;
use crate::error::AccessError;
use crate::models::ClientProfile;

/// Where an uploaded dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    Path(PathBuf),
    Stdin,
}

/// The ways a viewer can open the dashboard. Every variant ends in the same
/// profile-plus-dataset pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBootstrap {
    SecretsLogin {
        client_id: String,
        access_code: String,
    },
    SessionLogin {
        access_code: String,
    },
    QueryParamLogin {
        query: String,
    },
    AdminUpload {
        client_name: String,
        logo: Option<PathBuf>,
        source: UploadSource,
    },
}

#[derive(Debug)]
pub struct Session {
    pub profile: ClientProfile,
    pub dataset: Dataset,
}

impl SessionBootstrap {
    /// Resolves the client profile without touching the dataset.
    pub fn authorize(&self, registry: &dyn ClientLookup) -> anyhow::Result<ClientProfile> {
        let profile = match self {
            SessionBootstrap::SecretsLogin {
                client_id,
                access_code,
            } => access::authenticate(client_id, access_code, registry)?,
            SessionBootstrap::SessionLogin { access_code } => {
                access::authenticate_code(access_code, registry)?
            }
            SessionBootstrap::QueryParamLogin { query } => {
                let (client_id, access_code) = parse_login_query(query)?;
                access::authenticate(&client_id, &access_code, registry)?
            }
            SessionBootstrap::AdminUpload {
                client_name, logo, ..
            } => {
                if client_name.trim().is_empty() {
                    bail!("admin upload needs a client name");
                }
                ClientProfile {
                    name: client_name.trim().to_string(),
                    logo: logo.clone(),
                    data: None,
                }
            }
        };
        Ok(profile)
    }

    pub fn resolve(&self, registry: &dyn ClientLookup) -> anyhow::Result<Session> {
        let profile = self.authorize(registry)?;
        let dataset = match self {
            SessionBootstrap::AdminUpload { source, .. } => load_upload(source)?,
            _ => {
                let path = profile
                    .data
                    .as_ref()
                    .with_context(|| format!("client {} has no data source configured", profile.name))?;
                Dataset::from_path(path)
                    .with_context(|| format!("failed to load dataset {}", path.display()))?
            }
        };

        info!(
            client = %profile.name,
            rows = dataset.len(),
            flagged = dataset.flagged().count(),
            "session ready"
        );
        Ok(Session { profile, dataset })
    }
}

fn load_upload(source: &UploadSource) -> anyhow::Result<Dataset> {
    match source {
        UploadSource::Path(path) => Dataset::from_path(path)
            .with_context(|| format!("failed to load uploaded dataset {}", path.display())),
        UploadSource::Stdin => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("failed to read uploaded dataset from stdin")?;
            Dataset::from_reader(buffer.as_slice()).context("failed to load uploaded dataset")
        }
    }
}

/// Extracts `client` and `code` from a URL query such as
/// `?client=acme&code=s%33cret`.
pub fn parse_login_query(query: &str) -> Result<(String, String), AccessError> {
    let query = query.trim();
    let query = query
        .split_once('?')
        .map_or(query, |(_, params)| params);

    let mut client = None;
    let mut code = None;
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode_component(value)?;
        match decode_component(key)?.as_str() {
            "client" | "client_id" => client = Some(value),
            "code" | "access_code" => code = Some(value),
            _ => {}
        }
    }

    match (client, code) {
        (Some(client), Some(code)) => Ok((client, code)),
        (None, _) => Err(AccessError::MalformedQuery("missing `client` parameter".into())),
        (_, None) => Err(AccessError::MalformedQuery("missing `code` parameter".into())),
    }
}

fn decode_component(raw: &str) -> Result<String, AccessError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|value| value.into_owned())
        .map_err(|err| AccessError::MalformedQuery(err.to_string()))
}
