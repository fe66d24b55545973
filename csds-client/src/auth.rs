//! Authenticated connections to the control plane.
//!
//! Credentials are resolved from the platform and authentication mode before
//! any network activity, so configuration problems surface first.

use std::path::Path;

use google_cloud_auth::credentials::{self, CacheableResource, Credentials};
use http::{Extensions, HeaderMap};
use tracing::debug;

use crate::client::config::{AuthnMode, Platform, SessionOptions};
use crate::error::{Error, Result};
use crate::matcher::{NodeSelection, GCP_PROJECT_NUMBER_KEY};
use crate::transport::tonic::TonicTransport;

/// Connect to the control plane named in `options`.
///
/// In [`AuthnMode::Auto`] the project number taken from `selection` is sent
/// as the user project of every stream.
pub async fn connect(
    options: &SessionOptions,
    selection: &NodeSelection,
) -> Result<TonicTransport> {
    let (credentials, user_project) = match (options.platform, options.authn_mode) {
        (Platform::Gcp, AuthnMode::Jwt) => {
            let path = options.jwt_file.as_deref().ok_or_else(|| {
                Error::Credentials("jwt authentication requires a jwt file".to_string())
            })?;
            (service_account_credentials(path)?, None)
        }
        (Platform::Gcp, AuthnMode::Auto) => {
            let project = selection.value_by_key(GCP_PROJECT_NUMBER_KEY);
            (default_credentials()?, Some(project).filter(|p| !p.is_empty()))
        }
    };
    debug!(
        platform = %options.platform,
        authn_mode = %options.authn_mode,
        "resolved credentials"
    );

    let transport = TonicTransport::connect(&options.uri)
        .await?
        .with_credentials(credentials);
    match user_project {
        Some(project) => transport.with_user_project(project),
        None => Ok(transport),
    }
}

fn service_account_credentials(path: &Path) -> Result<Credentials> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    let key: serde_json::Value = serde_json::from_str(&contents)?;
    credentials::service_account::Builder::new(key)
        .build()
        .map_err(|e| Error::Credentials(e.to_string()))
}

fn default_credentials() -> Result<Credentials> {
    credentials::Builder::default()
        .build()
        .map_err(|e| Error::Credentials(e.to_string()))
}

/// Fetch the request headers carrying `credentials`.
pub(crate) async fn headers(credentials: &Credentials) -> Result<HeaderMap> {
    match credentials
        .headers(Extensions::new())
        .await
        .map_err(|e| Error::Credentials(e.to_string()))?
    {
        CacheableResource::New { data, .. } => Ok(data),
        CacheableResource::NotModified => Err(Error::Credentials(
            "credentials returned no headers".to_string(),
        )),
    }
}
