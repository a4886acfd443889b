//! Command workflows shared by the CLI.
//!
//! Each function checks the registry and workspace preconditions of one
//! command before touching the network, so a failed precondition never
//! leaves partial remote state behind.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;
use url::Url;

use crate::capture::CaptureOutcome;
use crate::client::{MockResponse, SynthClient};
use crate::error::SynthError;
use crate::openapi::ApiSpec;
use crate::registry::{Registry, RegistryStore};
use crate::validate::validate;
use crate::workspace::SpecWorkspace;

/// Remote targets for upload and initialization.
#[derive(Debug, Clone, Copy)]
pub struct RemoteTargets<'a> {
    pub bucket: &'a Url,
    pub init: &'a Url,
}

/// What `init` and `extend` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub api_name: String,
    /// Uploaded object URLs, specification first.
    pub uploaded: Vec<Url>,
    /// Body returned by the remote initializer.
    pub response: String,
}

/// Registers `api_name` for a new generation session.
///
/// ## Errors
///
/// Returns [`SynthError::AlreadyInitialized`] if the API has already been
/// initialized, since regenerating it locally would not update the remote
/// copy.
pub fn begin_generate<S: RegistryStore>(
    registry: &Registry<S>,
    api_name: &str,
) -> Result<(), SynthError> {
    if registry.status(api_name)? == Some(true) {
        return Err(SynthError::AlreadyInitialized {
            name: api_name.to_string(),
            available: registry.list_available()?,
        });
    }
    registry.add(api_name)?;
    Ok(())
}

/// Writes a captured specification, and its description if any, to the
/// workspace. Returns the specification path.
pub fn store_capture(
    workspace: &SpecWorkspace,
    api_name: &str,
    outcome: &CaptureOutcome,
) -> Result<PathBuf, SynthError> {
    let path = workspace.save_spec(api_name, &outcome.spec)?;
    if let Some(description) = &outcome.description {
        workspace.save_raw(api_name, description)?;
    }
    info!(
        "Stored specification for {} with {} endpoints",
        api_name,
        outcome.spec.endpoints().len()
    );
    Ok(path)
}

/// Uploads the specification (and description) of a pending API, triggers
/// remote initialization and marks the API as initialized.
///
/// ## Errors
///
/// - [`SynthError::UnknownApi`] if `api_name` is not registered
/// - [`SynthError::AlreadyInitialized`] if it was initialized before
/// - [`SynthError::MissingSpec`] if no specification file exists
/// - [`SynthError::Client`] if an upload or the init call fails; the
///   registry is left untouched
pub async fn initialize_api<S: RegistryStore>(
    registry: &Registry<S>,
    workspace: &SpecWorkspace,
    client: &SynthClient,
    targets: RemoteTargets<'_>,
    api_name: &str,
) -> Result<InitReport, SynthError> {
    match registry.status(api_name)? {
        None => {
            return Err(SynthError::UnknownApi {
                name: api_name.to_string(),
                available: registry.list_available()?,
            });
        }
        Some(true) => {
            return Err(SynthError::AlreadyInitialized {
                name: api_name.to_string(),
                available: registry.list_available()?,
            });
        }
        Some(false) => {}
    }

    let spec = load_required_spec(workspace, api_name)?;

    let mut uploaded = vec![client.upload_spec(targets.bucket, api_name, &spec).await?];
    if let Some(description) = workspace.load_raw(api_name)? {
        uploaded.push(client.upload_raw(targets.bucket, api_name, &description).await?);
    }

    let response = client.initialize(targets.init, api_name).await?;
    registry.mark_initialized(api_name)?;

    Ok(InitReport {
        api_name: api_name.to_string(),
        uploaded,
        response,
    })
}

/// Replaces the description of an initialized API and asks the remote side
/// to generate more sample data from it.
///
/// ## Errors
///
/// Returns [`SynthError::UnknownApi`] or [`SynthError::NotInitialized`] if
/// the API is not ready to extend, or a client error.
pub async fn extend_api<S: RegistryStore>(
    registry: &Registry<S>,
    workspace: &SpecWorkspace,
    client: &SynthClient,
    targets: RemoteTargets<'_>,
    api_name: &str,
    description: &str,
) -> Result<InitReport, SynthError> {
    match registry.status(api_name)? {
        None => {
            let available: Vec<String> = registry
                .list_all()?
                .into_iter()
                .filter(|(_, initialized)| *initialized)
                .map(|(name, _)| name)
                .collect();
            return Err(SynthError::UnknownApi {
                name: api_name.to_string(),
                available,
            });
        }
        Some(false) => {
            return Err(SynthError::NotInitialized {
                name: api_name.to_string(),
            });
        }
        Some(true) => {}
    }

    let description = description.trim();
    workspace.save_raw(api_name, description)?;
    let uploaded = vec![client.upload_raw(targets.bucket, api_name, description).await?];
    let response = client.initialize(targets.init, api_name).await?;
    info!("Extended sample data for {}", api_name);

    Ok(InitReport {
        api_name: api_name.to_string(),
        uploaded,
        response,
    })
}

/// Validates `params` against the stored specification of `api_name` and
/// dispatches a mock request for `endpoint`.
///
/// ## Errors
///
/// - [`SynthError::MissingSpec`] if no specification file exists
/// - [`SynthError::UnknownEndpoint`] if the specification has no `method`
///   operation at `endpoint`
/// - [`SynthError::Validation`] if `params` do not satisfy the schema; no
///   request is sent
pub async fn mock_get(
    workspace: &SpecWorkspace,
    client: &SynthClient,
    mock_url: &Url,
    api_name: &str,
    method: &str,
    endpoint: &str,
    params: &BTreeMap<String, String>,
) -> Result<MockResponse, SynthError> {
    let spec = load_required_spec(workspace, api_name)?;
    let schema = spec
        .endpoint(method, endpoint)
        .ok_or_else(|| SynthError::UnknownEndpoint {
            method: method.to_uppercase(),
            path: endpoint.to_string(),
        })?;

    validate(params, &schema.parameters)?;

    Ok(client.dispatch(mock_url, api_name, endpoint, params).await?)
}

fn load_required_spec(workspace: &SpecWorkspace, api_name: &str) -> Result<ApiSpec, SynthError> {
    workspace
        .load_spec(api_name)?
        .ok_or_else(|| SynthError::MissingSpec {
            name: api_name.to_string(),
        })
}
