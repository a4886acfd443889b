//! Library for turning free-text API documentation into a validated,
//! mockable API.
//!
//! Documentation is sent to an extraction service which returns parameter
//! candidates. These are cleaned into [`Parameter`] values, stored in an
//! OpenAPI-shaped [`ApiSpec`], and later used to [`validate`] caller
//! arguments before a request is dispatched to the mock-serving endpoint.
//!
//! ## Core Types
//!
//! - [`Parameter`] - One documented input with type and constraints
//! - [`EndpointSchema`] - The parameters of one `(method, path)` pair
//! - [`ApiSpec`] - A full specification document
//!
//! ## Extraction
//!
//! - [`DocParser`] - Documentation parser over an [`ExtractionService`]
//! - [`OpenAiExtractor`] - OpenAI-compatible chat-completions service
//! - [`clean_parameter`] / [`lint_parameters`] - Reply cleaning and advisory checks
//!
//! ## Registry and Storage
//!
//! - [`Registry`] - Add / list / mark-initialized / reset over a [`RegistryStore`]
//! - [`JsonFileRegistryStore`] - JSON file storage with file locking
//! - [`SpecWorkspace`] - Generated specification files
//!
//! ## Remote Calls
//!
//! - [`SynthClient`] - Upload, remote initialization and mock dispatch
//! - [`CaptureServer`] - Local browser form for describing an API
//! - [`initialize_api`] / [`extend_api`] / [`mock_get`] - Command workflows

mod capture;
mod client;
mod commands;
mod config;
mod error;
mod extraction;
mod openapi;
mod parser;
mod registry;
mod retry;
mod types;
mod validate;
mod workspace;

pub use capture::{CaptureHandle, CaptureOutcome, CaptureServer};
pub use client::{CLIENT_USER_AGENT, MockResponse, SynthClient};
pub use commands::{
    InitReport, RemoteTargets, begin_generate, extend_api, initialize_api, mock_get, store_capture,
};
pub use config::Config;
pub use error::{
    CaptureError, ClientError, ConfigError, ExtractionError, RegistryError, SynthError,
    ValidationError,
};
pub use extraction::OpenAiExtractor;
pub use openapi::{ApiSpec, Operation, ParameterSchema, SpecInfo, SpecParameter};
pub use parser::{
    CleanReport, DocParser, ExtractionReply, ExtractionRequest, ExtractionService,
    ParameterWarning, SYSTEM_PROMPT, build_prompt, clean_parameter, clean_parameters,
    lint_parameters, normalize_documentation, parse_reply,
};
pub use registry::{
    JsonFileRegistryStore, MemoryRegistryStore, Registry, RegistryEntry, RegistryStore,
    is_valid_api_name,
};
pub use types::{Constraints, EndpointSchema, ParamType, Parameter};
pub use validate::validate;
pub use workspace::SpecWorkspace;
