//! Configuration utilities for ballast components.
//!
//! A configuration struct implements [`dumping::SerializeConfig`], flattening
//! itself into a map of dotted parameter paths to described values:
//!
//! ```json
//! "executor.num_concurrent_leader_movements": {
//!     "description": "Maximum number of concurrent leadership movements.",
//!     "value": 1000,
//!     "privacy": "Public"
//! }
//! ```
//!
//! Dumped files are reloaded with [`loading::load_config_file`], optionally
//! updated by dotted-path overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A nested path of a configuration parameter.
pub type ParamPath = String;
/// A description of a configuration parameter.
pub type Description = String;

/// Separator of nested configuration paths.
pub const FIELD_SEPARATOR: &str = ".";


pub mod converters;
pub mod dumping;
pub mod loading;

/// The privacy level of a config parameter, as given by the config owner.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum ParamPrivacyInput {
    /// The parameter must not appear in public config renderings.
    Private,
    /// The parameter is visible to the component's users.
    Public,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub(crate) enum ParamPrivacy {
    Private,
    Public,
}

impl From<ParamPrivacyInput> for ParamPrivacy {
    fn from(user_param_privacy: ParamPrivacyInput) -> Self {
        match user_param_privacy {
            ParamPrivacyInput::Private => ParamPrivacy::Private,
            ParamPrivacyInput::Public => ParamPrivacy::Public,
        }
    }
}

/// A description and serialized value of a configuration parameter.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SerializedParam {
    /// The description of the parameter.
    pub description: Description,
    /// The JSON value of the parameter.
    pub value: Value,
    pub(crate) privacy: ParamPrivacy,
}

impl SerializedParam {
    /// Whether the parameter is private.
    pub fn is_private(&self) -> bool {
        self.privacy == ParamPrivacy::Private
    }
}

/// Errors of the configuration dumping and loading process.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    DeserializationError(#[from] serde_json::Error),
    #[error("Received an unexpected parameter: {param_path}.")]
    UnexpectedParam { param_path: ParamPath },
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
}
