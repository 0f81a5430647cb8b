//! Serialization of config structs into a flattened, described parameter map.

use std::collections::BTreeMap;
use std::fs::File;

use serde::Serialize;

use crate::{ConfigError, ParamPath, ParamPrivacy, ParamPrivacyInput, SerializedParam, FIELD_SEPARATOR};

/// Serialization for configs.
pub trait SerializeConfig {
    /// Conversion of a configuration to a mapping of flattened parameter paths to their
    /// descriptions and values.
    fn dump(&self) -> BTreeMap<ParamPath, SerializedParam>;

    /// Writes the flattened map as pretty JSON, the format [`crate::loading::load_config_file`]
    /// reads back.
    fn dump_to_file(&self, file_path: &str) -> Result<(), ConfigError> {
        let dump = self.dump();
        serde_json::to_writer_pretty(File::create(file_path)?, &dump)?;
        Ok(())
    }
}

/// Serializes a single parameter of a config.
pub fn ser_param<T: Serialize>(
    name: &str,
    value: &T,
    description: &str,
    privacy: ParamPrivacyInput,
) -> (ParamPath, SerializedParam) {
    (
        name.to_owned(),
        SerializedParam {
            description: description.to_owned(),
            value: serde_json::to_value(value).expect("Config parameter should serialize to JSON"),
            privacy: ParamPrivacy::from(privacy),
        },
    )
}

/// Prepends `sub_config_name` to the parameter path of each entry in `sub_config_dump`.
/// In order to load from a dump properly, `sub_config_name` must match the field name of the
/// sub-config in the struct this is called from.
pub fn prepend_sub_config_name(
    sub_config_dump: BTreeMap<ParamPath, SerializedParam>,
    sub_config_name: &str,
) -> BTreeMap<ParamPath, SerializedParam> {
    BTreeMap::from_iter(
        sub_config_dump.into_iter().map(|(field_name, val)| {
            (format!("{sub_config_name}{FIELD_SEPARATOR}{field_name}"), val)
        }),
    )
}
