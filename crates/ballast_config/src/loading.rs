//! Loads a configuration object from a dumped parameter map, with optional
//! dotted-path overrides (highest priority).

use std::collections::BTreeMap;
use std::fs::File;
use std::ops::IndexMut;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ConfigError, ParamPath, SerializedParam};

/// Deserializes a config object from a flattened param-path map.
/// For an explanation of `for<'a> Deserialize<'a>` see
/// `<https://doc.rust-lang.org/nomicon/hrtb.html>`.
pub fn load<T: for<'a> Deserialize<'a>>(
    config_map: &BTreeMap<ParamPath, Value>,
) -> Result<T, ConfigError> {
    let mut nested_map = json!({});
    for (param_path, value) in config_map {
        let mut entry = &mut nested_map;
        for config_name in param_path.split('.') {
            entry = entry.index_mut(config_name);
        }
        *entry = value.clone();
    }
    Ok(serde_json::from_value(nested_map)?)
}

/// Reads a dumped config file and deserializes it, after applying `overrides`.
/// An override path that does not exist in the dump is rejected.
pub fn load_config_file<T: for<'a> Deserialize<'a>>(
    config_file: File,
    overrides: &BTreeMap<ParamPath, Value>,
) -> Result<T, ConfigError> {
    let dumped: BTreeMap<ParamPath, SerializedParam> = serde_json::from_reader(&config_file)?;
    let mut values_map: BTreeMap<ParamPath, Value> =
        dumped.into_iter().map(|(param_path, param)| (param_path, param.value)).collect();

    for (param_path, value) in overrides {
        if !values_map.contains_key(param_path) {
            return Err(ConfigError::UnexpectedParam { param_path: param_path.clone() });
        }
        values_map.insert(param_path.clone(), value.clone());
    }

    load(&values_map)
}
