// Copyright 2018-2026 the Deno authors. MIT license.

use jsi::JsiError;
use jsi::Runtime;
use jsi::Value;

use crate::config::V8RuntimeConfig;
use crate::runtime::RuntimeOptions;
use crate::runtime::V8Runtime;

/// Builds a primary runtime and tags `Error.prototype.jsEngine` so scripts
/// can tell which engine they run on.
pub fn create_v8_runtime(
  config: V8RuntimeConfig,
  options: RuntimeOptions,
) -> Result<V8Runtime, JsiError> {
  let mut runtime = V8Runtime::new(config, options);
  let rt: &mut dyn Runtime = &mut runtime;
  let error_prototype = rt
    .global()
    .get_property_as_object(rt, "Error")?
    .get_property_as_object(rt, "prototype")?;
  let engine = Value::string(rt, "v8")?;
  error_prototype.set_property(rt, "jsEngine", engine)?;
  Ok(runtime)
}
