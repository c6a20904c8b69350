// Copyright 2018-2026 the Deno authors. MIT license.

use std::sync::Arc;

use crate::JsiError;
use crate::PropNameId;
use crate::Runtime;
use crate::Value;

/// A native object whose properties are implemented by the host.
///
/// The engine keeps the object alive for as long as script can reach the
/// wrapping JavaScript object; the `Arc` handed to
/// [`Runtime::create_object_with_host_object`] is released only after the
/// engine has collected it.
pub trait HostObject {
  fn get(
    &self,
    _rt: &mut dyn Runtime,
    _name: &PropNameId,
  ) -> Result<Value, JsiError> {
    Ok(Value::Undefined)
  }

  fn set(
    &self,
    rt: &mut dyn Runtime,
    name: &PropNameId,
    _value: &Value,
  ) -> Result<(), JsiError> {
    Err(JsiError::js(format!(
      "TypeError: Cannot assign to property '{}' on HostObject with default setter",
      rt.prop_name_id_to_utf8(name)
    )))
  }

  fn get_property_names(&self, _rt: &mut dyn Runtime) -> Vec<PropNameId> {
    Vec::new()
  }
}

/// A native function callable from script: `(runtime, this, arguments)`.
pub type HostFunction =
  Arc<dyn Fn(&mut dyn Runtime, &Value, &[Value]) -> Result<Value, JsiError>>;
