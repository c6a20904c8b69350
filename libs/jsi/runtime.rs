// Copyright 2018-2026 the Deno authors. MIT license.

use std::any::Any;
use std::sync::Arc;

use crate::Array;
use crate::ArrayBuffer;
use crate::Function;
use crate::HostFunction;
use crate::HostObject;
use crate::JsString;
use crate::JsiError;
use crate::Object;
use crate::PointerValue;
use crate::PropNameId;
use crate::Symbol;
use crate::Value;
use crate::WeakObject;

/// Immutable bytes of a script (or any other blob) handed to the runtime.
pub trait Buffer {
  fn data(&self) -> &[u8];

  fn size(&self) -> usize {
    self.data().len()
  }
}

/// A script held in memory as a Rust string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringBuffer(String);

impl StringBuffer {
  pub fn new(source: impl Into<String>) -> Self {
    Self(source.into())
  }
}

impl Buffer for StringBuffer {
  fn data(&self) -> &[u8] {
    self.0.as_bytes()
  }
}

impl Buffer for Vec<u8> {
  fn data(&self) -> &[u8] {
    self
  }
}

impl Buffer for String {
  fn data(&self) -> &[u8] {
    self.as_bytes()
  }
}

/// Output of [`Runtime::prepare_javascript`]. Opaque to everyone but the
/// runtime that produced it.
pub trait PreparedJavaScript: Any {
  fn as_any(&self) -> &dyn Any;

  fn source_url(&self) -> &str;
}

/// The embedding interface.
///
/// Host code programs against this trait; each engine adapter implements it
/// once. Every handle passed in must have been produced by the same runtime
/// (or one sharing its isolate).
pub trait Runtime {
  fn evaluate_javascript(
    &mut self,
    buffer: Arc<dyn Buffer>,
    source_url: &str,
  ) -> Result<Value, JsiError>;

  fn prepare_javascript(
    &mut self,
    buffer: Arc<dyn Buffer>,
    source_url: String,
  ) -> Result<Arc<dyn PreparedJavaScript>, JsiError>;

  fn evaluate_prepared_javascript(
    &mut self,
    js: &Arc<dyn PreparedJavaScript>,
  ) -> Result<Value, JsiError>;

  /// Runs pending engine tasks and microtasks. Returns whether draining is
  /// supported by this runtime.
  fn drain_microtasks(
    &mut self,
    max_microtasks_hint: i32,
  ) -> Result<bool, JsiError>;

  fn global(&mut self) -> Object;

  fn description(&self) -> String;

  fn is_inspectable(&self) -> bool;

  // Shallow clones: the new cell roots the same engine value.
  fn clone_symbol(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue>;
  fn clone_string(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue>;
  fn clone_object(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue>;
  fn clone_prop_name_id(
    &mut self,
    pv: &dyn PointerValue,
  ) -> Box<dyn PointerValue>;

  fn create_prop_name_id_from_ascii(
    &mut self,
    ascii: &[u8],
  ) -> Result<PropNameId, JsiError>;
  fn create_prop_name_id_from_utf8(
    &mut self,
    utf8: &[u8],
  ) -> Result<PropNameId, JsiError>;
  fn create_prop_name_id_from_string(
    &mut self,
    string: &JsString,
  ) -> Result<PropNameId, JsiError>;
  fn prop_name_id_to_utf8(&mut self, name: &PropNameId) -> String;
  fn prop_name_id_equals(&mut self, a: &PropNameId, b: &PropNameId) -> bool;

  fn symbol_to_string(&mut self, symbol: &Symbol) -> String;

  fn create_string_from_ascii(
    &mut self,
    ascii: &[u8],
  ) -> Result<JsString, JsiError>;
  fn create_string_from_utf8(
    &mut self,
    utf8: &[u8],
  ) -> Result<JsString, JsiError>;
  fn string_to_utf8(&mut self, string: &JsString) -> String;

  fn create_object(&mut self) -> Object;
  fn create_object_with_host_object(
    &mut self,
    host_object: Arc<dyn HostObject>,
  ) -> Result<Object, JsiError>;
  fn get_host_object(&mut self, object: &Object)
  -> Option<Arc<dyn HostObject>>;
  fn get_host_function(&mut self, function: &Function) -> Option<HostFunction>;

  fn get_property(
    &mut self,
    object: &Object,
    name: &PropNameId,
  ) -> Result<Value, JsiError>;
  fn has_property(
    &mut self,
    object: &Object,
    name: &PropNameId,
  ) -> Result<bool, JsiError>;
  fn set_property_value(
    &mut self,
    object: &Object,
    name: &PropNameId,
    value: &Value,
  ) -> Result<(), JsiError>;

  fn is_array(&mut self, object: &Object) -> bool;
  fn is_array_buffer(&mut self, object: &Object) -> bool;
  fn is_function(&mut self, object: &Object) -> bool;
  fn is_host_object(&mut self, object: &Object) -> bool;
  fn is_host_function(&mut self, function: &Function) -> bool;

  /// Enumerable, string-keyed names (indices included) of the object and its
  /// prototype chain.
  fn get_property_names(&mut self, object: &Object) -> Array;

  fn create_weak_object(&mut self, object: &Object) -> WeakObject;
  /// Returns the target object, or `undefined` once it has been collected.
  fn lock_weak_object(&mut self, weak: &WeakObject) -> Value;

  fn create_array(&mut self, length: usize) -> Result<Array, JsiError>;
  fn array_size(&mut self, array: &Array) -> usize;
  fn array_buffer_size(&mut self, buffer: &ArrayBuffer) -> usize;
  /// Lends the backing store of `buffer` to `f`.
  fn array_buffer_data(
    &mut self,
    buffer: &ArrayBuffer,
    f: &mut dyn FnMut(&mut [u8]),
  );
  fn get_value_at_index(
    &mut self,
    array: &Array,
    index: usize,
  ) -> Result<Value, JsiError>;
  fn set_value_at_index(
    &mut self,
    array: &Array,
    index: usize,
    value: &Value,
  ) -> Result<(), JsiError>;

  fn create_function_from_host_function(
    &mut self,
    name: &PropNameId,
    param_count: u32,
    func: HostFunction,
  ) -> Result<Function, JsiError>;
  fn call(
    &mut self,
    function: &Function,
    this: &Value,
    args: &[Value],
  ) -> Result<Value, JsiError>;
  fn call_as_constructor(
    &mut self,
    function: &Function,
    args: &[Value],
  ) -> Result<Value, JsiError>;

  fn strict_equals_symbol(&mut self, a: &Symbol, b: &Symbol) -> bool;
  fn strict_equals_string(&mut self, a: &JsString, b: &JsString) -> bool;
  fn strict_equals_object(&mut self, a: &Object, b: &Object) -> bool;

  fn instance_of(&mut self, object: &Object, constructor: &Function) -> bool;
}
