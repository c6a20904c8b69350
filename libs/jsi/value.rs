// Copyright 2018-2026 the Deno authors. MIT license.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::HostFunction;
use crate::HostObject;
use crate::JsiError;
use crate::Runtime;

/// An engine-owned reference held on behalf of a handle.
///
/// Each engine adapter provides one implementation. Dropping the box releases
/// the reference, possibly on a thread other than the runtime's.
pub trait PointerValue: Any + Send {
  fn as_any(&self) -> &dyn Any;
}

macro_rules! pointer_handle {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    pub struct $name(Box<dyn PointerValue>);

    impl $name {
      /// Wraps a cell produced by a runtime. Intended for runtime adapters.
      pub fn from_pointer(ptr: Box<dyn PointerValue>) -> Self {
        Self(ptr)
      }

      pub fn pointer(&self) -> &dyn PointerValue {
        &*self.0
      }
    }

    impl fmt::Debug for $name {
      fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(concat!("[", stringify!($name), "]"))
      }
    }
  };
}

pointer_handle!(
  /// A JavaScript symbol.
  Symbol
);
pointer_handle!(
  /// A JavaScript string.
  JsString
);
pointer_handle!(
  /// A property key.
  PropNameId
);
pointer_handle!(
  /// Any JavaScript object, including arrays and functions.
  Object
);
pointer_handle!(
  /// A reference to an object that does not keep it alive.
  WeakObject
);

macro_rules! object_subtype {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug)]
    pub struct $name(Object);

    impl $name {
      pub fn from_pointer(ptr: Box<dyn PointerValue>) -> Self {
        Self(Object::from_pointer(ptr))
      }

      pub fn into_object(self) -> Object {
        self.0
      }
    }

    impl Deref for $name {
      type Target = Object;

      fn deref(&self) -> &Object {
        &self.0
      }
    }

    impl From<$name> for Object {
      fn from(value: $name) -> Object {
        value.0
      }
    }
  };
}

object_subtype!(Array);
object_subtype!(ArrayBuffer);
object_subtype!(Function);

impl Symbol {
  pub fn to_string(&self, rt: &mut dyn Runtime) -> String {
    rt.symbol_to_string(self)
  }

  pub fn clone_in(&self, rt: &mut dyn Runtime) -> Symbol {
    Symbol(rt.clone_symbol(self.pointer()))
  }

  pub fn strict_equals(rt: &mut dyn Runtime, a: &Symbol, b: &Symbol) -> bool {
    rt.strict_equals_symbol(a, b)
  }
}

impl JsString {
  pub fn from_ascii(
    rt: &mut dyn Runtime,
    ascii: &str,
  ) -> Result<JsString, JsiError> {
    rt.create_string_from_ascii(ascii.as_bytes())
  }

  pub fn from_utf8(
    rt: &mut dyn Runtime,
    utf8: &str,
  ) -> Result<JsString, JsiError> {
    rt.create_string_from_utf8(utf8.as_bytes())
  }

  pub fn utf8(&self, rt: &mut dyn Runtime) -> String {
    rt.string_to_utf8(self)
  }

  pub fn clone_in(&self, rt: &mut dyn Runtime) -> JsString {
    JsString(rt.clone_string(self.pointer()))
  }

  pub fn strict_equals(
    rt: &mut dyn Runtime,
    a: &JsString,
    b: &JsString,
  ) -> bool {
    rt.strict_equals_string(a, b)
  }
}

impl PropNameId {
  pub fn for_ascii(
    rt: &mut dyn Runtime,
    ascii: &str,
  ) -> Result<PropNameId, JsiError> {
    rt.create_prop_name_id_from_ascii(ascii.as_bytes())
  }

  pub fn for_utf8(
    rt: &mut dyn Runtime,
    utf8: &str,
  ) -> Result<PropNameId, JsiError> {
    rt.create_prop_name_id_from_utf8(utf8.as_bytes())
  }

  pub fn for_string(
    rt: &mut dyn Runtime,
    string: &JsString,
  ) -> Result<PropNameId, JsiError> {
    rt.create_prop_name_id_from_string(string)
  }

  pub fn utf8(&self, rt: &mut dyn Runtime) -> String {
    rt.prop_name_id_to_utf8(self)
  }

  pub fn clone_in(&self, rt: &mut dyn Runtime) -> PropNameId {
    PropNameId(rt.clone_prop_name_id(self.pointer()))
  }

  pub fn equals(rt: &mut dyn Runtime, a: &PropNameId, b: &PropNameId) -> bool {
    rt.prop_name_id_equals(a, b)
  }
}

impl Object {
  pub fn new(rt: &mut dyn Runtime) -> Object {
    rt.create_object()
  }

  pub fn with_host_object(
    rt: &mut dyn Runtime,
    host_object: Arc<dyn HostObject>,
  ) -> Result<Object, JsiError> {
    rt.create_object_with_host_object(host_object)
  }

  pub fn clone_in(&self, rt: &mut dyn Runtime) -> Object {
    Object(rt.clone_object(self.pointer()))
  }

  pub fn strict_equals(rt: &mut dyn Runtime, a: &Object, b: &Object) -> bool {
    rt.strict_equals_object(a, b)
  }

  pub fn get_property(
    &self,
    rt: &mut dyn Runtime,
    name: &str,
  ) -> Result<Value, JsiError> {
    let name = PropNameId::for_utf8(rt, name)?;
    rt.get_property(self, &name)
  }

  pub fn get_property_by_id(
    &self,
    rt: &mut dyn Runtime,
    name: &PropNameId,
  ) -> Result<Value, JsiError> {
    rt.get_property(self, name)
  }

  pub fn has_property(
    &self,
    rt: &mut dyn Runtime,
    name: &str,
  ) -> Result<bool, JsiError> {
    let name = PropNameId::for_utf8(rt, name)?;
    rt.has_property(self, &name)
  }

  pub fn set_property(
    &self,
    rt: &mut dyn Runtime,
    name: &str,
    value: impl Into<Value>,
  ) -> Result<(), JsiError> {
    let name = PropNameId::for_utf8(rt, name)?;
    rt.set_property_value(self, &name, &value.into())
  }

  pub fn get_property_as_object(
    &self,
    rt: &mut dyn Runtime,
    name: &str,
  ) -> Result<Object, JsiError> {
    self.get_property(rt, name)?.into_object().ok_or_else(|| {
      JsiError::js(format!(
        "getPropertyAsObject: property '{name}' is not an Object"
      ))
    })
  }

  pub fn get_property_as_function(
    &self,
    rt: &mut dyn Runtime,
    name: &str,
  ) -> Result<Function, JsiError> {
    let object = self.get_property_as_object(rt, name)?;
    if !rt.is_function(&object) {
      return Err(JsiError::js(format!(
        "getPropertyAsFunction: property '{name}' is not a Function"
      )));
    }
    Ok(Function(object))
  }

  pub fn is_array(&self, rt: &mut dyn Runtime) -> bool {
    rt.is_array(self)
  }

  pub fn is_array_buffer(&self, rt: &mut dyn Runtime) -> bool {
    rt.is_array_buffer(self)
  }

  pub fn is_function(&self, rt: &mut dyn Runtime) -> bool {
    rt.is_function(self)
  }

  pub fn is_host_object(&self, rt: &mut dyn Runtime) -> bool {
    rt.is_host_object(self)
  }

  pub fn get_host_object(
    &self,
    rt: &mut dyn Runtime,
  ) -> Option<Arc<dyn HostObject>> {
    rt.get_host_object(self)
  }

  pub fn get_property_names(&self, rt: &mut dyn Runtime) -> Array {
    rt.get_property_names(self)
  }

  pub fn instance_of(&self, rt: &mut dyn Runtime, ctor: &Function) -> bool {
    rt.instance_of(self, ctor)
  }

  pub fn as_array(self, rt: &mut dyn Runtime) -> Result<Array, JsiError> {
    if rt.is_array(&self) {
      Ok(Array(self))
    } else {
      Err(JsiError::js("Object is not an array"))
    }
  }

  pub fn as_array_buffer(
    self,
    rt: &mut dyn Runtime,
  ) -> Result<ArrayBuffer, JsiError> {
    if rt.is_array_buffer(&self) {
      Ok(ArrayBuffer(self))
    } else {
      Err(JsiError::js("Object is not an ArrayBuffer"))
    }
  }

  pub fn as_function(self, rt: &mut dyn Runtime) -> Result<Function, JsiError> {
    if rt.is_function(&self) {
      Ok(Function(self))
    } else {
      Err(JsiError::js("Object is not a function"))
    }
  }
}

impl WeakObject {
  pub fn new(rt: &mut dyn Runtime, object: &Object) -> WeakObject {
    rt.create_weak_object(object)
  }

  pub fn lock(&self, rt: &mut dyn Runtime) -> Value {
    rt.lock_weak_object(self)
  }
}

impl Array {
  pub fn new(rt: &mut dyn Runtime, length: usize) -> Result<Array, JsiError> {
    rt.create_array(length)
  }

  pub fn size(&self, rt: &mut dyn Runtime) -> usize {
    rt.array_size(self)
  }

  pub fn get_value_at_index(
    &self,
    rt: &mut dyn Runtime,
    index: usize,
  ) -> Result<Value, JsiError> {
    rt.get_value_at_index(self, index)
  }

  pub fn set_value_at_index(
    &self,
    rt: &mut dyn Runtime,
    index: usize,
    value: impl Into<Value>,
  ) -> Result<(), JsiError> {
    rt.set_value_at_index(self, index, &value.into())
  }
}

impl ArrayBuffer {
  pub fn size(&self, rt: &mut dyn Runtime) -> usize {
    rt.array_buffer_size(self)
  }

  pub fn with_data(&self, rt: &mut dyn Runtime, mut f: impl FnMut(&mut [u8])) {
    rt.array_buffer_data(self, &mut f)
  }
}

impl Function {
  pub fn from_host_fn(
    rt: &mut dyn Runtime,
    name: &PropNameId,
    param_count: u32,
    func: HostFunction,
  ) -> Result<Function, JsiError> {
    rt.create_function_from_host_function(name, param_count, func)
  }

  /// Calls with `this` set to `undefined`.
  pub fn call(
    &self,
    rt: &mut dyn Runtime,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    rt.call(self, &Value::Undefined, args)
  }

  pub fn call_with_this(
    &self,
    rt: &mut dyn Runtime,
    this: &Object,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    let this = Value::Object(this.clone_in(rt));
    rt.call(self, &this, args)
  }

  pub fn call_as_constructor(
    &self,
    rt: &mut dyn Runtime,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    rt.call_as_constructor(self, args)
  }

  pub fn is_host_function(&self, rt: &mut dyn Runtime) -> bool {
    rt.is_host_function(self)
  }

  pub fn get_host_function(&self, rt: &mut dyn Runtime) -> Option<HostFunction> {
    rt.get_host_function(self)
  }
}

/// An engine-agnostic JavaScript value.
#[derive(Debug, Default)]
pub enum Value {
  #[default]
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  Symbol(Symbol),
  String(JsString),
  Object(Object),
}

impl Value {
  pub fn string(rt: &mut dyn Runtime, s: &str) -> Result<Value, JsiError> {
    Ok(Value::String(JsString::from_utf8(rt, s)?))
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Value::Undefined)
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn is_bool(&self) -> bool {
    matches!(self, Value::Bool(_))
  }

  pub fn is_number(&self) -> bool {
    matches!(self, Value::Number(_))
  }

  pub fn is_string(&self) -> bool {
    matches!(self, Value::String(_))
  }

  pub fn is_symbol(&self) -> bool {
    matches!(self, Value::Symbol(_))
  }

  pub fn is_object(&self) -> bool {
    matches!(self, Value::Object(_))
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_string(&self) -> Option<&JsString> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_symbol(&self) -> Option<&Symbol> {
    match self {
      Value::Symbol(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Value::Object(o) => Some(o),
      _ => None,
    }
  }

  pub fn into_object(self) -> Option<Object> {
    match self {
      Value::Object(o) => Some(o),
      _ => None,
    }
  }

  pub fn into_string(self) -> Option<JsString> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  /// Copies primitives and shallow-clones references.
  pub fn clone_in(&self, rt: &mut dyn Runtime) -> Value {
    match self {
      Value::Undefined => Value::Undefined,
      Value::Null => Value::Null,
      Value::Bool(b) => Value::Bool(*b),
      Value::Number(n) => Value::Number(*n),
      Value::Symbol(s) => Value::Symbol(s.clone_in(rt)),
      Value::String(s) => Value::String(s.clone_in(rt)),
      Value::Object(o) => Value::Object(o.clone_in(rt)),
    }
  }

  /// `===` semantics.
  pub fn strict_equals(rt: &mut dyn Runtime, a: &Value, b: &Value) -> bool {
    match (a, b) {
      (Value::Undefined, Value::Undefined) => true,
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::Symbol(a), Value::Symbol(b)) => rt.strict_equals_symbol(a, b),
      (Value::String(a), Value::String(b)) => rt.strict_equals_string(a, b),
      (Value::Object(a), Value::Object(b)) => rt.strict_equals_object(a, b),
      _ => false,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "null",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::Symbol(_) => "symbol",
      Value::String(_) => "string",
      Value::Object(_) => "object",
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Value::Number(n)
  }
}

impl From<i32> for Value {
  fn from(n: i32) -> Self {
    Value::Number(n as f64)
  }
}

impl From<u32> for Value {
  fn from(n: u32) -> Self {
    Value::Number(n as f64)
  }
}

impl From<Symbol> for Value {
  fn from(s: Symbol) -> Self {
    Value::Symbol(s)
  }
}

impl From<JsString> for Value {
  fn from(s: JsString) -> Self {
    Value::String(s)
  }
}

impl From<Object> for Value {
  fn from(o: Object) -> Self {
    Value::Object(o)
  }
}

impl From<Array> for Value {
  fn from(a: Array) -> Self {
    Value::Object(a.into_object())
  }
}

impl From<ArrayBuffer> for Value {
  fn from(a: ArrayBuffer) -> Self {
    Value::Object(a.into_object())
  }
}

impl From<Function> for Value {
  fn from(f: Function) -> Self {
    Value::Object(f.into_object())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  struct Dummy;

  impl PointerValue for Dummy {
    fn as_any(&self) -> &dyn Any {
      self
    }
  }

  #[test]
  fn primitive_accessors() {
    assert!(Value::default().is_undefined());
    assert_eq!(Value::from(true).as_bool(), Some(true));
    assert_eq!(Value::from(3).as_number(), Some(3.0));
    assert_eq!(Value::from(7u32).as_number(), Some(7.0));
    assert_eq!(Value::from(1.5).as_bool(), None);
    assert_eq!(Value::Null.kind(), "null");
  }

  #[test]
  fn object_subtypes_share_the_cell() {
    let func = Function::from_pointer(Box::new(Dummy));
    let value = Value::from(func);
    assert!(value.is_object());
    let object = value.into_object().unwrap();
    assert!(object.pointer().as_any().downcast_ref::<Dummy>().is_some());
    assert_eq!(format!("{:?}", object), "[Object]");
  }

  #[test]
  fn handles_move_across_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Value>();
    assert_send::<Object>();
    assert_send::<PropNameId>();
    assert_send::<WeakObject>();

    let value = Value::from(JsString::from_pointer(Box::new(Dummy)));
    let kind = std::thread::spawn(move || value.kind()).join().unwrap();
    assert_eq!(kind, "string");
  }
}
