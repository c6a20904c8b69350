// Copyright 2018-2026 the Deno authors. MIT license.

//! Conversions between `jsi` handles and V8 locals.
//!
//! Reference values become [`V8PointerValue`] cells; primitives are copied.
//! Casting functions panic when a handle does not hold the expected kind,
//! which only happens when a caller breaks the `jsi` typing contract.

use jsi::Array;
use jsi::ArrayBuffer;
use jsi::Function;
use jsi::JsString;
use jsi::Object;
use jsi::PropNameId;
use jsi::Symbol;
use jsi::Value;
use jsi::WeakObject;

use crate::pointer_value::V8PointerValue;
use crate::pointer_value::cell;

fn boxed(
  scope: &mut v8::PinScope,
  value: v8::Local<v8::Value>,
) -> Box<dyn jsi::PointerValue> {
  Box::new(V8PointerValue::new(scope, value))
}

pub fn to_jsi_value(
  scope: &mut v8::PinScope,
  value: v8::Local<v8::Value>,
) -> Value {
  if value.is_undefined() {
    Value::Undefined
  } else if value.is_null() {
    Value::Null
  } else if value.is_boolean() {
    Value::Bool(value.is_true())
  } else if let Ok(number) = v8::Local::<v8::Number>::try_from(value) {
    Value::Number(number.value())
  } else if value.is_string() {
    Value::String(JsString::from_pointer(boxed(scope, value)))
  } else if value.is_symbol() {
    Value::Symbol(Symbol::from_pointer(boxed(scope, value)))
  } else if value.is_object() {
    Value::Object(Object::from_pointer(boxed(scope, value)))
  } else {
    // BigInt and engine-internal values have no jsi counterpart.
    Value::Undefined
  }
}

pub fn to_jsi_string(
  scope: &mut v8::PinScope,
  string: v8::Local<v8::String>,
) -> JsString {
  JsString::from_pointer(boxed(scope, string.into()))
}

pub fn to_jsi_prop_name(
  scope: &mut v8::PinScope,
  name: v8::Local<v8::String>,
) -> PropNameId {
  PropNameId::from_pointer(boxed(scope, name.into()))
}

pub fn to_jsi_object(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
) -> Object {
  Object::from_pointer(boxed(scope, object.into()))
}

pub fn to_jsi_array(
  scope: &mut v8::PinScope,
  array: v8::Local<v8::Array>,
) -> Array {
  Array::from_pointer(boxed(scope, array.into()))
}

pub fn to_jsi_function(
  scope: &mut v8::PinScope,
  function: v8::Local<v8::Function>,
) -> Function {
  Function::from_pointer(boxed(scope, function.into()))
}

pub fn to_jsi_weak_object(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
) -> WeakObject {
  WeakObject::from_pointer(Box::new(V8PointerValue::new_weak(
    scope,
    object.into(),
  )))
}

pub fn to_v8_value<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  value: &Value,
) -> v8::Local<'s, v8::Value> {
  match value {
    Value::Undefined => v8::undefined(scope).into(),
    Value::Null => v8::null(scope).into(),
    Value::Bool(b) => v8::Boolean::new(scope, *b).into(),
    Value::Number(n) => v8::Number::new(scope, *n).into(),
    Value::Symbol(s) => cell(s.pointer()).get(scope),
    Value::String(s) => cell(s.pointer()).get(scope),
    Value::Object(o) => cell(o.pointer()).get(scope),
  }
}

pub fn to_v8_string<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  string: &JsString,
) -> v8::Local<'s, v8::String> {
  cell(string.pointer())
    .get(scope)
    .try_into()
    .expect("JsString does not hold a string")
}

pub fn to_v8_prop_name<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  name: &PropNameId,
) -> v8::Local<'s, v8::String> {
  cell(name.pointer())
    .get(scope)
    .try_into()
    .expect("PropNameId does not hold a string")
}

pub fn to_v8_symbol<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  symbol: &Symbol,
) -> v8::Local<'s, v8::Symbol> {
  cell(symbol.pointer())
    .get(scope)
    .try_into()
    .expect("Symbol does not hold a symbol")
}

pub fn to_v8_object<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  object: &Object,
) -> v8::Local<'s, v8::Object> {
  cell(object.pointer())
    .get(scope)
    .try_into()
    .expect("Object does not hold an object")
}

pub fn to_v8_array<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  array: &Array,
) -> v8::Local<'s, v8::Array> {
  cell(array.pointer())
    .get(scope)
    .try_into()
    .expect("Array does not hold an array")
}

pub fn to_v8_array_buffer<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  buffer: &ArrayBuffer,
) -> v8::Local<'s, v8::ArrayBuffer> {
  cell(buffer.pointer())
    .get(scope)
    .try_into()
    .expect("ArrayBuffer does not hold an ArrayBuffer")
}

pub fn to_v8_function<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  function: &Function,
) -> v8::Local<'s, v8::Function> {
  cell(function.pointer())
    .get(scope)
    .try_into()
    .expect("Function does not hold a function")
}

/// Converts a slice of arguments for a call into the engine.
pub fn to_v8_args<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  args: &[Value],
) -> Vec<v8::Local<'s, v8::Value>> {
  args.iter().map(|arg| to_v8_value(scope, arg)).collect()
}

/// Converts the arguments of a native callback.
pub fn to_jsi_args(
  scope: &mut v8::PinScope,
  args: &v8::FunctionCallbackArguments,
) -> Vec<Value> {
  (0..args.length())
    .map(|i| to_jsi_value(scope, args.get(i)))
    .collect()
}
