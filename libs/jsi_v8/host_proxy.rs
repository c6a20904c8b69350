// Copyright 2018-2026 the Deno authors. MIT license.

//! Engine objects backed by host code.
//!
//! A host object is an instance of a per-isolate template whose single
//! internal field points at a [`HostObjectProxy`]; named-property
//! interceptors forward to the [`HostObject`]. A host function is a
//! container function forwarding to a raw function whose callback data is
//! the [`HostFunctionProxy`]; a private property on the container marks it
//! as host-backed.
//!
//! Each proxy is owned by the finalizer of a weak handle on its object, so
//! it is released once the engine collects the object, or at isolate
//! teardown for objects still alive then.

use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Arc;

use jsi::HostFunction;
use jsi::HostObject;

use crate::converter;
use crate::error;
use crate::isolate::IsolateState;
use crate::runtime::BridgeState;
use crate::runtime::ScopedRuntime;

const HOST_OBJECT_FIELD: usize = 0;
const HOST_FUNCTION_MARKER: &str = "__hostFunctionProxy";

#[derive(Clone)]
struct HostObjectProxy {
  bridge: Rc<BridgeState>,
  host_object: Arc<dyn HostObject>,
}

#[derive(Clone)]
struct HostFunctionProxy {
  bridge: Rc<BridgeState>,
  func: HostFunction,
}

fn bind_finalizer<T: 'static>(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
  proxy: Box<T>,
) {
  let state = IsolateState::get(scope);
  let id = state.next_proxy_id();
  let weak = v8::Weak::with_finalizer(
    scope,
    object,
    Box::new(move |isolate: &mut v8::Isolate| {
      IsolateState::get(isolate).forget_proxy(id);
      drop(proxy);
    }),
  );
  state.track_proxy(id, weak);
}

fn external_value(
  value: Option<v8::Local<v8::Value>>,
) -> Option<*mut c_void> {
  let external = v8::Local::<v8::External>::try_from(value?).ok()?;
  Some(external.value())
}

fn host_object_template<'s>(
  scope: &mut v8::PinScope<'s, '_>,
) -> v8::Local<'s, v8::ObjectTemplate> {
  let state = IsolateState::get(scope);
  if let Some(template) = state.host_object_template.borrow().as_ref() {
    return v8::Local::new(scope, template);
  }

  let template = v8::ObjectTemplate::new(scope);
  template.set_internal_field_count(HOST_OBJECT_FIELD + 1);
  template.set_named_property_handler(
    v8::NamedPropertyHandlerConfiguration::new()
      .getter(host_object_getter)
      .setter(host_object_setter)
      .enumerator(host_object_enumerator),
  );
  *state.host_object_template.borrow_mut() =
    Some(v8::Global::new(scope, template));
  template
}

fn host_object_proxy(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
) -> Option<HostObjectProxy> {
  if object.internal_field_count() != HOST_OBJECT_FIELD + 1 {
    return None;
  }
  let field = object.get_internal_field(scope, HOST_OBJECT_FIELD)?;
  let ptr = external_value(field.try_into().ok())?;
  // SAFETY: the field is only ever set by `new_host_object`, and the proxy
  // outlives the object that points at it.
  let proxy = unsafe { &*(ptr as *const HostObjectProxy) };
  Some(proxy.clone())
}

pub(crate) fn new_host_object<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  bridge: Rc<BridgeState>,
  host_object: Arc<dyn HostObject>,
) -> Option<v8::Local<'s, v8::Object>> {
  let template = host_object_template(scope);
  let object = template.new_instance(scope)?;
  let proxy = Box::new(HostObjectProxy {
    bridge,
    host_object,
  });
  let ptr = &*proxy as *const HostObjectProxy as *mut c_void;
  let external = v8::External::new(scope, ptr);
  object.set_internal_field(HOST_OBJECT_FIELD, external.into());
  bind_finalizer(scope, object, proxy);
  Some(object)
}

pub(crate) fn is_host_object(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
) -> bool {
  host_object_proxy(scope, object).is_some()
}

pub(crate) fn host_object_of(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
) -> Option<Arc<dyn HostObject>> {
  host_object_proxy(scope, object).map(|proxy| proxy.host_object)
}

fn host_object_getter<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  key: v8::Local<'s, v8::Name>,
  args: v8::PropertyCallbackArguments<'s>,
  mut rv: v8::ReturnValue<'s, v8::Value>,
) -> v8::Intercepted {
  // Symbol-keyed lookups fall through to the ordinary object.
  let Ok(key) = v8::Local::<v8::String>::try_from(key) else {
    return v8::Intercepted::No;
  };
  let Some(proxy) = host_object_proxy(scope, args.holder()) else {
    return v8::Intercepted::No;
  };

  let name = converter::to_jsi_prop_name(scope, key);
  let result = {
    let mut rt = ScopedRuntime::new(scope, proxy.bridge);
    proxy.host_object.get(&mut rt, &name)
  };
  match result {
    Ok(value) => {
      let value = converter::to_v8_value(scope, &value);
      rv.set(value);
    }
    Err(err) => error::throw(scope, &err),
  }
  v8::Intercepted::Yes
}

fn host_object_setter<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  key: v8::Local<'s, v8::Name>,
  value: v8::Local<'s, v8::Value>,
  args: v8::PropertyCallbackArguments<'s>,
  _rv: v8::ReturnValue<'s, ()>,
) -> v8::Intercepted {
  let Ok(key) = v8::Local::<v8::String>::try_from(key) else {
    return v8::Intercepted::No;
  };
  let Some(proxy) = host_object_proxy(scope, args.holder()) else {
    return v8::Intercepted::No;
  };

  let name = converter::to_jsi_prop_name(scope, key);
  let value = converter::to_jsi_value(scope, value);
  let result = {
    let mut rt = ScopedRuntime::new(scope, proxy.bridge);
    proxy.host_object.set(&mut rt, &name, &value)
  };
  if let Err(err) = result {
    error::throw(scope, &err);
  }
  v8::Intercepted::Yes
}

fn host_object_enumerator<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  args: v8::PropertyCallbackArguments<'s>,
  mut rv: v8::ReturnValue<'s, v8::Array>,
) {
  let Some(proxy) = host_object_proxy(scope, args.holder()) else {
    return;
  };

  let names = {
    let mut rt = ScopedRuntime::new(scope, proxy.bridge);
    proxy.host_object.get_property_names(&mut rt)
  };
  let names = names
    .iter()
    .map(|name| converter::to_v8_prop_name(scope, name).into())
    .collect::<Vec<v8::Local<v8::Value>>>();
  let array = v8::Array::new_with_elements(scope, &names);
  rv.set(array);
}

fn host_function_marker<'s>(
  scope: &mut v8::PinScope<'s, '_>,
) -> Option<v8::Local<'s, v8::Private>> {
  let name = v8::String::new(scope, HOST_FUNCTION_MARKER)?;
  Some(v8::Private::for_api(scope, Some(name)))
}

/// Wraps `func` in two functions: a raw one whose callback data is the proxy,
/// and the container returned to callers. The container carries the
/// marker and forwards every call to the raw function.
pub(crate) fn new_host_function<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  bridge: Rc<BridgeState>,
  name: v8::Local<'s, v8::String>,
  param_count: u32,
  func: HostFunction,
) -> Option<v8::Local<'s, v8::Function>> {
  let proxy = Box::new(HostFunctionProxy { bridge, func });
  let ptr = &*proxy as *const HostFunctionProxy as *mut c_void;
  let external = v8::External::new(scope, ptr);
  let length = i32::try_from(param_count).unwrap_or(i32::MAX);

  let raw = v8::Function::builder(call_host_function)
    .data(external.into())
    .length(length)
    .build(scope)?;
  raw.set_name(name);
  bind_finalizer(scope, raw.into(), proxy);

  let container = v8::Function::builder(call_container)
    .data(raw.into())
    .length(length)
    .build(scope)?;
  container.set_name(name);
  let marker = host_function_marker(scope)?;
  container.set_private(scope, marker, external.into());
  Some(container)
}

fn host_function_proxy(
  scope: &mut v8::PinScope,
  function: v8::Local<v8::Function>,
) -> Option<HostFunctionProxy> {
  let marker = host_function_marker(scope)?;
  if !function.has_private(scope, marker).unwrap_or(false) {
    return None;
  }
  let ptr = external_value(function.get_private(scope, marker))?;
  // SAFETY: the marker is only ever set by `new_host_function`, and the
  // proxy outlives the function carrying it.
  let proxy = unsafe { &*(ptr as *const HostFunctionProxy) };
  Some(proxy.clone())
}

pub(crate) fn is_host_function(
  scope: &mut v8::PinScope,
  function: v8::Local<v8::Function>,
) -> bool {
  host_function_proxy(scope, function).is_some()
}

pub(crate) fn host_function_of(
  scope: &mut v8::PinScope,
  function: v8::Local<v8::Function>,
) -> Option<HostFunction> {
  host_function_proxy(scope, function).map(|proxy| proxy.func)
}

fn call_container<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  args: v8::FunctionCallbackArguments<'s>,
  mut rv: v8::ReturnValue,
) {
  let Ok(raw) = v8::Local::<v8::Function>::try_from(args.data()) else {
    return;
  };
  let arguments = (0..args.length())
    .map(|i| args.get(i))
    .collect::<Vec<_>>();
  if let Some(result) = raw.call(scope, args.this().into(), &arguments) {
    rv.set(result);
  }
}

fn call_host_function<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  args: v8::FunctionCallbackArguments<'s>,
  mut rv: v8::ReturnValue,
) {
  let Some(ptr) = external_value(Some(args.data())) else {
    return;
  };
  // SAFETY: the data was set by `new_host_function`; the proxy is freed
  // only after the function has been collected.
  let proxy = unsafe { &*(ptr as *const HostFunctionProxy) }.clone();

  let this = converter::to_jsi_value(scope, args.this().into());
  let arguments = converter::to_jsi_args(scope, &args);
  let result = {
    let mut rt = ScopedRuntime::new(scope, proxy.bridge);
    (proxy.func)(&mut rt, &this, &arguments)
  };
  match result {
    Ok(value) => {
      let value = converter::to_v8_value(scope, &value);
      rv.set(value);
    }
    Err(err) => {
      log::debug!("host function failed: {}", err.message());
      error::throw(scope, &err);
    }
  }
}
