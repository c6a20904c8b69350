// Copyright 2018-2026 the Deno authors. MIT license.

use std::any::Any;
use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use jsi::Array;
use jsi::ArrayBuffer;
use jsi::Buffer;
use jsi::Function;
use jsi::HostFunction;
use jsi::HostObject;
use jsi::JsString;
use jsi::JsiError;
use jsi::Object;
use jsi::PointerValue;
use jsi::PreparedJavaScript;
use jsi::PropNameId;
use jsi::Runtime;
use jsi::Symbol;
use jsi::Value;
use jsi::WeakObject;

use crate::code_cache;
use crate::code_cache::CodeCache;
use crate::config::V8RuntimeConfig;
use crate::converter;
use crate::error::ExceptionReport;
use crate::host::InspectorRegistry;
use crate::host::JsQueue;
use crate::host_proxy;
use crate::idle;
use crate::inspector::Inspector;
use crate::isolate::IsolateLock;
use crate::isolate::IsolateState;
use crate::isolate::JsIsolate;
use crate::platform;
use crate::pointer_value::V8PointerValue;
use crate::pointer_value::cell;

const RUNTIME_INFO_NAME: &str = "_v8runtime";

/// State shared by a runtime and every host proxy it created.
pub(crate) struct BridgeState {
  code_cache: CodeCache,
  is_shared: bool,
  idle_registered: Cell<bool>,
  inspectable: Cell<bool>,
}

impl BridgeState {
  fn new(code_cache: CodeCache, is_shared: bool) -> Self {
    Self {
      code_cache,
      is_shared,
      // Shared runtimes leave idle pumping to their primary.
      idle_registered: Cell::new(is_shared),
      inspectable: Cell::new(false),
    }
  }
}

/// Collaborators the embedder hands to a runtime at construction.
#[derive(Clone, Default)]
pub struct RuntimeOptions {
  /// Thread the runtime lives on. Debugger messages that arrive on other
  /// threads are drained through it.
  pub js_queue: Option<Arc<dyn JsQueue>>,
  /// Where the debugger page is published when the inspector is enabled.
  pub inspector_registry: Option<Arc<dyn InspectorRegistry>>,
}

struct V8PreparedJavaScript {
  lock: Arc<IsolateLock>,
  script: Option<v8::Global<v8::UnboundScript>>,
  source_url: String,
}

impl PreparedJavaScript for V8PreparedJavaScript {
  fn as_any(&self) -> &dyn Any {
    self
  }

  fn source_url(&self) -> &str {
    &self.source_url
  }
}

impl Drop for V8PreparedJavaScript {
  fn drop(&mut self) {
    let _guard = self.lock.lock();
    self.script.take();
  }
}

/// Reads `name` off `object`, or `None` if the lookup throws.
pub(crate) fn named_property<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  object: v8::Local<'s, v8::Object>,
  name: &str,
) -> Option<v8::Local<'s, v8::Value>> {
  let key = v8::String::new(scope, name)?;
  object.get(scope, key.into())
}

fn report(
  scope: &mut v8::PinScope,
  exception: Option<v8::Local<v8::Value>>,
  fallback: &str,
) -> JsiError {
  match exception {
    Some(exception) => ExceptionReport::from_exception(scope, exception).into(),
    None => JsiError::js(fallback),
  }
}

/// The `jsi` view of a runtime inside an already-entered handle scope.
///
/// Public operations of [`V8Runtime`] build one after locking the isolate;
/// host callbacks build one from the scope V8 hands them, so host code can
/// call back into the engine without re-entering the isolate.
pub(crate) struct ScopedRuntime<'a, 's, 'i> {
  scope: &'a mut v8::PinScope<'s, 'i>,
  bridge: Rc<BridgeState>,
}

impl<'a, 's, 'i> ScopedRuntime<'a, 's, 'i> {
  pub fn new(
    scope: &'a mut v8::PinScope<'s, 'i>,
    bridge: Rc<BridgeState>,
  ) -> Self {
    Self { scope, bridge }
  }

  fn clone_cell(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    let value = cell(pv).get(self.scope);
    Box::new(V8PointerValue::new(self.scope, value))
  }

  fn compile(
    &mut self,
    source: &[u8],
    source_url: &str,
  ) -> Result<v8::Global<v8::UnboundScript>, JsiError> {
    let bridge = self.bridge.clone();
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);

    let Some(source) =
      v8::String::new_from_utf8(tc, source, v8::NewStringType::Normal)
    else {
      return Err(JsiError::native(
        "createFromUtf8() - string creation failed.",
      ));
    };
    match code_cache::compile_script(tc, &bridge.code_cache, source, source_url)
    {
      Some(script) => Ok(v8::Global::new(tc, script)),
      None => {
        let exception = tc.exception();
        Err(report(tc, exception, "Script compilation failed"))
      }
    }
  }

  fn run(
    &mut self,
    script: &v8::Global<v8::UnboundScript>,
  ) -> Result<Value, JsiError> {
    let result = {
      let scope = &mut *self.scope;
      v8::tc_scope!(let tc, scope);
      let script = v8::Local::new(tc, script).bind_to_current_context(tc);
      match script.run(tc) {
        Some(value) => Ok(converter::to_jsi_value(tc, value)),
        None => {
          let exception = tc.exception();
          Err(report(tc, exception, "Script execution failed"))
        }
      }
    };
    if result.is_ok() {
      self.register_idle_task_runner();
    }
    result
  }

  fn register_idle_task_runner(&mut self) {
    if self.bridge.is_shared || self.bridge.idle_registered.get() {
      return;
    }
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    if idle::install(tc) {
      self.bridge.idle_registered.set(true);
    }
    if let Some(exception) = tc.exception() {
      log::error!(
        "Unable to register idle task runner: {}",
        exception.to_rust_string_lossy(tc)
      );
    }
  }
}

impl Runtime for ScopedRuntime<'_, '_, '_> {
  fn evaluate_javascript(
    &mut self,
    buffer: Arc<dyn Buffer>,
    source_url: &str,
  ) -> Result<Value, JsiError> {
    let script = self.compile(buffer.data(), source_url)?;
    self.run(&script)
  }

  fn prepare_javascript(
    &mut self,
    buffer: Arc<dyn Buffer>,
    source_url: String,
  ) -> Result<Arc<dyn PreparedJavaScript>, JsiError> {
    let script = self.compile(buffer.data(), &source_url)?;
    Ok(Arc::new(V8PreparedJavaScript {
      lock: IsolateState::get(self.scope).lock.clone(),
      script: Some(script),
      source_url,
    }))
  }

  fn evaluate_prepared_javascript(
    &mut self,
    js: &Arc<dyn PreparedJavaScript>,
  ) -> Result<Value, JsiError> {
    let Some(script) = js
      .as_any()
      .downcast_ref::<V8PreparedJavaScript>()
      .and_then(|prepared| prepared.script.as_ref())
    else {
      return Err(JsiError::native(
        "prepared script was not produced by a V8 runtime",
      ));
    };
    self.run(script)
  }

  fn drain_microtasks(
    &mut self,
    _max_microtasks_hint: i32,
  ) -> Result<bool, JsiError> {
    let scope = &mut *self.scope;
    platform::pump_message_loop(scope);

    v8::tc_scope!(let tc, scope);
    tc.perform_microtask_checkpoint();
    match tc.exception() {
      None => Ok(true),
      Some(exception) => Err(report(tc, Some(exception), "")),
    }
  }

  fn global(&mut self) -> Object {
    let context = self.scope.get_current_context();
    let global = context.global(self.scope);
    converter::to_jsi_object(self.scope, global)
  }

  fn description(&self) -> String {
    format!("<V8Runtime@{:p}>", Rc::as_ptr(&self.bridge))
  }

  fn is_inspectable(&self) -> bool {
    self.bridge.inspectable.get()
  }

  fn clone_symbol(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    self.clone_cell(pv)
  }

  fn clone_string(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    self.clone_cell(pv)
  }

  fn clone_object(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    self.clone_cell(pv)
  }

  fn clone_prop_name_id(
    &mut self,
    pv: &dyn PointerValue,
  ) -> Box<dyn PointerValue> {
    self.clone_cell(pv)
  }

  fn create_prop_name_id_from_ascii(
    &mut self,
    ascii: &[u8],
  ) -> Result<PropNameId, JsiError> {
    V8PointerValue::from_one_byte(self.scope, ascii)
      .map(|cell| PropNameId::from_pointer(Box::new(cell)))
      .ok_or_else(|| {
        JsiError::native("createFromOneByte() - string creation failed.")
      })
  }

  fn create_prop_name_id_from_utf8(
    &mut self,
    utf8: &[u8],
  ) -> Result<PropNameId, JsiError> {
    V8PointerValue::from_utf8(self.scope, utf8)
      .map(|cell| PropNameId::from_pointer(Box::new(cell)))
      .ok_or_else(|| {
        JsiError::native("createFromUtf8() - string creation failed.")
      })
  }

  fn create_prop_name_id_from_string(
    &mut self,
    string: &JsString,
  ) -> Result<PropNameId, JsiError> {
    let string = converter::to_v8_string(self.scope, string);
    Ok(converter::to_jsi_prop_name(self.scope, string))
  }

  fn prop_name_id_to_utf8(&mut self, name: &PropNameId) -> String {
    converter::to_v8_prop_name(self.scope, name).to_rust_string_lossy(self.scope)
  }

  fn prop_name_id_equals(&mut self, a: &PropNameId, b: &PropNameId) -> bool {
    let a = converter::to_v8_prop_name(self.scope, a);
    let b = converter::to_v8_prop_name(self.scope, b);
    a.strict_equals(b.into())
  }

  fn symbol_to_string(&mut self, symbol: &Symbol) -> String {
    let symbol = converter::to_v8_symbol(self.scope, symbol);
    let description = symbol.description(self.scope);
    if description.is_undefined() {
      "Symbol()".to_string()
    } else {
      format!("Symbol({})", description.to_rust_string_lossy(self.scope))
    }
  }

  fn create_string_from_ascii(
    &mut self,
    ascii: &[u8],
  ) -> Result<JsString, JsiError> {
    V8PointerValue::from_one_byte(self.scope, ascii)
      .map(|cell| JsString::from_pointer(Box::new(cell)))
      .ok_or_else(|| {
        JsiError::native("createFromOneByte() - string creation failed.")
      })
  }

  fn create_string_from_utf8(
    &mut self,
    utf8: &[u8],
  ) -> Result<JsString, JsiError> {
    V8PointerValue::from_utf8(self.scope, utf8)
      .map(|cell| JsString::from_pointer(Box::new(cell)))
      .ok_or_else(|| {
        JsiError::native("createFromUtf8() - string creation failed.")
      })
  }

  fn string_to_utf8(&mut self, string: &JsString) -> String {
    converter::to_v8_string(self.scope, string).to_rust_string_lossy(self.scope)
  }

  fn create_object(&mut self) -> Object {
    let object = v8::Object::new(self.scope);
    converter::to_jsi_object(self.scope, object)
  }

  fn create_object_with_host_object(
    &mut self,
    host_object: Arc<dyn HostObject>,
  ) -> Result<Object, JsiError> {
    let object =
      host_proxy::new_host_object(self.scope, self.bridge.clone(), host_object)
        .ok_or_else(|| JsiError::native("Unable to create host object"))?;
    Ok(converter::to_jsi_object(self.scope, object))
  }

  fn get_host_object(
    &mut self,
    object: &Object,
  ) -> Option<Arc<dyn HostObject>> {
    let object = converter::to_v8_object(self.scope, object);
    host_proxy::host_object_of(self.scope, object)
  }

  fn get_host_function(&mut self, function: &Function) -> Option<HostFunction> {
    let function = converter::to_v8_function(self.scope, function);
    host_proxy::host_function_of(self.scope, function)
  }

  fn get_property(
    &mut self,
    object: &Object,
    name: &PropNameId,
  ) -> Result<Value, JsiError> {
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let object = converter::to_v8_object(tc, object);
    let key = converter::to_v8_prop_name(tc, name);
    match object.get(tc, key.into()) {
      Some(value) => Ok(converter::to_jsi_value(tc, value)),
      None => {
        let exception = tc.exception();
        Err(report(tc, exception, "V8Runtime::getProperty failed."))
      }
    }
  }

  fn has_property(
    &mut self,
    object: &Object,
    name: &PropNameId,
  ) -> Result<bool, JsiError> {
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let object = converter::to_v8_object(tc, object);
    let key = converter::to_v8_prop_name(tc, name);
    match object.has(tc, key.into()) {
      Some(has) => Ok(has),
      None => {
        let exception = tc.exception();
        Err(report(tc, exception, "V8Runtime::hasProperty failed."))
      }
    }
  }

  fn set_property_value(
    &mut self,
    object: &Object,
    name: &PropNameId,
    value: &Value,
  ) -> Result<(), JsiError> {
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let object = converter::to_v8_object(tc, object);
    let key = converter::to_v8_prop_name(tc, name);
    let value = converter::to_v8_value(tc, value);
    if object.set(tc, key.into(), value) == Some(true) {
      return Ok(());
    }
    let exception = tc.exception();
    Err(report(tc, exception, "V8Runtime::setPropertyValue failed."))
  }

  fn is_array(&mut self, object: &Object) -> bool {
    converter::to_v8_object(self.scope, object).is_array()
  }

  fn is_array_buffer(&mut self, object: &Object) -> bool {
    converter::to_v8_object(self.scope, object).is_array_buffer()
  }

  fn is_function(&mut self, object: &Object) -> bool {
    converter::to_v8_object(self.scope, object).is_function()
  }

  fn is_host_object(&mut self, object: &Object) -> bool {
    let object = converter::to_v8_object(self.scope, object);
    host_proxy::is_host_object(self.scope, object)
  }

  fn is_host_function(&mut self, function: &Function) -> bool {
    let function = converter::to_v8_function(self.scope, function);
    host_proxy::is_host_function(self.scope, function)
  }

  fn get_property_names(&mut self, object: &Object) -> Array {
    let object = converter::to_v8_object(self.scope, object);
    let names = object
      .get_property_names(
        self.scope,
        v8::GetPropertyNamesArgs {
          mode: v8::KeyCollectionMode::IncludePrototypes,
          property_filter: v8::PropertyFilter::ONLY_ENUMERABLE
            | v8::PropertyFilter::SKIP_SYMBOLS,
          index_filter: v8::IndexFilter::IncludeIndices,
          key_conversion: v8::KeyConversionMode::ConvertToString,
        },
      )
      .expect("property enumeration cannot fail");
    converter::to_jsi_array(self.scope, names)
  }

  fn create_weak_object(&mut self, object: &Object) -> WeakObject {
    let object = converter::to_v8_object(self.scope, object);
    converter::to_jsi_weak_object(self.scope, object)
  }

  fn lock_weak_object(&mut self, weak: &WeakObject) -> Value {
    let weak = cell(weak.pointer());
    debug_assert!(weak.is_weak());
    let value = weak.get(self.scope);
    converter::to_jsi_value(self.scope, value)
  }

  fn create_array(&mut self, length: usize) -> Result<Array, JsiError> {
    let length = i32::try_from(length)
      .map_err(|_| JsiError::js("RangeError: Invalid array length"))?;
    let array = v8::Array::new(self.scope, length);
    Ok(converter::to_jsi_array(self.scope, array))
  }

  fn array_size(&mut self, array: &Array) -> usize {
    converter::to_v8_array(self.scope, array).length() as usize
  }

  fn array_buffer_size(&mut self, buffer: &ArrayBuffer) -> usize {
    converter::to_v8_array_buffer(self.scope, buffer).byte_length()
  }

  fn array_buffer_data(
    &mut self,
    buffer: &ArrayBuffer,
    f: &mut dyn FnMut(&mut [u8]),
  ) {
    let buffer = converter::to_v8_array_buffer(self.scope, buffer);
    let length = buffer.byte_length();
    match buffer.data() {
      Some(data) if length > 0 => {
        // SAFETY: the backing store is alive while `buffer` is rooted in
        // this scope, and no script runs while `f` holds the slice.
        let bytes = unsafe {
          std::slice::from_raw_parts_mut(data.as_ptr() as *mut u8, length)
        };
        f(bytes);
      }
      _ => f(&mut []),
    }
  }

  fn get_value_at_index(
    &mut self,
    array: &Array,
    index: usize,
  ) -> Result<Value, JsiError> {
    let index = u32::try_from(index)
      .map_err(|_| JsiError::js("RangeError: Invalid array index"))?;
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let array = converter::to_v8_array(tc, array);
    match array.get_index(tc, index) {
      Some(value) => Ok(converter::to_jsi_value(tc, value)),
      None => {
        let exception = tc.exception();
        Err(report(tc, exception, "V8Runtime::getValueAtIndex failed."))
      }
    }
  }

  fn set_value_at_index(
    &mut self,
    array: &Array,
    index: usize,
    value: &Value,
  ) -> Result<(), JsiError> {
    let index = u32::try_from(index)
      .map_err(|_| JsiError::js("RangeError: Invalid array index"))?;
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let array = converter::to_v8_array(tc, array);
    let value = converter::to_v8_value(tc, value);
    if array.set_index(tc, index, value) == Some(true) {
      return Ok(());
    }
    let exception = tc.exception();
    Err(report(tc, exception, "V8Runtime::setValueAtIndex failed."))
  }

  fn create_function_from_host_function(
    &mut self,
    name: &PropNameId,
    param_count: u32,
    func: HostFunction,
  ) -> Result<Function, JsiError> {
    let name = converter::to_v8_prop_name(self.scope, name);
    let function = host_proxy::new_host_function(
      self.scope,
      self.bridge.clone(),
      name,
      param_count,
      func,
    )
    .ok_or_else(|| JsiError::native("Unable to create host function"))?;
    Ok(converter::to_jsi_function(self.scope, function))
  }

  fn call(
    &mut self,
    function: &Function,
    this: &Value,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let function = converter::to_v8_function(tc, function);
    let receiver = if this.is_undefined() {
      let context = tc.get_current_context();
      context.global(tc).into()
    } else {
      converter::to_v8_value(tc, this)
    };
    let args = converter::to_v8_args(tc, args);
    match function.call(tc, receiver, &args) {
      Some(value) => Ok(converter::to_jsi_value(tc, value)),
      None => {
        let exception = tc.exception();
        Err(report(tc, exception, "V8Runtime::call failed."))
      }
    }
  }

  fn call_as_constructor(
    &mut self,
    function: &Function,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let function = converter::to_v8_function(tc, function);
    let args = converter::to_v8_args(tc, args);
    match function.new_instance(tc, &args) {
      Some(object) => Ok(converter::to_jsi_value(tc, object.into())),
      None => {
        let exception = tc.exception();
        Err(report(tc, exception, "CallAsConstructor failed"))
      }
    }
  }

  fn strict_equals_symbol(&mut self, a: &Symbol, b: &Symbol) -> bool {
    let a = converter::to_v8_symbol(self.scope, a);
    let b = converter::to_v8_symbol(self.scope, b);
    a.strict_equals(b.into())
  }

  fn strict_equals_string(&mut self, a: &JsString, b: &JsString) -> bool {
    let a = converter::to_v8_string(self.scope, a);
    let b = converter::to_v8_string(self.scope, b);
    a.strict_equals(b.into())
  }

  fn strict_equals_object(&mut self, a: &Object, b: &Object) -> bool {
    let a = converter::to_v8_object(self.scope, a);
    let b = converter::to_v8_object(self.scope, b);
    a.strict_equals(b.into())
  }

  fn instance_of(&mut self, object: &Object, constructor: &Function) -> bool {
    let scope = &mut *self.scope;
    v8::tc_scope!(let tc, scope);
    let object = converter::to_v8_object(tc, object);
    let constructor = converter::to_v8_function(tc, constructor);
    match object.instance_of(tc, constructor.into()) {
      Some(result) => result,
      None => {
        let exception = tc.exception();
        log::error!("{}", report(tc, exception, "V8Runtime::instanceOf failed."));
        false
      }
    }
  }
}

fn set_field(
  scope: &mut v8::PinScope,
  object: v8::Local<v8::Object>,
  name: &str,
  value: v8::Local<v8::Value>,
) {
  if let Some(key) = v8::String::new(scope, name) {
    object.set(scope, key.into(), value);
  }
}

/// `_v8runtime()`: engine version and heap statistics.
fn runtime_info<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  _args: v8::FunctionCallbackArguments<'s>,
  mut rv: v8::ReturnValue,
) {
  let stats = scope.get_heap_statistics();
  let memory = v8::Object::new(scope);
  for (name, bytes) in [
    ("jsHeapSizeLimit", stats.heap_size_limit()),
    ("totalJSHeapSize", stats.total_heap_size()),
    ("usedJSHeapSize", stats.used_heap_size()),
  ] {
    let bytes = v8::Number::new(scope, bytes as f64);
    set_field(scope, memory, name, bytes.into());
  }

  let info = v8::Object::new(scope);
  if let Some(version) = v8::String::new(scope, v8::V8::get_version()) {
    set_field(scope, info, "version", version.into());
  }
  set_field(scope, info, "memory", memory.into());
  rv.set(info.into());
}

fn create_global_context<'s>(
  scope: &mut v8::PinScope<'s, '_, ()>,
) -> v8::Local<'s, v8::Context> {
  let global = v8::ObjectTemplate::new(scope);
  if let Some(name) = v8::String::new(scope, RUNTIME_INFO_NAME) {
    let info = v8::FunctionTemplate::new(scope, runtime_info);
    global.set(name.into(), info.into());
  }
  v8::Context::new(
    scope,
    v8::ContextOptions {
      global_template: Some(global),
      ..Default::default()
    },
  )
}

fn method<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  object: v8::Local<'s, v8::Object>,
  name: &str,
) -> Option<v8::Local<'s, v8::Function>> {
  named_property(scope, object, name)
    .and_then(|f| v8::Local::<v8::Function>::try_from(f).ok())
}

/// Chains the prototype of the current context's global to the prototype of
/// `parent`'s global. Own globals of either context stay separate; names
/// defined on the parent's global prototype resolve in both.
///
/// Goes through `Reflect` so the prototypes are the ones script sees, not
/// the global object hidden behind each global proxy.
fn inherit_global_prototype(
  scope: &mut v8::PinScope,
  parent: v8::Local<v8::Context>,
) -> bool {
  v8::tc_scope!(let tc, scope);
  let context = tc.get_current_context();
  let global = context.global(tc);
  let parent_global = parent.global(tc);

  let Some(reflect) = named_property(tc, global, "Reflect")
    .and_then(|r| v8::Local::<v8::Object>::try_from(r).ok())
  else {
    return false;
  };
  let (Some(get_prototype_of), Some(set_prototype_of)) = (
    method(tc, reflect, "getPrototypeOf"),
    method(tc, reflect, "setPrototypeOf"),
  ) else {
    return false;
  };

  let receiver: v8::Local<v8::Value> = reflect.into();
  let (Some(prototype), Some(parent_prototype)) = (
    get_prototype_of.call(tc, receiver, &[global.into()]),
    get_prototype_of.call(tc, receiver, &[parent_global.into()]),
  ) else {
    return false;
  };
  if !prototype.is_object() {
    return false;
  }
  set_prototype_of
    .call(tc, receiver, &[prototype, parent_prototype])
    .is_some_and(|inherited| inherited.is_true())
}

/// A JavaScript runtime backed by one V8 context.
///
/// The primary runtime created by [`V8Runtime::new`] owns its isolate.
/// [`V8Runtime::new_shared`] adds another context to the same isolate.
///
/// Dropping a shared runtime only releases its context while the primary
/// is alive. The isolate itself is disposed by whichever runtime on it is
/// dropped last, so a shared runtime that outlives its primary tears the
/// isolate down.
///
/// A runtime is bound to the thread that created it. The `jsi` handles it
/// hands out are `Send` and may be dropped on any thread.
pub struct V8Runtime {
  // Dropped in declaration order: the debugger session and the context go
  // before the isolate.
  inspector: Option<Inspector>,
  context: v8::Global<v8::Context>,
  bridge: Rc<BridgeState>,
  options: RuntimeOptions,
  isolate: Rc<RefCell<JsIsolate>>,
}

impl V8Runtime {
  pub fn new(config: V8RuntimeConfig, options: RuntimeOptions) -> Self {
    platform::init_platform(&config.v8_flags);

    let mut params = v8::CreateParams::default();
    if let Some(blob) = config.snapshot_blob.as_deref() {
      let blob = platform::intern_snapshot(blob);
      params = params.snapshot_blob(v8::StartupData::from(blob));
    }
    let mut isolate = JsIsolate::new(params);
    if let Some(timezone_id) =
      config.timezone_id.as_deref().filter(|tz| !tz.is_empty())
    {
      platform::apply_timezone(&mut isolate.v8, timezone_id);
    }
    let isolate = Rc::new(RefCell::new(isolate));
    let bridge = Rc::new(BridgeState::new(CodeCache::new(&config, true), false));
    Self::with_context(isolate, bridge, &config, options, None)
  }

  /// Creates a runtime with its own context on `primary`'s isolate. Its
  /// global prototype chains to the primary's global prototype; own globals
  /// of the two runtimes stay separate.
  pub fn new_shared(primary: &V8Runtime, config: V8RuntimeConfig) -> Self {
    let bridge = Rc::new(BridgeState::new(CodeCache::disabled(), true));
    Self::with_context(
      primary.isolate.clone(),
      bridge,
      &config,
      primary.options.clone(),
      Some(&primary.context),
    )
  }

  fn with_context(
    isolate: Rc<RefCell<JsIsolate>>,
    bridge: Rc<BridgeState>,
    config: &V8RuntimeConfig,
    options: RuntimeOptions,
    parent: Option<&v8::Global<v8::Context>>,
  ) -> Self {
    let weak_isolate = Rc::downgrade(&isolate);
    let (context, inspector) = {
      let mut js_isolate = isolate
        .try_borrow_mut()
        .expect("V8Runtime created from a host callback");
      let lock = js_isolate.state.lock.clone();
      let _guard = lock.lock();

      v8::scope!(let scope, &mut js_isolate.v8);
      let context = create_global_context(scope);
      let global_context = v8::Global::new(scope, context);
      let scope = &mut v8::ContextScope::new(scope, context);

      if let Some(parent) = parent {
        let parent = v8::Local::new(scope, parent);
        context.set_security_token(parent.get_security_token(scope));
        if !inherit_global_prototype(scope, parent) {
          log::error!("Unable to inherit prototype from parent shared runtime.");
        }
      }

      let inspector = match (&options.inspector_registry, config.enable_inspector)
      {
        (Some(registry), true) => Some(Inspector::new(
          scope,
          context,
          weak_isolate,
          lock.clone(),
          &config.app_name,
          registry.clone(),
          options.js_queue.clone(),
        )),
        (None, true) => {
          log::warn!("inspector enabled without an inspector registry");
          None
        }
        _ => None,
      };
      (global_context, inspector)
    };

    bridge.inspectable.set(inspector.is_some());
    Self {
      inspector,
      context,
      bridge,
      options,
      isolate,
    }
  }

  /// Enters the isolate and this runtime's context.
  ///
  /// Panics when called while another operation on the same isolate is in
  /// progress on this thread, e.g. from inside a host function.
  fn with_scope<R>(&self, f: impl FnOnce(&mut ScopedRuntime) -> R) -> R {
    let mut isolate = self
      .isolate
      .try_borrow_mut()
      .expect("V8Runtime re-entered from a host callback");
    let lock = isolate.state.lock.clone();
    let _guard = lock.lock();
    lock.release_deferred();

    v8::scope!(let scope, &mut isolate.v8);
    let context = v8::Local::new(scope, &self.context);
    let scope = &mut v8::ContextScope::new(scope, context);
    let mut rt = ScopedRuntime::new(scope, self.bridge.clone());
    f(&mut rt)
  }

  /// Dispatches debugger messages buffered while script was not running.
  fn drain_inspector(rt: &mut ScopedRuntime, inspector: Option<&Inspector>) {
    if let Some(inspector) = inspector {
      inspector.dispatch_pending(rt.scope);
    }
  }

  /// Number of host objects and host functions not yet collected.
  pub fn live_host_proxies(&self) -> usize {
    self.isolate.borrow().state.live_proxy_count()
  }

  /// Number of roots dropped on other threads that the next operation on
  /// this isolate will release.
  pub fn deferred_releases(&self) -> usize {
    self.isolate.borrow().state.lock.deferred_count()
  }

  /// Forces a full garbage collection and runs the finalizers it
  /// triggers. Only honored when V8 runs with `--expose-gc`.
  pub fn collect_garbage(&self) {
    self.with_scope(|rt| {
      rt.scope.request_garbage_collection_for_testing(
        v8::GarbageCollectionType::Full,
      );
      platform::pump_message_loop(rt.scope);
    })
  }
}

impl Drop for V8Runtime {
  fn drop(&mut self) {
    if let Some(inspector) = self.inspector.take() {
      self.with_scope(move |rt| inspector.shutdown(rt.scope));
    }
  }
}

impl Runtime for V8Runtime {
  fn evaluate_javascript(
    &mut self,
    buffer: Arc<dyn Buffer>,
    source_url: &str,
  ) -> Result<Value, JsiError> {
    let inspector = self.inspector.as_ref();
    self.with_scope(|rt| {
      Self::drain_inspector(rt, inspector);
      rt.evaluate_javascript(buffer, source_url)
    })
  }

  fn prepare_javascript(
    &mut self,
    buffer: Arc<dyn Buffer>,
    source_url: String,
  ) -> Result<Arc<dyn PreparedJavaScript>, JsiError> {
    self.with_scope(|rt| rt.prepare_javascript(buffer, source_url))
  }

  fn evaluate_prepared_javascript(
    &mut self,
    js: &Arc<dyn PreparedJavaScript>,
  ) -> Result<Value, JsiError> {
    let inspector = self.inspector.as_ref();
    self.with_scope(|rt| {
      Self::drain_inspector(rt, inspector);
      rt.evaluate_prepared_javascript(js)
    })
  }

  fn drain_microtasks(
    &mut self,
    max_microtasks_hint: i32,
  ) -> Result<bool, JsiError> {
    let inspector = self.inspector.as_ref();
    self.with_scope(|rt| {
      Self::drain_inspector(rt, inspector);
      rt.drain_microtasks(max_microtasks_hint)
    })
  }

  fn global(&mut self) -> Object {
    self.with_scope(|rt| rt.global())
  }

  fn description(&self) -> String {
    format!("<V8Runtime@{:p}>", Rc::as_ptr(&self.bridge))
  }

  fn is_inspectable(&self) -> bool {
    self.bridge.inspectable.get()
  }

  fn clone_symbol(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    self.with_scope(|rt| rt.clone_symbol(pv))
  }

  fn clone_string(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    self.with_scope(|rt| rt.clone_string(pv))
  }

  fn clone_object(&mut self, pv: &dyn PointerValue) -> Box<dyn PointerValue> {
    self.with_scope(|rt| rt.clone_object(pv))
  }

  fn clone_prop_name_id(
    &mut self,
    pv: &dyn PointerValue,
  ) -> Box<dyn PointerValue> {
    self.with_scope(|rt| rt.clone_prop_name_id(pv))
  }

  fn create_prop_name_id_from_ascii(
    &mut self,
    ascii: &[u8],
  ) -> Result<PropNameId, JsiError> {
    self.with_scope(|rt| rt.create_prop_name_id_from_ascii(ascii))
  }

  fn create_prop_name_id_from_utf8(
    &mut self,
    utf8: &[u8],
  ) -> Result<PropNameId, JsiError> {
    self.with_scope(|rt| rt.create_prop_name_id_from_utf8(utf8))
  }

  fn create_prop_name_id_from_string(
    &mut self,
    string: &JsString,
  ) -> Result<PropNameId, JsiError> {
    self.with_scope(|rt| rt.create_prop_name_id_from_string(string))
  }

  fn prop_name_id_to_utf8(&mut self, name: &PropNameId) -> String {
    self.with_scope(|rt| rt.prop_name_id_to_utf8(name))
  }

  fn prop_name_id_equals(&mut self, a: &PropNameId, b: &PropNameId) -> bool {
    self.with_scope(|rt| rt.prop_name_id_equals(a, b))
  }

  fn symbol_to_string(&mut self, symbol: &Symbol) -> String {
    self.with_scope(|rt| rt.symbol_to_string(symbol))
  }

  fn create_string_from_ascii(
    &mut self,
    ascii: &[u8],
  ) -> Result<JsString, JsiError> {
    self.with_scope(|rt| rt.create_string_from_ascii(ascii))
  }

  fn create_string_from_utf8(
    &mut self,
    utf8: &[u8],
  ) -> Result<JsString, JsiError> {
    self.with_scope(|rt| rt.create_string_from_utf8(utf8))
  }

  fn string_to_utf8(&mut self, string: &JsString) -> String {
    self.with_scope(|rt| rt.string_to_utf8(string))
  }

  fn create_object(&mut self) -> Object {
    self.with_scope(|rt| rt.create_object())
  }

  fn create_object_with_host_object(
    &mut self,
    host_object: Arc<dyn HostObject>,
  ) -> Result<Object, JsiError> {
    self.with_scope(|rt| rt.create_object_with_host_object(host_object))
  }

  fn get_host_object(
    &mut self,
    object: &Object,
  ) -> Option<Arc<dyn HostObject>> {
    self.with_scope(|rt| rt.get_host_object(object))
  }

  fn get_host_function(&mut self, function: &Function) -> Option<HostFunction> {
    self.with_scope(|rt| rt.get_host_function(function))
  }

  fn get_property(
    &mut self,
    object: &Object,
    name: &PropNameId,
  ) -> Result<Value, JsiError> {
    self.with_scope(|rt| rt.get_property(object, name))
  }

  fn has_property(
    &mut self,
    object: &Object,
    name: &PropNameId,
  ) -> Result<bool, JsiError> {
    self.with_scope(|rt| rt.has_property(object, name))
  }

  fn set_property_value(
    &mut self,
    object: &Object,
    name: &PropNameId,
    value: &Value,
  ) -> Result<(), JsiError> {
    self.with_scope(|rt| rt.set_property_value(object, name, value))
  }

  fn is_array(&mut self, object: &Object) -> bool {
    self.with_scope(|rt| rt.is_array(object))
  }

  fn is_array_buffer(&mut self, object: &Object) -> bool {
    self.with_scope(|rt| rt.is_array_buffer(object))
  }

  fn is_function(&mut self, object: &Object) -> bool {
    self.with_scope(|rt| rt.is_function(object))
  }

  fn is_host_object(&mut self, object: &Object) -> bool {
    self.with_scope(|rt| rt.is_host_object(object))
  }

  fn is_host_function(&mut self, function: &Function) -> bool {
    self.with_scope(|rt| rt.is_host_function(function))
  }

  fn get_property_names(&mut self, object: &Object) -> Array {
    self.with_scope(|rt| rt.get_property_names(object))
  }

  fn create_weak_object(&mut self, object: &Object) -> WeakObject {
    self.with_scope(|rt| rt.create_weak_object(object))
  }

  fn lock_weak_object(&mut self, weak: &WeakObject) -> Value {
    self.with_scope(|rt| rt.lock_weak_object(weak))
  }

  fn create_array(&mut self, length: usize) -> Result<Array, JsiError> {
    self.with_scope(|rt| rt.create_array(length))
  }

  fn array_size(&mut self, array: &Array) -> usize {
    self.with_scope(|rt| rt.array_size(array))
  }

  fn array_buffer_size(&mut self, buffer: &ArrayBuffer) -> usize {
    self.with_scope(|rt| rt.array_buffer_size(buffer))
  }

  fn array_buffer_data(
    &mut self,
    buffer: &ArrayBuffer,
    f: &mut dyn FnMut(&mut [u8]),
  ) {
    self.with_scope(|rt| rt.array_buffer_data(buffer, f))
  }

  fn get_value_at_index(
    &mut self,
    array: &Array,
    index: usize,
  ) -> Result<Value, JsiError> {
    self.with_scope(|rt| rt.get_value_at_index(array, index))
  }

  fn set_value_at_index(
    &mut self,
    array: &Array,
    index: usize,
    value: &Value,
  ) -> Result<(), JsiError> {
    self.with_scope(|rt| rt.set_value_at_index(array, index, value))
  }

  fn create_function_from_host_function(
    &mut self,
    name: &PropNameId,
    param_count: u32,
    func: HostFunction,
  ) -> Result<Function, JsiError> {
    self.with_scope(|rt| {
      rt.create_function_from_host_function(name, param_count, func)
    })
  }

  fn call(
    &mut self,
    function: &Function,
    this: &Value,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    self.with_scope(|rt| rt.call(function, this, args))
  }

  fn call_as_constructor(
    &mut self,
    function: &Function,
    args: &[Value],
  ) -> Result<Value, JsiError> {
    self.with_scope(|rt| rt.call_as_constructor(function, args))
  }

  fn strict_equals_symbol(&mut self, a: &Symbol, b: &Symbol) -> bool {
    self.with_scope(|rt| rt.strict_equals_symbol(a, b))
  }

  fn strict_equals_string(&mut self, a: &JsString, b: &JsString) -> bool {
    self.with_scope(|rt| rt.strict_equals_string(a, b))
  }

  fn strict_equals_object(&mut self, a: &Object, b: &Object) -> bool {
    self.with_scope(|rt| rt.strict_equals_object(a, b))
  }

  fn instance_of(&mut self, object: &Object, constructor: &Function) -> bool {
    self.with_scope(|rt| rt.instance_of(object, constructor))
  }
}
