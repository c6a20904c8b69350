// Copyright 2018-2026 the Deno authors. MIT license.

use std::any::Any;
use std::sync::Arc;

use jsi::PointerValue;

use crate::isolate::IsolateLock;
use crate::isolate::IsolateState;

enum Handle {
  Strong(v8::Global<v8::Value>),
  Weak(v8::Weak<v8::Value>),
}

/// Roots one engine value on behalf of a `jsi` handle.
///
/// The root is released under the isolate lock when the owning handle is
/// dropped. Handles may be dropped on any thread; a root dropped away from
/// the isolate's thread is reset there by the next bridge operation.
pub struct V8PointerValue {
  lock: Arc<IsolateLock>,
  handle: Option<Handle>,
}

impl V8PointerValue {
  pub(crate) fn new(
    scope: &mut v8::PinScope,
    value: v8::Local<v8::Value>,
  ) -> Self {
    Self {
      lock: IsolateState::get(scope).lock.clone(),
      handle: Some(Handle::Strong(v8::Global::new(scope, value))),
    }
  }

  /// A cell that does not keep `value` alive.
  pub(crate) fn new_weak(
    scope: &mut v8::PinScope,
    value: v8::Local<v8::Value>,
  ) -> Self {
    Self {
      lock: IsolateState::get(scope).lock.clone(),
      handle: Some(Handle::Weak(v8::Weak::new(scope, value))),
    }
  }

  /// Returns `None` when the engine refuses the string (e.g. too long).
  pub(crate) fn from_one_byte(
    scope: &mut v8::PinScope,
    bytes: &[u8],
  ) -> Option<Self> {
    let string =
      v8::String::new_from_one_byte(scope, bytes, v8::NewStringType::Normal)?;
    Some(Self::new(scope, string.into()))
  }

  pub(crate) fn from_utf8(
    scope: &mut v8::PinScope,
    bytes: &[u8],
  ) -> Option<Self> {
    let string =
      v8::String::new_from_utf8(scope, bytes, v8::NewStringType::Normal)?;
    Some(Self::new(scope, string.into()))
  }

  /// Opens the rooted value in the current handle scope. A weak cell whose
  /// target was collected yields `undefined`.
  pub(crate) fn get<'s>(
    &self,
    scope: &mut v8::PinScope<'s, '_>,
  ) -> v8::Local<'s, v8::Value> {
    match &self.handle {
      Some(Handle::Strong(global)) => v8::Local::new(scope, global),
      Some(Handle::Weak(weak)) => match weak.to_local(scope) {
        Some(value) => value,
        None => v8::undefined(scope).into(),
      },
      None => v8::undefined(scope).into(),
    }
  }

  pub(crate) fn is_weak(&self) -> bool {
    matches!(self.handle, Some(Handle::Weak(_)))
  }
}

impl PointerValue for V8PointerValue {
  fn as_any(&self) -> &dyn Any {
    self
  }
}

// SAFETY: the handle is only opened through a scope on the isolate's
// thread. Off that thread the cell is moved or dropped, and `Drop` parks the
// root instead of touching the engine.
unsafe impl Send for V8PointerValue {}

impl Drop for V8PointerValue {
  fn drop(&mut self) {
    let Some(handle) = self.handle.take() else {
      return;
    };
    let _guard = self.lock.lock();
    if self.lock.is_isolate_thread() {
      drop(handle);
    } else {
      self.lock.defer_release(Box::new(handle));
    }
  }
}

/// Recovers the V8 cell behind a `jsi` handle.
///
/// Panics when the handle was produced by a different engine adapter.
pub(crate) fn cell(pv: &dyn PointerValue) -> &V8PointerValue {
  pv.as_any()
    .downcast_ref::<V8PointerValue>()
    .expect("handle does not belong to a V8 runtime")
}
