// Copyright 2018-2026 the Deno authors. MIT license.

//! Background-task pumping driven by the host's idle signals.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::platform;
use crate::runtime::named_property;

pub(crate) const IDLE_CALLBACK_NAME: &str = "__v8OnIdleCallback";
const REQUEST_IDLE_CALLBACK: &str = "requestIdleCallback";

/// Installs the idle callback on the current context's global and requests
/// the first idle round. Returns `false` without side effects when the host
/// provides no `requestIdleCallback`.
pub(crate) fn install(scope: &mut v8::PinScope) -> bool {
  let context = scope.get_current_context();
  let global = context.global(scope);
  if !named_property(scope, global, REQUEST_IDLE_CALLBACK)
    .is_some_and(|request| request.is_function())
  {
    return false;
  }

  let Some(name) = v8::String::new(scope, IDLE_CALLBACK_NAME) else {
    return false;
  };
  let Some(callback) = v8::Function::builder(on_idle).build(scope) else {
    return false;
  };
  callback.set_name(name);
  global.set(scope, name.into(), callback.into());
  log::debug!("registered idle task runner");
  request_idle_callback(scope)
}

fn request_idle_callback(scope: &mut v8::PinScope) -> bool {
  let context = scope.get_current_context();
  let global = context.global(scope);
  let request = named_property(scope, global, REQUEST_IDLE_CALLBACK)
    .and_then(|f| v8::Local::<v8::Function>::try_from(f).ok());
  let callback = named_property(scope, global, IDLE_CALLBACK_NAME);
  match (request, callback) {
    (Some(request), Some(callback)) => {
      request.call(scope, global.into(), &[callback]).is_some()
    }
    _ => false,
  }
}

fn on_idle<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  _args: v8::FunctionCallbackArguments<'s>,
  _rv: v8::ReturnValue,
) {
  platform::pump_message_loop(scope);
  request_idle_callback(scope);
}

/// Identifies a callback registered with [`MainLoopRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type MainLoopCallback = Arc<dyn Fn() + Send + Sync>;

/// Process-wide list of callbacks run whenever the host's main loop goes
/// idle.
pub struct MainLoopRegistry {
  callbacks: Mutex<Vec<(CallbackId, MainLoopCallback)>>,
  next_id: AtomicU64,
}

static MAIN_LOOP_REGISTRY: Lazy<MainLoopRegistry> =
  Lazy::new(MainLoopRegistry::new);

impl MainLoopRegistry {
  fn new() -> Self {
    Self {
      callbacks: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(1),
    }
  }

  pub fn get() -> &'static MainLoopRegistry {
    &MAIN_LOOP_REGISTRY
  }

  pub fn register_callback(
    &self,
    callback: impl Fn() + Send + Sync + 'static,
  ) -> CallbackId {
    let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self.callbacks.lock().push((id, Arc::new(callback)));
    id
  }

  /// Returns whether `id` was registered.
  pub fn unregister_callback(&self, id: CallbackId) -> bool {
    let mut callbacks = self.callbacks.lock();
    let before = callbacks.len();
    callbacks.retain(|(registered, _)| *registered != id);
    callbacks.len() != before
  }

  /// Runs every registered callback in registration order. Callbacks may
  /// register or unregister others; changes apply from the next round.
  pub fn on_main_loop_idle(&self) {
    let callbacks = self
      .callbacks
      .lock()
      .iter()
      .map(|(_, callback)| callback.clone())
      .collect::<Vec<_>>();
    for callback in callbacks {
      callback();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn registry_runs_callbacks_until_unregistered() {
    let registry = MainLoopRegistry::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let first = {
      let hits = hits.clone();
      registry.register_callback(move || {
        hits.fetch_add(1, Ordering::SeqCst);
      })
    };
    let second = {
      let hits = hits.clone();
      registry.register_callback(move || {
        hits.fetch_add(10, Ordering::SeqCst);
      })
    };
    assert_ne!(first, second);

    registry.on_main_loop_idle();
    assert_eq!(hits.load(Ordering::SeqCst), 11);

    assert!(registry.unregister_callback(second));
    assert!(!registry.unregister_callback(second));
    registry.on_main_loop_idle();
    assert_eq!(hits.load(Ordering::SeqCst), 12);
  }

  #[test]
  fn callbacks_may_reenter_the_registry() {
    let registry: &'static MainLoopRegistry =
      Box::leak(Box::new(MainLoopRegistry::new()));
    let hits = Arc::new(AtomicUsize::new(0));
    let inner_hits = hits.clone();
    registry.register_callback(move || {
      let hits = inner_hits.clone();
      registry.register_callback(move || {
        hits.fetch_add(1, Ordering::SeqCst);
      });
    });

    registry.on_main_loop_idle();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    registry.on_main_loop_idle();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }
}
