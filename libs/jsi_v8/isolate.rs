// Copyright 2018-2026 the Deno authors. MIT license.

use std::any::Any;
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use parking_lot::ReentrantMutex;
use parking_lot::ReentrantMutexGuard;

use crate::inspector::InspectorHost;

/// A root released away from the isolate's thread.
pub(crate) struct DeferredRelease {
  _root: Box<dyn Any>,
}

// SAFETY: the root is moved into the list untouched and only dropped by
// `IsolateLock::release_deferred` on the isolate's thread, or after the
// isolate is gone, when dropping a root is a no-op.
unsafe impl Send for DeferredRelease {}

/// Serializes access to one isolate. Every bridge operation holds it, and so
/// does a handle dropped on any thread; host callbacks re-enter it on the
/// same thread.
pub(crate) struct IsolateLock {
  mutex: ReentrantMutex<()>,
  owner: ThreadId,
  deferred: Mutex<Vec<DeferredRelease>>,
}

impl IsolateLock {
  fn new() -> Self {
    Self {
      mutex: ReentrantMutex::new(()),
      owner: std::thread::current().id(),
      deferred: Mutex::new(Vec::new()),
    }
  }

  pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
    self.mutex.lock()
  }

  pub fn is_isolate_thread(&self) -> bool {
    std::thread::current().id() == self.owner
  }

  /// Parks a root until the isolate's thread can reset it. Called with the
  /// lock held.
  pub fn defer_release(&self, root: Box<dyn Any>) {
    self.deferred.lock().push(DeferredRelease { _root: root });
  }

  /// Resets roots parked by other threads. Runs on the isolate's thread
  /// with the lock held.
  pub fn release_deferred(&self) {
    debug_assert!(self.is_isolate_thread());
    let deferred = std::mem::take(&mut *self.deferred.lock());
    if !deferred.is_empty() {
      log::debug!("releasing {} roots dropped off-thread", deferred.len());
    }
    drop(deferred);
  }

  pub fn deferred_count(&self) -> usize {
    self.deferred.lock().len()
  }
}

/// Per-isolate bookkeeping, stored in an isolate slot and shared by the
/// primary runtime and its shared runtimes.
pub(crate) struct IsolateState {
  pub lock: Arc<IsolateLock>,
  /// Weak handles of live host objects and host functions, keyed by proxy
  /// id. Each handle's finalizer owns the proxy.
  host_proxies: RefCell<HashMap<usize, v8::Weak<v8::Object>>>,
  next_proxy_id: Cell<usize>,
  pub host_object_template: RefCell<Option<v8::Global<v8::ObjectTemplate>>>,
  pub inspector: RefCell<Option<Rc<InspectorHost>>>,
}

impl IsolateState {
  fn new() -> Self {
    Self {
      lock: Arc::new(IsolateLock::new()),
      host_proxies: RefCell::new(HashMap::new()),
      next_proxy_id: Cell::new(1),
      host_object_template: RefCell::new(None),
      inspector: RefCell::new(None),
    }
  }

  /// Panics if the isolate was not created by [`JsIsolate::new`].
  pub fn get(isolate: &v8::Isolate) -> Rc<IsolateState> {
    isolate
      .get_slot::<Rc<IsolateState>>()
      .expect("isolate was not created by jsi_v8")
      .clone()
  }

  pub fn next_proxy_id(&self) -> usize {
    let id = self.next_proxy_id.get();
    self.next_proxy_id.set(id + 1);
    id
  }

  pub fn track_proxy(&self, id: usize, handle: v8::Weak<v8::Object>) {
    self.host_proxies.borrow_mut().insert(id, handle);
  }

  /// Called from a proxy finalizer once the engine collected its object.
  pub fn forget_proxy(&self, id: usize) {
    let handle = self.host_proxies.borrow_mut().remove(&id);
    drop(handle);
  }

  pub fn live_proxy_count(&self) -> usize {
    self.host_proxies.borrow().len()
  }

  /// Drops every weak handle still registered. Their finalizers are dropped
  /// with them, which releases each remaining proxy exactly once.
  fn release_host_proxies(&self) {
    let proxies = std::mem::take(&mut *self.host_proxies.borrow_mut());
    if !proxies.is_empty() {
      log::debug!("releasing {} host proxies at teardown", proxies.len());
    }
    drop(proxies);
  }
}

/// An owned isolate plus its state. Dropped when the last runtime sharing
/// the isolate goes away.
pub(crate) struct JsIsolate {
  pub v8: v8::OwnedIsolate,
  pub state: Rc<IsolateState>,
}

impl JsIsolate {
  pub fn new(params: v8::CreateParams) -> Self {
    let mut isolate = v8::Isolate::new(params);
    let state = Rc::new(IsolateState::new());
    isolate.set_slot(state.clone());
    Self { v8: isolate, state }
  }
}

impl Drop for JsIsolate {
  fn drop(&mut self) {
    let lock = self.state.lock.clone();
    let _guard = lock.lock();
    lock.release_deferred();
    self.state.inspector.borrow_mut().take();
    self.state.release_host_proxies();
    self.state.host_object_template.borrow_mut().take();
  }
}
