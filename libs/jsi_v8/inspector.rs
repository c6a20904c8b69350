// Copyright 2018-2026 the Deno authors. MIT license.

//! Connects a runtime's context to a remote debugger front end.
//!
//! The remote side may live on any thread. Its messages are buffered in
//! [`InspectorShared`] and dispatched into V8 on the runtime's thread: inline
//! when they arrive there, through the [`JsQueue`] otherwise, and directly by
//! the pause loop while script execution is suspended at a breakpoint.

use std::cell::Cell;
use std::cell::RefCell;
use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;
use std::thread::ThreadId;

use once_cell::sync::Lazy;
use parking_lot::Condvar;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use v8::inspector::ChannelBase;
use v8::inspector::ChannelImpl;
use v8::inspector::StringBuffer;
use v8::inspector::StringView;
use v8::inspector::V8Inspector;
use v8::inspector::V8InspectorClientBase;
use v8::inspector::V8InspectorClientImpl;
use v8::inspector::V8InspectorClientTrustLevel;
use v8::inspector::V8InspectorSession;

use crate::host::InspectorRegistry;
use crate::host::JsQueue;
use crate::host::LocalConnection;
use crate::host::RemoteConnection;
use crate::isolate::IsolateLock;
use crate::isolate::IsolateState;
use crate::isolate::JsIsolate;

const INSPECTOR_NAME: &str = "React Native V8 Inspector";
const INSPECTOR_VM: &str = "V8";

const DEBUGGER_DISABLE: &str =
  r#"{"id":2000000001,"method":"Debugger.disable"}"#;
const RUNTIME_DISABLE: &str =
  r#"{"id":2000000002,"method":"Runtime.disable"}"#;

static NEXT_CONTEXT_GROUP_ID: AtomicI32 = AtomicI32::new(1);

static CACHE_PREVENTION_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"&?cachePrevention=[0-9]*").unwrap());

/// Removes the reload counter bundlers append to script URLs, so breakpoints
/// set by URL keep matching after a reload.
pub(crate) fn strip_cache_prevention(message: &str) -> String {
  CACHE_PREVENTION_RE.replace_all(message, "").into_owned()
}

#[derive(Deserialize)]
struct ProtocolCommand {
  method: Option<String>,
}

/// Profiler commands must run on the runtime's own queue.
fn is_profiler_command(message: &str) -> bool {
  serde_json::from_str::<ProtocolCommand>(message)
    .ok()
    .and_then(|command| command.method)
    .is_some_and(|method| {
      method == "Profiler.start" || method == "Profiler.stop"
    })
}

pub(crate) fn page_title(app_name: &str) -> String {
  format!("{INSPECTOR_NAME} - {app_name}")
}

#[derive(Default)]
struct SessionState {
  queue: VecDeque<String>,
  paused: bool,
  closed: bool,
  remote: Option<Arc<dyn RemoteConnection>>,
  page_id: Option<i32>,
}

/// The part of a debugger session reachable from any thread.
pub(crate) struct InspectorShared {
  group_id: i32,
  owner: ThreadId,
  js_queue: Option<Arc<dyn JsQueue>>,
  registry: Arc<dyn InspectorRegistry>,
  state: Mutex<SessionState>,
  resumed: Condvar,
}

impl InspectorShared {
  fn new(
    registry: Arc<dyn InspectorRegistry>,
    js_queue: Option<Arc<dyn JsQueue>>,
  ) -> Self {
    Self {
      group_id: NEXT_CONTEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
      owner: std::thread::current().id(),
      js_queue,
      registry,
      state: Mutex::new(SessionState::default()),
      resumed: Condvar::new(),
    }
  }

  fn connect(&self, remote: Arc<dyn RemoteConnection>) {
    log::debug!("inspector {} connected", self.group_id);
    self.state.lock().remote = Some(remote);
  }

  fn on_remote_message(&self, message: String) {
    let message = strip_cache_prevention(&message);

    if is_profiler_command(&message)
      && let Some(js_queue) = &self.js_queue
    {
      let mut state = self.state.lock();
      if state.closed {
        return;
      }
      state.queue.push_back(message);
      if state.paused {
        self.resumed.notify_all();
      }
      drop(state);
      let group_id = self.group_id;
      js_queue.run_on_queue(Box::new(move || drain_session(group_id)));
      return;
    }

    let mut state = self.state.lock();
    if state.closed {
      return;
    }
    state.queue.push_back(message);
    if state.paused {
      self.resumed.notify_all();
      return;
    }
    drop(state);
    self.schedule_drain();
  }

  /// Dispatches buffered messages inline on the runtime's thread, or posts
  /// a drain task to it.
  fn schedule_drain(&self) {
    let group_id = self.group_id;
    if std::thread::current().id() == self.owner {
      drain_session(group_id);
    } else if let Some(js_queue) = &self.js_queue {
      js_queue.run_on_queue(Box::new(move || drain_session(group_id)));
    } else {
      log::debug!("inspector {group_id}: no JS queue, deferring dispatch");
    }
  }

  fn disconnect(&self) {
    let (remote, page_id) = {
      let mut state = self.state.lock();
      if state.closed {
        return;
      }
      state.closed = true;
      state.queue.push_back(DEBUGGER_DISABLE.to_string());
      state.queue.push_back(RUNTIME_DISABLE.to_string());
      (state.remote.take(), state.page_id.take())
    };
    log::debug!("inspector {} disconnected", self.group_id);
    self.resumed.notify_all();
    self.schedule_drain();

    if let Some(remote) = remote {
      remote.on_disconnect();
    }
    if let Some(page_id) = page_id {
      self.registry.remove_page(page_id);
    }
  }

  fn send_to_remote(&self, message: String) {
    let remote = self.state.lock().remote.clone();
    if let Some(remote) = remote {
      remote.on_message(message);
    }
  }

  fn set_paused(&self, paused: bool) {
    self.state.lock().paused = paused;
    if !paused {
      self.resumed.notify_all();
    }
  }

  fn pop(&self) -> Option<String> {
    self.state.lock().queue.pop_front()
  }

  /// Blocks until a message arrives or execution resumes.
  fn next_while_paused(&self) -> Option<String> {
    let mut state = self.state.lock();
    loop {
      if !state.paused || state.closed {
        return None;
      }
      if let Some(message) = state.queue.pop_front() {
        return Some(message);
      }
      self.resumed.wait(&mut state);
    }
  }
}

struct V8LocalConnection {
  shared: Arc<InspectorShared>,
}

impl LocalConnection for V8LocalConnection {
  fn send_message(&self, message: String) {
    self.shared.on_remote_message(message);
  }

  fn disconnect(&self) {
    self.shared.disconnect();
  }
}

thread_local! {
  static SESSIONS: RefCell<HashMap<i32, rc::Weak<SessionSlot>>> =
    RefCell::new(HashMap::new());
}

fn drain_session(group_id: i32) {
  if let Some(slot) = session_slot(group_id) {
    slot.drain();
  }
}

/// The engine session plus what is needed to enter its context.
struct SessionSlot {
  session: UnsafeCell<v8::UniqueRef<V8InspectorSession>>,
  shared: Arc<InspectorShared>,
  lock: Arc<IsolateLock>,
  isolate: rc::Weak<RefCell<JsIsolate>>,
  context: v8::Global<v8::Context>,
  draining: Cell<bool>,
}

impl SessionSlot {
  /// # Safety
  ///
  /// Must run on the isolate's thread with its lock held. V8 allows a
  /// dispatch to re-enter through the pause loop, which is the only way
  /// two calls overlap.
  unsafe fn dispatch(&self, message: &str) {
    log::debug!("inspector {} <- {message}", self.shared.group_id);
    let session = unsafe { &mut *self.session.get() };
    session.dispatch_protocol_message(StringView::from(message.as_bytes()));
  }

  fn dispatch_queued(&self) {
    while let Some(message) = self.shared.pop() {
      // SAFETY: callers hold the isolate lock on the isolate's thread.
      unsafe { self.dispatch(&message) };
    }
  }

  /// Dispatches buffered messages, entering the isolate and the session's
  /// context unless an operation on this thread already has.
  fn drain(&self) {
    if self.draining.replace(true) {
      return;
    }
    let draining = scopeguard::guard(&self.draining, |d| d.set(false));
    let _guard = self.lock.lock();
    let Some(isolate) = self.isolate.upgrade() else {
      return;
    };
    match isolate.try_borrow_mut() {
      Ok(mut isolate) => {
        self.lock.release_deferred();
        v8::scope!(let scope, &mut isolate.v8);
        let context = v8::Local::new(scope, &self.context);
        let _scope = &mut v8::ContextScope::new(scope, context);
        self.dispatch_queued();
      }
      Err(_) => self.dispatch_queued(),
    }
    drop(draining);
  }
}

fn session_slot(group_id: i32) -> Option<Rc<SessionSlot>> {
  SESSIONS
    .with(|sessions| sessions.borrow().get(&group_id).cloned())
    .and_then(|slot| slot.upgrade())
}

/// Receives pause notifications for every context group of an isolate.
struct InspectorClient {
  base: V8InspectorClientBase,
  paused_group: Cell<Option<i32>>,
}

impl V8InspectorClientImpl for InspectorClient {
  fn base(&self) -> &V8InspectorClientBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut V8InspectorClientBase {
    &mut self.base
  }

  unsafe fn base_ptr(this: *const Self) -> *const V8InspectorClientBase {
    unsafe { &(*this).base }
  }

  fn run_message_loop_on_pause(&mut self, context_group_id: i32) {
    let Some(slot) = session_slot(context_group_id) else {
      return;
    };
    log::debug!("inspector {context_group_id} paused");
    let previous = self.paused_group.replace(Some(context_group_id));
    slot.shared.set_paused(true);
    while let Some(message) = slot.shared.next_while_paused() {
      // SAFETY: V8 pauses on the isolate's thread with the lock held by
      // the operation that ran into the breakpoint.
      unsafe { slot.dispatch(&message) };
    }
    self.paused_group.set(previous);
    log::debug!("inspector {context_group_id} resumed");
  }

  fn quit_message_loop_on_pause(&mut self) {
    if let Some(group_id) = self.paused_group.get()
      && let Some(slot) = session_slot(group_id)
    {
      slot.shared.set_paused(false);
    }
  }
}

/// The engine inspector of one isolate, created for the first inspectable
/// runtime and shared by the rest.
pub(crate) struct InspectorHost {
  inspector: RefCell<v8::UniqueRef<V8Inspector>>,
  _client: Box<InspectorClient>,
}

impl InspectorHost {
  fn get(scope: &mut v8::PinScope) -> Rc<InspectorHost> {
    let state = IsolateState::get(scope);
    if let Some(host) = state.inspector.borrow().as_ref() {
      return host.clone();
    }

    let mut client = Box::new(InspectorClient {
      base: V8InspectorClientBase::new::<InspectorClient>(),
      paused_group: Cell::new(None),
    });
    let inspector = V8Inspector::create(scope, &mut *client);
    let host = Rc::new(InspectorHost {
      inspector: RefCell::new(inspector),
      _client: client,
    });
    *state.inspector.borrow_mut() = Some(host.clone());
    host
  }
}

struct InspectorChannel {
  base: ChannelBase,
  shared: Arc<InspectorShared>,
}

impl ChannelImpl for InspectorChannel {
  fn base(&self) -> &ChannelBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut ChannelBase {
    &mut self.base
  }

  unsafe fn base_ptr(this: *const Self) -> *const ChannelBase {
    unsafe { &(*this).base }
  }

  fn send_response(
    &mut self,
    _call_id: i32,
    message: v8::UniquePtr<StringBuffer>,
  ) {
    self
      .shared
      .send_to_remote(message.unwrap().string().to_string());
  }

  fn send_notification(&mut self, message: v8::UniquePtr<StringBuffer>) {
    self
      .shared
      .send_to_remote(message.unwrap().string().to_string());
  }

  fn flush_protocol_notifications(&mut self) {}
}

/// A runtime's debugger session, published to the inspector registry for
/// as long as the runtime lives.
pub(crate) struct Inspector {
  // Field order is drop order: the session goes before the inspector and
  // the channel it points at.
  slot: Rc<SessionSlot>,
  host: Rc<InspectorHost>,
  _channel: Box<InspectorChannel>,
  shared: Arc<InspectorShared>,
}

impl Inspector {
  pub fn new(
    scope: &mut v8::PinScope,
    context: v8::Local<v8::Context>,
    isolate: rc::Weak<RefCell<JsIsolate>>,
    lock: Arc<IsolateLock>,
    app_name: &str,
    registry: Arc<dyn InspectorRegistry>,
    js_queue: Option<Arc<dyn JsQueue>>,
  ) -> Self {
    let shared = Arc::new(InspectorShared::new(registry.clone(), js_queue));
    let group_id = shared.group_id;
    let title = page_title(app_name);

    let mut channel = Box::new(InspectorChannel {
      base: ChannelBase::new::<InspectorChannel>(),
      shared: shared.clone(),
    });

    let host = InspectorHost::get(scope);
    let session = {
      let mut inspector = host.inspector.borrow_mut();
      let session = inspector.connect(
        group_id,
        &mut *channel,
        StringView::from(title.as_bytes()),
        V8InspectorClientTrustLevel::FullyTrusted,
      );
      inspector.context_created(
        context,
        group_id,
        StringView::from(title.as_bytes()),
        StringView::empty(),
      );
      session
    };

    let slot = Rc::new(SessionSlot {
      session: UnsafeCell::new(session),
      shared: shared.clone(),
      lock,
      isolate,
      context: v8::Global::new(scope, context),
      draining: Cell::new(false),
    });
    SESSIONS.with(|sessions| {
      sessions.borrow_mut().insert(group_id, Rc::downgrade(&slot))
    });

    let weak_shared: Weak<InspectorShared> = Arc::downgrade(&shared);
    let page_id = registry.add_page(
      &title,
      INSPECTOR_VM,
      Box::new(move |remote| {
        let Some(shared) = weak_shared.upgrade() else {
          return Box::new(ClosedConnection);
        };
        shared.connect(remote);
        Box::new(V8LocalConnection { shared })
      }),
    );
    shared.state.lock().page_id = Some(page_id);
    log::debug!("inspector {group_id} registered as page {page_id}: {title}");

    Self {
      slot,
      host,
      _channel: channel,
      shared,
    }
  }

  /// Dispatches messages that arrived while no drain could run.
  pub fn dispatch_pending(&self, _scope: &mut v8::PinScope) {
    self.slot.dispatch_queued();
  }

  /// Unregisters the page and tells the engine the context is gone. Runs
  /// with the session's context entered.
  pub fn shutdown(self, scope: &mut v8::PinScope) {
    SESSIONS.with(|sessions| sessions.borrow_mut().remove(&self.shared.group_id));
    self.shared.disconnect();
    // Messages queued by `disconnect` when the drain was skipped.
    self.slot.dispatch_queued();
    let context = v8::Local::new(scope, &self.slot.context);
    self.host.inspector.borrow_mut().context_destroyed(context);
  }
}

/// Handed out when the front end connects after the runtime is gone.
struct ClosedConnection;

impl LocalConnection for ClosedConnection {
  fn send_message(&self, _message: String) {}

  fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn strips_cache_prevention_from_urls() {
    let message = r#"{"id":3,"method":"Debugger.setBreakpointByUrl","params":{"url":"http://localhost:8081/index.bundle?platform=android&dev=true&cachePrevention=12345","lineNumber":4}}"#;
    assert_eq!(
      strip_cache_prevention(message),
      r#"{"id":3,"method":"Debugger.setBreakpointByUrl","params":{"url":"http://localhost:8081/index.bundle?platform=android&dev=true","lineNumber":4}}"#
    );
    assert_eq!(strip_cache_prevention("no query"), "no query");
  }

  #[test]
  fn recognizes_profiler_commands() {
    assert!(is_profiler_command(r#"{"id":1,"method":"Profiler.start"}"#));
    assert!(is_profiler_command(r#"{"id":2,"method":"Profiler.stop"}"#));
    assert!(!is_profiler_command(r#"{"id":3,"method":"Profiler.enable"}"#));
    assert!(!is_profiler_command("not json"));
  }

  #[test]
  fn page_title_names_the_app() {
    assert_eq!(page_title("demo"), "React Native V8 Inspector - demo");
  }
}
