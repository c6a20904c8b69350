// Copyright 2018-2026 the Deno authors. MIT license.

mod common;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use common::config;
use common::eval;
use common::runtime_with;
use jsi::Runtime;
use jsi_v8::ConnectFn;
use jsi_v8::InspectorRegistry;
use jsi_v8::JsQueue;
use jsi_v8::LocalConnection;
use jsi_v8::RemoteConnection;
use jsi_v8::RuntimeOptions;
use jsi_v8::V8Runtime;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

struct Page {
  id: i32,
  title: String,
  vm: String,
  connect: ConnectFn,
}

#[derive(Default)]
struct Registry {
  pages: Mutex<Vec<Page>>,
  removed: Mutex<Vec<i32>>,
}

impl InspectorRegistry for Registry {
  fn add_page(&self, title: &str, vm: &str, connect: ConnectFn) -> i32 {
    let mut pages = self.pages.lock();
    let id = pages.len() as i32 + 100;
    pages.push(Page {
      id,
      title: title.to_string(),
      vm: vm.to_string(),
      connect,
    });
    id
  }

  fn remove_page(&self, page_id: i32) {
    self.removed.lock().push(page_id);
  }
}

impl Registry {
  fn connect(
    &self,
    remote: Arc<Remote>,
  ) -> Box<dyn LocalConnection> {
    let pages = self.pages.lock();
    let page = pages.last().expect("a registered page");
    (page.connect)(remote)
  }
}

#[derive(Default)]
struct Remote {
  messages: Mutex<Vec<String>>,
  disconnected: Mutex<bool>,
}

impl RemoteConnection for Remote {
  fn on_message(&self, message: String) {
    self.messages.lock().push(message);
  }

  fn on_disconnect(&self) {
    *self.disconnected.lock() = true;
  }
}

impl Remote {
  fn response(&self, id: u32) -> Option<serde_json::Value> {
    self
      .messages
      .lock()
      .iter()
      .filter_map(|m| serde_json::from_str::<serde_json::Value>(m).ok())
      .find(|m| m["id"] == id)
  }

  fn position(&self, id: u32) -> Option<usize> {
    self
      .messages
      .lock()
      .iter()
      .filter_map(|m| serde_json::from_str::<serde_json::Value>(m).ok())
      .position(|m| m["id"] == id)
  }

  fn has_notification(&self, method: &str) -> bool {
    self
      .messages
      .lock()
      .iter()
      .filter_map(|m| serde_json::from_str::<serde_json::Value>(m).ok())
      .any(|m| m["method"] == method)
  }
}

#[derive(Default)]
struct TaskQueue {
  tasks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl JsQueue for TaskQueue {
  fn run_on_queue(&self, task: Box<dyn FnOnce() + Send>) {
    self.tasks.lock().push(task);
  }
}

impl TaskQueue {
  fn run_pending(&self) -> usize {
    let tasks = std::mem::take(&mut *self.tasks.lock());
    let count = tasks.len();
    for task in tasks {
      task();
    }
    count
  }
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
  let deadline = Instant::now() + Duration::from_secs(10);
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(5));
  }
  false
}

struct Harness {
  registry: Arc<Registry>,
  queue: Arc<TaskQueue>,
  rt: V8Runtime,
}

fn inspectable_runtime() -> Harness {
  let registry = Arc::new(Registry::default());
  let queue = Arc::new(TaskQueue::default());
  let rt = runtime_with(
    config().with_inspector("demo", "pixel"),
    RuntimeOptions {
      js_queue: Some(queue.clone()),
      inspector_registry: Some(registry.clone()),
    },
  );
  Harness {
    registry,
    queue,
    rt,
  }
}

#[test]
fn registers_a_page_per_runtime() {
  let harness = inspectable_runtime();
  assert!(harness.rt.is_inspectable());
  {
    let pages = harness.registry.pages.lock();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].title, "React Native V8 Inspector - demo");
    assert_eq!(pages[0].vm, "V8");
  }

  let Harness { registry, rt, .. } = harness;
  let page_id = registry.pages.lock()[0].id;
  drop(rt);
  assert_eq!(*registry.removed.lock(), vec![page_id]);
}

#[test]
fn inspector_without_registry_is_disabled() {
  let rt = runtime_with(
    config().with_inspector("demo", "pixel"),
    RuntimeOptions::default(),
  );
  assert!(!rt.is_inspectable());
}

#[test]
fn dispatches_messages_from_the_runtime_thread_inline() {
  let mut harness = inspectable_runtime();
  let remote = Arc::new(Remote::default());
  let local = harness.registry.connect(remote.clone());

  local.send_message(r#"{"id":1,"method":"Runtime.enable"}"#.to_string());
  assert!(remote.response(1).is_some());
  assert!(remote.has_notification("Runtime.executionContextCreated"));

  eval(&mut harness.rt, "console.log('hello from script')").unwrap();
  assert!(remote.has_notification("Runtime.consoleAPICalled"));
  drop(local);
}

#[test]
fn messages_from_other_threads_go_through_the_queue() {
  let harness = inspectable_runtime();
  let remote = Arc::new(Remote::default());
  let local = harness.registry.connect(remote.clone());

  std::thread::spawn(move || {
    local.send_message(r#"{"id":2,"method":"Debugger.enable"}"#.to_string());
    local
  })
  .join()
  .unwrap();
  assert!(remote.response(2).is_none());

  assert!(harness.queue.run_pending() >= 1);
  let response = remote.response(2).expect("Debugger.enable response");
  assert!(response["result"]["debuggerId"].is_string());
}

#[test]
fn profiler_commands_run_on_the_js_queue() {
  let harness = inspectable_runtime();
  let remote = Arc::new(Remote::default());
  let local = harness.registry.connect(remote.clone());

  local.send_message(r#"{"id":3,"method":"Profiler.enable"}"#.to_string());
  assert!(remote.response(3).is_some());

  local.send_message(r#"{"id":4,"method":"Profiler.start"}"#.to_string());
  assert!(remote.response(4).is_none());
  harness.queue.run_pending();
  assert!(remote.response(4).is_some());

  local.send_message(r#"{"id":5,"method":"Profiler.stop"}"#.to_string());
  harness.queue.run_pending();
  let stopped = remote.response(5).expect("Profiler.stop response");
  assert!(stopped["result"]["profile"].is_object());
}

#[test]
fn breakpoint_urls_lose_cache_prevention() {
  let harness = inspectable_runtime();
  let remote = Arc::new(Remote::default());
  let local = harness.registry.connect(remote.clone());

  local.send_message(r#"{"id":6,"method":"Debugger.enable"}"#.to_string());
  local.send_message(
    r#"{"id":7,"method":"Debugger.setBreakpointByUrl","params":{"url":"http://localhost:8081/index.bundle?platform=android&dev=true&cachePrevention=12345","lineNumber":4}}"#
      .to_string(),
  );
  let response = remote.response(7).expect("setBreakpointByUrl response");
  let breakpoint_id = response["result"]["breakpointId"].as_str().unwrap();
  assert!(
    breakpoint_id
      .ends_with("http://localhost:8081/index.bundle?platform=android&dev=true"),
    "{breakpoint_id}"
  );
}

#[test]
fn remote_disconnect_tears_down_the_session() {
  let harness = inspectable_runtime();
  let remote = Arc::new(Remote::default());
  let local = harness.registry.connect(remote.clone());
  local.send_message(r#"{"id":8,"method":"Debugger.enable"}"#.to_string());

  local.disconnect();
  assert!(*remote.disconnected.lock());
  let page_id = harness.registry.pages.lock()[0].id;
  assert_eq!(*harness.registry.removed.lock(), vec![page_id]);

  // Further traffic is ignored and disconnecting again is harmless.
  let before = remote.messages.lock().len();
  local.send_message(r#"{"id":9,"method":"Runtime.enable"}"#.to_string());
  local.disconnect();
  assert_eq!(remote.messages.lock().len(), before);

  let Harness { registry, rt, .. } = harness;
  drop(rt);
  assert_eq!(*registry.removed.lock(), vec![page_id]);
}

#[test]
fn each_runtime_gets_its_own_context_group() {
  let first = inspectable_runtime();
  let mut shared = V8Runtime::new_shared(
    &first.rt,
    config().with_inspector("shared", "pixel"),
  );
  assert!(shared.is_inspectable());
  assert_eq!(first.registry.pages.lock().len(), 2);

  let remote = Arc::new(Remote::default());
  let local = first.registry.connect(remote.clone());
  local.send_message(r#"{"id":10,"method":"Runtime.enable"}"#.to_string());
  assert!(remote.response(10).is_some());

  eval(&mut shared, "console.log('shared')").unwrap();
  assert!(remote.has_notification("Runtime.consoleAPICalled"));
}

#[test]
fn paused_runtime_serves_the_debugger_until_resumed() {
  let mut harness = inspectable_runtime();
  let remote = Arc::new(Remote::default());
  let local = harness.registry.connect(remote.clone());
  local.send_message(r#"{"id":20,"method":"Debugger.enable"}"#.to_string());
  local.send_message(r#"{"id":21,"method":"Profiler.enable"}"#.to_string());
  assert!(remote.response(20).is_some());
  assert!(remote.response(21).is_some());

  let front_end = {
    let remote = remote.clone();
    std::thread::spawn(move || {
      let paused = wait_until(|| remote.has_notification("Debugger.paused"));
      local.send_message(
        r#"{"id":22,"method":"Runtime.evaluate","params":{"expression":"40 + 2"}}"#
          .to_string(),
      );
      let evaluated = wait_until(|| remote.response(22).is_some());
      // Profiler commands reach the paused loop as well.
      local.send_message(r#"{"id":23,"method":"Profiler.start"}"#.to_string());
      let profiled = wait_until(|| remote.response(23).is_some());
      // Always resume so the runtime thread cannot stay blocked.
      local.send_message(r#"{"id":24,"method":"Debugger.resume"}"#.to_string());
      (local, [paused, evaluated, profiled])
    })
  };

  let value = eval(&mut harness.rt, "debugger; 1").unwrap();
  assert_eq!(value.as_number(), Some(1.0));
  let (_local, observed) = front_end.join().unwrap();
  assert_eq!(observed, [true, true, true]);

  let evaluated = remote.response(22).expect("Runtime.evaluate response");
  assert_eq!(evaluated["result"]["result"]["value"], 42);
  let order = [22, 23, 24].map(|id| remote.position(id).expect("response"));
  assert!(order[0] < order[1] && order[1] < order[2], "{order:?}");
  assert!(remote.has_notification("Debugger.paused"));
  assert!(remote.has_notification("Debugger.resumed"));

  // Drain tasks posted while paused find nothing left to do.
  harness.queue.run_pending();
}
