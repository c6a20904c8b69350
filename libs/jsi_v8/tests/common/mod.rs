// Copyright 2018-2026 the Deno authors. MIT license.

#![allow(dead_code)]

use std::sync::Arc;

use jsi::JsiError;
use jsi::Runtime;
use jsi::StringBuffer;
use jsi::Value;
use jsi_v8::RuntimeOptions;
use jsi_v8::V8Runtime;
use jsi_v8::V8RuntimeConfig;

pub fn init_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// Every runtime in the test binaries exposes `gc()` so finalization can be
/// forced.
pub fn config() -> V8RuntimeConfig {
  V8RuntimeConfig::default().with_v8_flags(&["--expose-gc"])
}

pub fn runtime() -> V8Runtime {
  runtime_with(config(), RuntimeOptions::default())
}

pub fn runtime_with(
  config: V8RuntimeConfig,
  options: RuntimeOptions,
) -> V8Runtime {
  init_logger();
  V8Runtime::new(config, options)
}

pub fn eval(rt: &mut dyn Runtime, source: &str) -> Result<Value, JsiError> {
  eval_as(rt, source, "test.js")
}

pub fn eval_as(
  rt: &mut dyn Runtime,
  source: &str,
  source_url: &str,
) -> Result<Value, JsiError> {
  rt.evaluate_javascript(Arc::new(StringBuffer::new(source)), source_url)
}

pub fn eval_number(rt: &mut dyn Runtime, source: &str) -> f64 {
  eval(rt, source)
    .unwrap()
    .as_number()
    .unwrap_or_else(|| panic!("`{source}` did not evaluate to a number"))
}

pub fn eval_string(rt: &mut dyn Runtime, source: &str) -> String {
  let value = eval(rt, source).unwrap();
  let string = value
    .as_string()
    .unwrap_or_else(|| panic!("`{source}` did not evaluate to a string"));
  string.utf8(rt)
}

pub fn eval_bool(rt: &mut dyn Runtime, source: &str) -> bool {
  eval(rt, source)
    .unwrap()
    .as_bool()
    .unwrap_or_else(|| panic!("`{source}` did not evaluate to a boolean"))
}
