// Copyright 2018-2026 the Deno authors. MIT license.

mod common;

use common::config;
use common::eval_as;
use common::runtime_with;
use jsi::JsiError;
use jsi_v8::CodecacheMode;
use jsi_v8::RuntimeOptions;
use jsi_v8::V8Runtime;
use jsi_v8::V8RuntimeConfig;
use pretty_assertions::assert_eq;

const BUNDLE: &str = r#"
function fib(n) {
  return n < 2 ? n : fib(n - 1) + fib(n - 2);
}
const table = [];
for (let i = 0; i < 10; i++) {
  table.push(fib(i));
}
table.join(",");
"#;

const EXPECTED: &str = "0,1,1,2,3,5,8,13,21,34";

const THROWING_BUNDLE: &str = r#"
function check(n) {
  if (n > 2) {
    throw new RangeError("too big: " + n);
  }
  return n;
}
[1, 2, 3].map(check);
"#;

fn run_throwing_bundle(config: V8RuntimeConfig) -> JsiError {
  let mut rt = runtime_with(config, RuntimeOptions::default());
  eval_as(&mut rt, THROWING_BUNDLE, "throws.bundle").unwrap_err()
}

fn run_bundle(config: V8RuntimeConfig) -> String {
  let mut rt = runtime_with(config, RuntimeOptions::default());
  let value = eval_as(&mut rt, BUNDLE, "index.bundle").unwrap();
  value.as_string().unwrap().utf8(&mut rt)
}

#[test]
fn normal_mode_creates_then_consumes_the_cache() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("index.bundle.cache");
  let config = config().with_codecache(CodecacheMode::Normal, &path);

  assert_eq!(run_bundle(config.clone()), EXPECTED);
  let written = std::fs::read(&path).expect("cache file written");
  assert!(!written.is_empty());

  // An accepted cache is left untouched.
  assert_eq!(run_bundle(config), EXPECTED);
  assert_eq!(std::fs::read(&path).unwrap(), written);
}

#[test]
fn cached_runs_throw_the_same_errors() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("throws.bundle.cache");
  let uncached = run_throwing_bundle(config());

  let config = config().with_codecache(CodecacheMode::Normal, &path);
  let producing = run_throwing_bundle(config.clone());
  assert!(path.exists());
  let consuming = run_throwing_bundle(config);

  assert!(
    uncached.message().starts_with("throws.bundle:4: RangeError: too big: 3"),
    "{uncached}"
  );
  assert_eq!(producing, uncached);
  assert_eq!(consuming, uncached);
}

#[test]
fn rejected_cache_is_rewritten() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("index.bundle.cache");
  std::fs::write(&path, vec![0xAB; 64]).unwrap();

  let config = config().with_codecache(CodecacheMode::Normal, &path);
  assert_eq!(run_bundle(config), EXPECTED);
  let rewritten = std::fs::read(&path).unwrap();
  assert_ne!(rewritten, vec![0xAB; 64]);
}

#[test]
fn unwritable_cache_path_still_runs() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("missing-dir").join("index.bundle.cache");
  let config = config().with_codecache(CodecacheMode::Normal, &path);
  assert_eq!(run_bundle(config), EXPECTED);
  assert!(!path.exists());
}

#[test]
fn prebuilt_cache_is_never_written() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("prebuilt.cache");

  let mut prebuilt = config().with_codecache(CodecacheMode::Prebuilt, &path);
  assert_eq!(run_bundle(prebuilt.clone()), EXPECTED);
  assert!(!path.exists());

  // A prebuilt blob produced by a normal run is consumed as is.
  let normal = config().with_codecache(CodecacheMode::Normal, &path);
  assert_eq!(run_bundle(normal), EXPECTED);
  let blob = std::fs::read(&path).unwrap();
  prebuilt.prebuilt_codecache_blob = Some(blob.clone());
  assert_eq!(run_bundle(prebuilt), EXPECTED);
  assert_eq!(std::fs::read(&path).unwrap(), blob);
}

#[test]
fn stub_bundle_runs_from_the_cache() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("index.bundle.cache");
  let config =
    config().with_codecache(CodecacheMode::NormalWithStubBundle, &path);

  // First run compiles the real source and writes the cache.
  assert_eq!(run_bundle(config.clone()), EXPECTED);
  assert!(path.exists());

  // Later runs can be handed a placeholder of the same length.
  let mut rt = runtime_with(config, RuntimeOptions::default());
  let placeholder = " ".repeat(BUNDLE.len());
  let value = eval_as(&mut rt, &placeholder, "index.bundle").unwrap();
  assert_eq!(value.as_string().unwrap().utf8(&mut rt), EXPECTED);
}

#[test]
fn shared_runtime_ignores_the_cache() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("shared.cache");
  let primary = runtime_with(config(), RuntimeOptions::default());
  let mut shared = V8Runtime::new_shared(
    &primary,
    config().with_codecache(CodecacheMode::Normal, &path),
  );
  let value = eval_as(&mut shared, BUNDLE, "index.bundle").unwrap();
  assert_eq!(value.as_string().unwrap().utf8(&mut shared), EXPECTED);
  assert!(!path.exists());
}
