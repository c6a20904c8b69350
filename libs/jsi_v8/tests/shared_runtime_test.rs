// Copyright 2018-2026 the Deno authors. MIT license.

mod common;

use std::sync::Arc;

use common::config;
use common::eval;
use common::eval_bool;
use common::eval_number;
use common::eval_string;
use common::runtime;
use jsi::Function;
use jsi::JsiError;
use jsi::Object;
use jsi::PropNameId;
use jsi::Runtime;
use jsi::Value;
use jsi_v8::V8Runtime;
use pretty_assertions::assert_eq;

#[test]
fn shared_global_chains_to_the_primary_global_prototype() {
  let mut primary = runtime();
  eval(
    &mut primary,
    "globalThis.fromPrimary = 1; var primaryVar = 2; \
     Object.getPrototypeOf(globalThis).viaProto = 3;",
  )
  .unwrap();

  let mut shared = V8Runtime::new_shared(&primary, config());
  // Own globals of the primary stay out of reach.
  assert_eq!(eval_string(&mut shared, "typeof primaryVar"), "undefined");
  assert_eq!(eval_string(&mut shared, "typeof fromPrimary"), "undefined");
  assert!(eval(&mut shared, "primaryVar").is_err());
  // Names on the primary's global prototype resolve.
  assert_eq!(eval_number(&mut shared, "viaProto"), 3.0);

  eval(&mut shared, "var sharedOnly = 5; globalThis.viaProto = 10;").unwrap();
  assert_eq!(eval_number(&mut shared, "sharedOnly"), 5.0);
  assert_eq!(eval_string(&mut primary, "typeof sharedOnly"), "undefined");
  // Assignment shadows on the shared global instead of writing through.
  assert_eq!(eval_number(&mut primary, "viaProto"), 3.0);
  assert_eq!(eval_number(&mut shared, "viaProto"), 10.0);

  // Names added to the primary's global prototype later are visible too.
  eval(&mut primary, "Object.getPrototypeOf(globalThis).late = 'late'")
    .unwrap();
  assert_eq!(eval_string(&mut shared, "late"), "late");

  drop(shared);
  assert_eq!(eval_number(&mut primary, "primaryVar"), 2.0);
}

#[test]
fn values_cross_between_primary_and_shared() {
  let mut primary = runtime();
  let mut shared = V8Runtime::new_shared(&primary, config());

  let object = eval(&mut shared, "({ answer: 42 })")
    .unwrap()
    .into_object()
    .unwrap();
  primary
    .global()
    .set_property(&mut primary, "fromShared", object)
    .unwrap();
  assert_eq!(eval_number(&mut primary, "fromShared.answer"), 42.0);

  let name = PropNameId::for_ascii(&mut shared, "double").unwrap();
  let double = Function::from_host_fn(
    &mut shared,
    &name,
    1,
    Arc::new(|_rt: &mut dyn Runtime, _this: &Value, args: &[Value]| {
      let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
      Ok::<_, JsiError>(Value::Number(n * 2.0))
    }),
  )
  .unwrap();
  shared.global().set_property(&mut shared, "double", double).unwrap();
  assert_eq!(eval_number(&mut shared, "double(21)"), 42.0);
  assert_eq!(eval_string(&mut primary, "typeof double"), "undefined");
}

#[test]
fn shared_runtime_never_registers_idle_runner() {
  let primary = runtime();
  let mut shared = V8Runtime::new_shared(&primary, config());
  eval(
    &mut shared,
    "globalThis.requestIdleCallback = cb => { globalThis.requested = cb; };",
  )
  .unwrap();
  eval(&mut shared, "1").unwrap();
  assert!(eval_bool(&mut shared, "globalThis.requested === undefined"));
  assert!(!shared.is_inspectable());
}

#[test]
fn primary_may_be_dropped_before_shared() {
  let primary = runtime();
  let mut shared = V8Runtime::new_shared(&primary, config());
  let kept = Object::new(&mut shared);
  kept.set_property(&mut shared, "x", 1).unwrap();
  drop(primary);

  assert_eq!(eval_number(&mut shared, "6 * 7"), 42.0);
  assert_eq!(kept.get_property(&mut shared, "x").unwrap().as_number(), Some(1.0));
  drop(kept);
}
