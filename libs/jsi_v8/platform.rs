// Copyright 2018-2026 the Deno authors. MIT license.

//! Process-wide V8 setup.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

static PLATFORM: OnceCell<v8::SharedRef<v8::Platform>> = OnceCell::new();

/// Snapshot blobs handed to isolates. V8 reads a startup blob for the whole
/// life of the isolate, so every distinct blob is leaked once and reused.
static SNAPSHOTS: Mutex<Vec<&'static [u8]>> = Mutex::new(Vec::new());

/// Initializes V8 the first time it is called. Flags passed by later calls
/// are ignored because V8 freezes them at initialization.
pub fn init_platform(flags: &[String]) {
  let mut first = false;
  PLATFORM.get_or_init(|| {
    first = true;
    // Lazy compilation defeats the bytecode cache.
    let mut all = String::from("--nolazy");
    for flag in flags {
      all.push(' ');
      all.push_str(flag);
    }
    log::debug!("initializing V8 with flags: {all}");
    v8::V8::set_flags_from_string(&all);

    let platform = v8::new_default_platform(0, false).make_shared();
    v8::V8::initialize_platform(platform.clone());
    v8::V8::initialize();
    platform
  });
  if !first && !flags.is_empty() {
    log::warn!(
      "V8 is already initialized, ignoring flags: {}",
      flags.join(" ")
    );
  }
}

pub fn is_platform_initialized() -> bool {
  PLATFORM.get().is_some()
}

/// Returns a `'static` copy of `blob`, reusing an earlier copy with the same
/// bytes.
pub(crate) fn intern_snapshot(blob: &[u8]) -> &'static [u8] {
  let mut snapshots = SNAPSHOTS.lock();
  if let Some(existing) = snapshots.iter().find(|s| **s == blob) {
    return existing;
  }
  let leaked: &'static [u8] = Box::leak(blob.to_vec().into_boxed_slice());
  snapshots.push(leaked);
  leaked
}

/// Runs the platform tasks posted for this isolate without blocking.
pub(crate) fn pump_message_loop(scope: &mut v8::PinScope) {
  while v8::Platform::pump_message_loop(
    &v8::V8::get_current_platform(),
    scope,
    false,
  ) {}
}

/// Points the process timezone at `timezone_id` and makes the isolate
/// recompute its date caches.
pub(crate) fn apply_timezone(isolate: &mut v8::Isolate, timezone_id: &str) {
  unsafe extern "C" {
    #[cfg(unix)]
    fn tzset();

    #[cfg(windows)]
    fn _tzset();
  }

  // SAFETY: runtimes are created on the embedder's JavaScript thread before
  // any script runs; tzset only re-reads TZ.
  unsafe {
    std::env::set_var("TZ", timezone_id);
    #[cfg(unix)]
    tzset();
    #[cfg(windows)]
    _tzset();
  }

  isolate.date_time_configuration_change_notification(
    v8::TimeZoneDetection::Redetect,
  );
}
