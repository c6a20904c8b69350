// Copyright 2018-2026 the Deno authors. MIT license.

//! Bytecode caching for evaluated scripts.

use std::borrow::Cow;
use std::path::PathBuf;

use v8::script_compiler::CachedData;
use v8::script_compiler::CompileOptions;
use v8::script_compiler::NoCacheReason;
use v8::script_compiler::Source;

use crate::config::CodecacheMode;
use crate::config::V8RuntimeConfig;

/// Offset of the source hash in a V8 code cache header. For classic scripts
/// the hash is the source length.
const SOURCE_HASH_OFFSET: usize = 8;
const MODULE_FLAG: u32 = 1 << 31;
/// Longest string V8 accepts on 64-bit targets.
const MAX_STUB_LENGTH: usize = (1 << 29) - 24;

pub(crate) struct CodeCache {
  mode: CodecacheMode,
  path: Option<PathBuf>,
  prebuilt: Option<Vec<u8>>,
  /// Shared runtimes never read nor write the cache.
  enabled: bool,
}

impl CodeCache {
  pub fn new(config: &V8RuntimeConfig, enabled: bool) -> Self {
    Self {
      mode: config.codecache_mode,
      path: config.codecache_path.clone(),
      prebuilt: config.prebuilt_codecache_blob.clone(),
      enabled,
    }
  }

  pub fn disabled() -> Self {
    Self {
      mode: CodecacheMode::None,
      path: None,
      prebuilt: None,
      enabled: false,
    }
  }

  pub fn load(&self) -> Option<Cow<'_, [u8]>> {
    if !self.enabled {
      return None;
    }
    match self.mode {
      CodecacheMode::None => None,
      CodecacheMode::Prebuilt => {
        if self.prebuilt.is_none() {
          log::info!("Prebuilt codecache mode without a codecache blob");
        }
        self.prebuilt.as_deref().map(Cow::Borrowed)
      }
      CodecacheMode::Normal | CodecacheMode::NormalWithStubBundle => {
        let path = self.path.as_ref()?;
        match std::fs::read(path) {
          Ok(bytes) => Some(Cow::Owned(bytes)),
          Err(_) => {
            log::info!("Cannot load codecache file: {}", path.display());
            None
          }
        }
      }
    }
  }

  /// Whether a consumed cache lets the real source be replaced by a
  /// placeholder of the same length.
  pub fn uses_stub_source(&self) -> bool {
    matches!(
      self.mode,
      CodecacheMode::Prebuilt | CodecacheMode::NormalWithStubBundle
    )
  }

  /// A fresh cache is produced only when nothing usable was consumed.
  pub fn should_save(&self, consumed: bool, rejected: bool) -> bool {
    self.enabled
      && matches!(
        self.mode,
        CodecacheMode::Normal | CodecacheMode::NormalWithStubBundle
      )
      && self.path.is_some()
      && (!consumed || rejected)
  }

  fn save(&self, script: &v8::UnboundScript) {
    let Some(path) = &self.path else {
      return;
    };
    let Some(data) = script.create_code_cache() else {
      return;
    };
    let bytes: &[u8] = &data;
    if std::fs::write(path, bytes).is_err() {
      log::error!("Cannot save codecache file: {}", path.display());
    } else {
      log::debug!("wrote {} codecache bytes to {}", bytes.len(), path.display());
    }
  }
}

/// Reads the source length a cache was produced for.
pub(crate) fn stub_source_length(cache: &[u8]) -> Option<usize> {
  let bytes = cache.get(SOURCE_HASH_OFFSET..SOURCE_HASH_OFFSET + 4)?;
  let hash = u32::from_le_bytes(bytes.try_into().ok()?);
  let length = (hash & !MODULE_FLAG) as usize;
  (length <= MAX_STUB_LENGTH).then_some(length)
}

fn compile_from_source<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  source: v8::Local<'s, v8::String>,
  origin: &v8::ScriptOrigin<'s>,
) -> Option<v8::Local<'s, v8::UnboundScript>> {
  let mut source = Source::new(source, Some(origin));
  v8::script_compiler::compile_unbound_script(
    scope,
    &mut source,
    CompileOptions::NoCompileOptions,
    NoCacheReason::NoReason,
  )
}

/// Compiles `source`, consuming and refreshing the cache as configured.
/// Returns `None` with an exception pending when compilation fails.
pub(crate) fn compile_script<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  cache: &CodeCache,
  source: v8::Local<'s, v8::String>,
  source_url: &str,
) -> Option<v8::Local<'s, v8::UnboundScript>> {
  let resource_name = v8::String::new(scope, source_url)?;
  let origin = v8::ScriptOrigin::new(
    scope,
    resource_name.into(),
    0,
    0,
    false,
    0,
    None,
    false,
    false,
    false,
    None,
  );

  let cached_bytes = cache.load();
  let Some(cached_bytes) = cached_bytes.as_deref() else {
    let unbound = compile_from_source(scope, source, &origin)?;
    if cache.should_save(false, false) {
      cache.save(&unbound);
    }
    return Some(unbound);
  };

  let stub = if cache.uses_stub_source() {
    stub_source_length(cached_bytes)
      .and_then(|len| v8::String::new(scope, &" ".repeat(len)))
  } else {
    None
  };
  let mut consumed = Source::new_with_cached_data(
    stub.unwrap_or(source),
    Some(&origin),
    CachedData::new(cached_bytes),
  );
  let mut unbound = v8::script_compiler::compile_unbound_script(
    scope,
    &mut consumed,
    CompileOptions::ConsumeCodeCache,
    NoCacheReason::NoReason,
  )?;

  let rejected = consumed
    .get_cached_data()
    .map(|data| data.rejected())
    .unwrap_or(true);
  if rejected {
    log::info!("code cache rejected, falling back to source: {source_url}");
    if stub.is_some() {
      // The placeholder is not real code; compile what was actually given.
      unbound = compile_from_source(scope, source, &origin)?;
    }
    if cache.should_save(true, true) {
      cache.save(&unbound);
    }
  }

  Some(unbound)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(mode: CodecacheMode) -> V8RuntimeConfig {
    V8RuntimeConfig::default().with_codecache(mode, "/nonexistent/cache.bin")
  }

  #[test]
  fn stub_length_is_little_endian_at_offset_eight() {
    let mut header = vec![0u8; 16];
    header[8..12].copy_from_slice(&0x0002_0304u32.to_le_bytes());
    assert_eq!(stub_source_length(&header), Some(0x0002_0304));
    assert_eq!(stub_source_length(&header[..11]), None);

    header[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
    assert_eq!(stub_source_length(&header), None);
  }

  #[test]
  fn save_policy() {
    let normal = CodeCache::new(&config(CodecacheMode::Normal), true);
    assert!(normal.should_save(false, false));
    assert!(normal.should_save(true, true));
    assert!(!normal.should_save(true, false));

    let prebuilt = CodeCache::new(&config(CodecacheMode::Prebuilt), true);
    assert!(!prebuilt.should_save(false, false));

    let shared = CodeCache::new(&config(CodecacheMode::Normal), false);
    assert!(!shared.should_save(false, false));
    assert!(!CodeCache::disabled().should_save(false, false));
  }

  #[test]
  fn load_sources() {
    let missing = CodeCache::new(&config(CodecacheMode::Normal), true);
    assert!(missing.load().is_none());

    let mut prebuilt = config(CodecacheMode::Prebuilt);
    prebuilt.prebuilt_codecache_blob = Some(vec![1, 2, 3]);
    let cache = CodeCache::new(&prebuilt, true);
    assert_eq!(cache.load().as_deref(), Some(&[1u8, 2, 3][..]));
    assert!(cache.uses_stub_source());
    assert!(CodeCache::new(&prebuilt, false).load().is_none());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    std::fs::write(&path, b"bytes").unwrap();
    let normal = CodeCache::new(
      &V8RuntimeConfig::default().with_codecache(CodecacheMode::Normal, &path),
      true,
    );
    assert_eq!(normal.load().as_deref(), Some(&b"bytes"[..]));
    assert!(!normal.uses_stub_source());
  }
}
