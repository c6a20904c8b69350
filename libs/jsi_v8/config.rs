// Copyright 2018-2026 the Deno authors. MIT license.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::host::BlobLoader;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecacheMode {
  /// Disable bytecode caching.
  #[default]
  None,
  /// Consume the cache file when present and refresh it on disk when it is
  /// missing or rejected.
  Normal,
  /// Consume a read-only blob supplied with the configuration.
  Prebuilt,
  /// Like `Normal`, but a present cache lets the script source be replaced
  /// by a same-length placeholder.
  NormalWithStubBundle,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown codecache mode: {0}")]
pub struct UnknownCodecacheMode(pub u32);

impl TryFrom<u32> for CodecacheMode {
  type Error = UnknownCodecacheMode;

  fn try_from(value: u32) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(CodecacheMode::None),
      1 => Ok(CodecacheMode::Normal),
      2 => Ok(CodecacheMode::Prebuilt),
      3 => Ok(CodecacheMode::NormalWithStubBundle),
      other => Err(UnknownCodecacheMode(other)),
    }
  }
}

/// Construction-time options of a [`crate::V8Runtime`]. Immutable once the
/// runtime is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct V8RuntimeConfig {
  /// Olson timezone ID applied to the isolate's date computations.
  pub timezone_id: Option<String>,

  /// Connect the runtime to the remote debugging registry.
  pub enable_inspector: bool,

  /// Application name, used in the debugger page title.
  pub app_name: String,

  /// Device name.
  pub device_name: String,

  /// Startup snapshot bytes.
  #[serde(skip)]
  pub snapshot_blob: Option<Vec<u8>>,

  /// Where [`V8RuntimeConfig::resolve_blobs`] loads `snapshot_blob` from.
  pub snapshot_blob_path: Option<String>,

  pub codecache_mode: CodecacheMode,

  /// Cache file for `Normal` modes, or the blob location for `Prebuilt`.
  pub codecache_path: Option<PathBuf>,

  #[serde(skip)]
  pub prebuilt_codecache_blob: Option<Vec<u8>>,

  /// Extra V8 flags. Only the first runtime in a process applies them.
  pub v8_flags: Vec<String>,
}

impl V8RuntimeConfig {
  pub fn with_inspector(
    mut self,
    app_name: impl Into<String>,
    device_name: impl Into<String>,
  ) -> Self {
    self.enable_inspector = true;
    self.app_name = app_name.into();
    self.device_name = device_name.into();
    self
  }

  pub fn with_codecache(
    mut self,
    mode: CodecacheMode,
    path: impl Into<PathBuf>,
  ) -> Self {
    self.codecache_mode = mode;
    self.codecache_path = Some(path.into());
    self
  }

  pub fn with_timezone(mut self, timezone_id: impl Into<String>) -> Self {
    self.timezone_id = Some(timezone_id.into());
    self
  }

  pub fn with_v8_flags(mut self, flags: &[&str]) -> Self {
    self.v8_flags.extend(flags.iter().map(|f| f.to_string()));
    self
  }

  /// Fills the byte fields from their configured paths. Blobs that cannot
  /// be loaded stay unset.
  pub fn resolve_blobs(&mut self, loader: &dyn BlobLoader) {
    if self.snapshot_blob.is_none()
      && let Some(path) = self.snapshot_blob_path.as_deref()
      && !path.is_empty()
    {
      self.snapshot_blob = loader.load_blob(path);
    }

    if self.codecache_mode == CodecacheMode::Prebuilt
      && self.prebuilt_codecache_blob.is_none()
      && let Some(path) = self.codecache_path.as_deref()
    {
      self.prebuilt_codecache_blob =
        loader.load_blob(&path.to_string_lossy());
    }
  }
}
