// Copyright 2018-2026 the Deno authors. MIT license.

//! Interfaces of the collaborators the embedder supplies.

use std::path::PathBuf;
use std::sync::Arc;

/// The embedder's designated JavaScript thread.
pub trait JsQueue: Send + Sync {
  /// Runs `task` on the thread that owns the runtime.
  fn run_on_queue(&self, task: Box<dyn FnOnce() + Send>);
}

/// Reads scripts, snapshots and cache blobs.
pub trait BlobLoader {
  /// Returns `None` when the blob does not exist or cannot be read.
  fn load_blob(&self, path: &str) -> Option<Vec<u8>>;
}

const ASSET_SCHEME: &str = "assets://";

/// Loads `assets://name` from an asset directory and everything else from
/// the filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileBlobLoader {
  asset_root: Option<PathBuf>,
}

impl FileBlobLoader {
  pub fn new(asset_root: Option<PathBuf>) -> Self {
    Self { asset_root }
  }
}

impl BlobLoader for FileBlobLoader {
  fn load_blob(&self, path: &str) -> Option<Vec<u8>> {
    let resolved = match path.strip_prefix(ASSET_SCHEME) {
      Some(name) => match &self.asset_root {
        Some(root) => root.join(name),
        None => {
          log::error!("Unable to load blob from assets - name[{name}]");
          return None;
        }
      },
      None => PathBuf::from(path),
    };

    match std::fs::read(&resolved) {
      Ok(bytes) => Some(bytes),
      Err(err) => {
        log::error!("Unable to load blob {}: {err}", resolved.display());
        None
      }
    }
  }
}

/// The debugger front end's side of a session.
pub trait RemoteConnection: Send + Sync {
  fn on_message(&self, message: String);
  fn on_disconnect(&self);
}

/// The runtime's side of a session, handed to the registry.
pub trait LocalConnection: Send + Sync {
  fn send_message(&self, message: String);
  fn disconnect(&self);
}

pub type ConnectFn = Box<
  dyn Fn(Arc<dyn RemoteConnection>) -> Box<dyn LocalConnection> + Send + Sync,
>;

/// Page registry of the remote debugging server.
pub trait InspectorRegistry: Send + Sync {
  fn add_page(&self, title: &str, vm: &str, connect: ConnectFn) -> i32;
  fn remove_page(&self, page_id: i32);
}
