// Copyright 2018-2026 the Deno authors. MIT license.

//! V8 implementation of the [`jsi`] embedding interface.
//!
//! [`V8Runtime`] owns an isolate and a context; [`V8Runtime::new_shared`]
//! adds further contexts on the same isolate. Host objects and host
//! functions are exposed to script through interceptors and callbacks, and
//! can be debugged remotely through an [`InspectorRegistry`].

mod code_cache;
mod config;
mod converter;
mod error;
mod factory;
mod host;
mod host_proxy;
mod idle;
mod inspector;
mod isolate;
mod platform;
mod pointer_value;
mod runtime;

pub use config::CodecacheMode;
pub use config::UnknownCodecacheMode;
pub use config::V8RuntimeConfig;
pub use error::ExceptionReport;
pub use factory::create_v8_runtime;
pub use host::BlobLoader;
pub use host::ConnectFn;
pub use host::FileBlobLoader;
pub use host::InspectorRegistry;
pub use host::JsQueue;
pub use host::LocalConnection;
pub use host::RemoteConnection;
pub use idle::CallbackId;
pub use idle::MainLoopRegistry;
pub use platform::init_platform;
pub use platform::is_platform_initialized;
pub use pointer_value::V8PointerValue;
pub use runtime::RuntimeOptions;
pub use runtime::V8Runtime;
