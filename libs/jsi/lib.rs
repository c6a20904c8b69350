// Copyright 2018-2026 the Deno authors. MIT license.

//! Engine-agnostic JavaScript embedding interface.
//!
//! Host code manipulates values through the handle types in this crate and
//! the [`Runtime`] trait; an engine adapter (such as `jsi_v8`) supplies the
//! implementation.

mod error;
mod host;
mod runtime;
mod value;

pub use error::JsError;
pub use error::JsiError;
pub use host::HostFunction;
pub use host::HostObject;
pub use runtime::Buffer;
pub use runtime::PreparedJavaScript;
pub use runtime::Runtime;
pub use runtime::StringBuffer;
pub use value::Array;
pub use value::ArrayBuffer;
pub use value::Function;
pub use value::JsString;
pub use value::Object;
pub use value::PointerValue;
pub use value::PropNameId;
pub use value::Symbol;
pub use value::Value;
pub use value::WeakObject;
