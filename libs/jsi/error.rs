// Copyright 2018-2026 the Deno authors. MIT license.

use std::fmt;

/// An exception raised by JavaScript code, or a failure the engine reports
/// the same way (compile errors, failed string allocation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsError {
  pub message: String,
  pub stack: Option<String>,
}

impl JsError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      stack: None,
    }
  }

  pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
    self.stack = Some(stack.into());
    self
  }
}

impl fmt::Display for JsError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl std::error::Error for JsError {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsiError {
  #[error(transparent)]
  Js(#[from] JsError),
  /// A failure on the native side of the bridge that was not caused by
  /// script.
  #[error("{0}")]
  Native(String),
}

impl JsiError {
  pub fn js(message: impl Into<String>) -> Self {
    JsiError::Js(JsError::new(message))
  }

  pub fn native(message: impl Into<String>) -> Self {
    JsiError::Native(message.into())
  }

  pub fn message(&self) -> &str {
    match self {
      JsiError::Js(e) => &e.message,
      JsiError::Native(message) => message,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn js_error_display_is_message() {
    let err = JsError::new("boom").with_stack("at <anon>:1:1");
    assert_eq!(err.to_string(), "boom");
    assert_eq!(err.stack.as_deref(), Some("at <anon>:1:1"));
  }

  #[test]
  fn jsi_error_message() {
    assert_eq!(JsiError::js("a").message(), "a");
    assert_eq!(JsiError::native("b").message(), "b");
    assert_eq!(JsiError::native("b").to_string(), "b");
  }
}
