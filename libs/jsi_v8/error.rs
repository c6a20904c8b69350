// Copyright 2018-2026 the Deno authors. MIT license.

use std::fmt;

use jsi::JsError;
use jsi::JsiError;

/// A caught exception together with the location V8 attributed it to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionReport {
  pub exception: String,
  pub resource_name: Option<String>,
  pub line_number: Option<usize>,
  pub start_column: usize,
  pub end_column: usize,
  pub source_line: Option<String>,
  pub stack: Option<String>,
}

impl ExceptionReport {
  /// Describes `exception` using the message V8 attaches to it. Must run
  /// inside a `TryCatch` since reading `stack` can itself throw.
  pub fn from_exception(
    scope: &mut v8::PinScope,
    exception: v8::Local<v8::Value>,
  ) -> Self {
    let stack = v8::Local::<v8::Object>::try_from(exception)
      .ok()
      .and_then(|obj| {
        let key = v8::String::new(scope, "stack")?;
        obj.get(scope, key.into())
      })
      .and_then(|s| v8::Local::<v8::String>::try_from(s).ok())
      .map(|s| s.to_rust_string_lossy(scope))
      .filter(|s| !s.is_empty());
    let message = v8::Exception::create_message(scope, exception);

    Self {
      exception: exception.to_rust_string_lossy(scope),
      resource_name: message
        .get_script_resource_name(scope)
        .and_then(|v| v8::Local::<v8::String>::try_from(v).ok())
        .map(|v| v.to_rust_string_lossy(scope)),
      line_number: message.get_line_number(scope),
      start_column: message.get_start_column(),
      end_column: message.get_end_column(),
      source_line: message
        .get_source_line(scope)
        .map(|v| v.to_rust_string_lossy(scope)),
      stack,
    }
  }
}

impl fmt::Display for ExceptionReport {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let Some(line_number) = self.line_number else {
      return write!(f, "{}", self.exception);
    };
    writeln!(
      f,
      "{}:{}: {}",
      self.resource_name.as_deref().unwrap_or(""),
      line_number,
      self.exception
    )?;
    writeln!(f, "{}", self.source_line.as_deref().unwrap_or(""))?;
    let carets = self.end_column.saturating_sub(self.start_column);
    writeln!(
      f,
      "{}{}",
      " ".repeat(self.start_column),
      "^".repeat(carets)
    )?;
    if let Some(stack) = &self.stack {
      writeln!(f, "{stack}")?;
    }
    Ok(())
  }
}

impl From<ExceptionReport> for JsiError {
  fn from(report: ExceptionReport) -> Self {
    let mut error = JsError::new(report.to_string());
    error.stack = report.stack;
    JsiError::Js(error)
  }
}

/// Builds the engine exception for a failure raised by host code. A leading
/// `TypeError: `-style prefix selects the matching error constructor.
pub fn to_v8_exception<'s>(
  scope: &mut v8::PinScope<'s, '_>,
  error: &JsiError,
) -> v8::Local<'s, v8::Value> {
  let (kind, text) = ErrorKind::split(error.message());
  let message = v8::String::new(scope, text)
    .unwrap_or_else(|| v8::String::empty(scope));
  match kind {
    ErrorKind::Error => v8::Exception::error(scope, message),
    ErrorKind::TypeError => v8::Exception::type_error(scope, message),
    ErrorKind::RangeError => v8::Exception::range_error(scope, message),
    ErrorKind::SyntaxError => v8::Exception::syntax_error(scope, message),
    ErrorKind::ReferenceError => {
      v8::Exception::reference_error(scope, message)
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
  Error,
  TypeError,
  RangeError,
  SyntaxError,
  ReferenceError,
}

impl ErrorKind {
  fn split(text: &str) -> (Self, &str) {
    const PREFIXES: [(&str, ErrorKind); 4] = [
      ("TypeError: ", ErrorKind::TypeError),
      ("RangeError: ", ErrorKind::RangeError),
      ("SyntaxError: ", ErrorKind::SyntaxError),
      ("ReferenceError: ", ErrorKind::ReferenceError),
    ];
    for (prefix, kind) in PREFIXES {
      if let Some(rest) = text.strip_prefix(prefix) {
        return (kind, rest);
      }
    }
    (ErrorKind::Error, text)
  }
}

/// Throws `error` into the engine.
pub fn throw(scope: &mut v8::PinScope, error: &JsiError) {
  let exception = to_v8_exception(scope, error);
  scope.throw_exception(exception);
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn host_error_prefix_selects_constructor() {
    assert_eq!(
      ErrorKind::split("TypeError: nope"),
      (ErrorKind::TypeError, "nope")
    );
    assert_eq!(
      ErrorKind::split("RangeError: 5"),
      (ErrorKind::RangeError, "5")
    );
    assert_eq!(ErrorKind::split("plain"), (ErrorKind::Error, "plain"));
    assert_eq!(
      ErrorKind::split("Error: TypeError: x"),
      (ErrorKind::Error, "Error: TypeError: x")
    );
  }

  #[test]
  fn report_without_location_is_exception_text() {
    let report = ExceptionReport {
      exception: "Error: boom".into(),
      ..Default::default()
    };
    assert_eq!(report.to_string(), "Error: boom");
  }

  #[test]
  fn report_points_at_the_offending_range() {
    let report = ExceptionReport {
      exception: "SyntaxError: Unexpected token ';'".into(),
      resource_name: Some("bad.js".into()),
      line_number: Some(1),
      start_column: 8,
      end_column: 9,
      source_line: Some("var a = ;".into()),
      stack: None,
    };
    assert_eq!(
      report.to_string(),
      "bad.js:1: SyntaxError: Unexpected token ';'\nvar a = ;\n        ^\n"
    );
  }

  #[test]
  fn report_keeps_stack() {
    let report = ExceptionReport {
      exception: "Error: boom".into(),
      resource_name: Some("a.js".into()),
      line_number: Some(3),
      start_column: 0,
      end_column: 1,
      source_line: Some("throw new Error('boom')".into()),
      stack: Some("Error: boom\n    at a.js:3:7".into()),
    };
    let err = JsiError::from(report);
    match err {
      JsiError::Js(e) => {
        assert!(e.message.ends_with("    at a.js:3:7\n"));
        assert_eq!(e.stack.as_deref(), Some("Error: boom\n    at a.js:3:7"));
      }
      JsiError::Native(_) => unreachable!(),
    }
  }
}
