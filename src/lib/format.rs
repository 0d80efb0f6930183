//! Rendering of values and appended sections back into env file syntax.

use std::borrow::Cow;

use chrono::NaiveDateTime;

use crate::reconcile::SyncMode;

const QUOTE: char = '"';
const ESCAPE: char = '\\';
const HEADER_PREFIX: &str = "# envmerge sync run";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders a value the way it is written after `KEY=`.
///
/// Values without whitespace, `#` or `"` are written verbatim. Anything else is
/// quoted with `\` and `"` escaped; newlines stay literal, which yields a
/// multiline value. An empty value is written as nothing.
pub fn format_value(value: &str) -> Cow<'_, str> {
  if !value.contains(needs_quotes) {
    return Cow::Borrowed(value);
  }

  let escaped = value
    .replace(ESCAPE, r"\\")
    .replace(QUOTE, r#"\""#);

  Cow::Owned(format!("{QUOTE}{escaped}{QUOTE}"))
}

/// A complete `KEY=value` line including its terminating newline.
pub fn format_line(key: &str, value: &str) -> String {
  format!("{key}={}\n", format_value(value))
}

/// The comment block opening each appended section, preceded by a blank line.
pub fn section_header(mode: SyncMode, at: &NaiveDateTime) -> String {
  let marker = if mode.is_force() { " (force)" } else { "" };
  format!("\n{HEADER_PREFIX}{marker}: {}\n", at.format(TIMESTAMP_FORMAT))
}

fn needs_quotes(c: char) -> bool {
  matches!(c, ' ' | '\t' | '\n' | '\r' | '#' | QUOTE)
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::parse::{EnvMap, ParseError};

  fn timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 7)
      .unwrap()
      .and_hms_opt(9, 5, 42)
      .unwrap()
  }

  #[test]
  fn test_format_value() {
    let cases = [
      ("abcDEF123_-./", "abcDEF123_-./"),
      ("hello world", "\"hello world\""),
      ("hello\tworld", "\"hello\tworld\""),
      ("value#comment", "\"value#comment\""),
      (r#"he said "hi""#, r#""he said \"hi\"""#),
      (r"C:\Temp\file", r"C:\Temp\file"),
      ("line1\nline2", "\"line1\nline2\""),
      ("line1\rline2", "\"line1\rline2\""),
      ("", ""),
    ];

    for (input, expected) in cases {
      assert_eq!(format_value(input), expected, "formatting {input:?}");
    }
  }

  #[test]
  fn test_backslash_escaped_before_quotes() {
    assert_eq!(format_value(r#"a\ "b""#), r#""a\\ \"b\"""#);
  }

  #[test]
  fn test_plain_value_is_borrowed() {
    assert!(matches!(format_value("plain"), Cow::Borrowed("plain")));
  }

  #[test]
  fn test_format_line() {
    assert_eq!(format_line("A", "hello world"), "A=\"hello world\"\n");
    assert_eq!(format_line("M", "plain"), "M=plain\n");
    assert_eq!(format_line("E", ""), "E=\n");
  }

  #[test]
  fn test_section_header() {
    assert_eq!(
      section_header(SyncMode::Missing, &timestamp()),
      "\n# envmerge sync run: 2026-03-07 09:05:42\n"
    );
    assert_eq!(
      section_header(SyncMode::Force, &timestamp()),
      "\n# envmerge sync run (force): 2026-03-07 09:05:42\n"
    );
  }

  #[test]
  fn test_plain_values_round_trip() {
    for value in ["abc", "a=b=c", r"C:\Temp", "postgres://u:p@h/db", "x'y"] {
      let env = EnvMap::try_from(format_line("K", value).as_str()).unwrap();
      assert_eq!(env.get("K"), Some(value));
    }
  }

  #[test]
  fn test_multiline_values_round_trip() {
    let values = [
      "line1\nline2",
      "line1\nline2\nline3",
      "-----BEGIN KEY-----\nMIIB\n  indented\n-----END KEY-----",
      "trailing\n",
    ];

    for value in values {
      let rendered = format_line("K", value);
      let env = EnvMap::try_from(rendered.as_str()).unwrap();
      assert_eq!(env.get("K"), Some(value), "round trip of {rendered:?}");
    }
  }

  // Quoting escapes `\` and `"`, but multiline values are read back verbatim,
  // so these values keep their escapes or stop parsing altogether.
  #[test]
  fn test_multiline_escapes_are_not_undone_by_parser() {
    let quoted = format_line("K", "say \"hi\" now\nbye");
    assert_eq!(quoted, "K=\"say \\\"hi\\\" now\nbye\"\n");
    let env = EnvMap::try_from(quoted.as_str()).unwrap();
    assert_eq!(env.get("K"), Some("say \\\"hi\\\" now\nbye"));

    let trailing_backslash = format_line("K", "a\nb\\");
    assert_eq!(trailing_backslash, "K=\"a\nb\\\\\"\n");
    let err = EnvMap::try_from(trailing_backslash.as_str()).unwrap_err();
    assert!(matches!(err, ParseError::UnterminatedValue { key } if key == "K"));
  }

  #[test]
  fn test_header_is_skipped_by_parser() {
    let content = format!("A=1{}B=2\n", section_header(SyncMode::Force, &timestamp()));
    let env = EnvMap::try_from(content.as_str()).unwrap();
    assert_eq!(env, EnvMap::from_iter([("A", "1"), ("B", "2")]));
  }
}
