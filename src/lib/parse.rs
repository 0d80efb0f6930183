use std::{
  collections::{HashMap, hash_map},
  convert::TryFrom,
  io::{self, BufRead, Read},
};

use tracing::{debug, trace};

const COMMENT_PREFIX: char = '#';
const ASSIGNMENT_OPERATOR: char = '=';
const QUOTE: char = '"';
const ESCAPE: char = '\\';

/// Longest logical line the parser accepts, terminator excluded.
///
/// Large enough for embedded certificates and keys.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Parsed key-value content of an env file.
///
/// Ordering is not preserved; writers sort keys themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvMap {
  vars: HashMap<String, String>,
}

impl EnvMap {
  /// Parses an env file from a buffered reader.
  ///
  /// Fails on the first malformed line; no partial mapping is returned.
  pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, ParseError> {
    let mut vars = HashMap::new();
    let mut state = State::Normal;
    let mut buf = Vec::new();
    let mut line_no = 0;

    while read_line(&mut reader, &mut buf, line_no + 1)? {
      line_no += 1;
      let raw =
        std::str::from_utf8(&buf).map_err(|_| ParseError::InvalidUtf8 { line: line_no })?;

      state = match state {
        State::Normal => parse_line(raw, line_no, &mut vars)?,
        State::Multiline { key, mut value } => {
          let line = raw.strip_suffix('\r').unwrap_or(raw);
          value.push('\n');

          if let Some(rest) = closing_quote(line) {
            trace!("Closing multiline value for {} at line {}", key, line_no);
            value.push_str(rest);
            vars.insert(key, value);
            State::Normal
          } else {
            value.push_str(line);
            State::Multiline { key, value }
          }
        }
      };
    }

    if let State::Multiline { key, .. } = state {
      return Err(ParseError::UnterminatedValue { key });
    }

    debug!("Parsed {} variables from {} lines", vars.len(), line_no);

    Ok(Self { vars })
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.vars.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Iterates over entries in arbitrary order.
  pub fn iter(&self) -> Iter<'_> {
    Iter(self.vars.iter())
  }
}

impl<'a> TryFrom<&'a str> for EnvMap {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    Self::from_reader(s.as_bytes())
  }
}

impl<K, V> FromIterator<(K, V)> for EnvMap
where
  K: Into<String>,
  V: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      vars: iter
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect(),
    }
  }
}

/// Iterator over `(key, value)` pairs of an [`EnvMap`].
pub struct Iter<'a>(hash_map::Iter<'a, String, String>);

impl<'a> Iterator for Iter<'a> {
  type Item = (&'a str, &'a str);

  fn next(&mut self) -> Option<Self::Item> {
    self
      .0
      .next()
      .map(|(key, value)| (key.as_str(), value.as_str()))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.0.size_hint()
  }
}

impl<'a> IntoIterator for &'a EnvMap {
  type Item = (&'a str, &'a str);
  type IntoIter = Iter<'a>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

enum State {
  Normal,
  Multiline { key: String, value: String },
}

/// Reads one line into `buf` without its `\n`. Returns `false` at end of input.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>, line: usize) -> Result<bool, ParseError> {
  buf.clear();

  // room for a full `\r\n` terminator
  let limit = MAX_LINE_LEN as u64 + 2;
  let read = reader.by_ref().take(limit).read_until(b'\n', buf)?;
  if read == 0 {
    return Ok(false);
  }

  if buf.last() == Some(&b'\n') {
    buf.pop();
  }
  let content_len = buf.len() - usize::from(buf.ends_with(b"\r"));
  if content_len > MAX_LINE_LEN {
    return Err(ParseError::LineTooLong {
      line,
      limit: MAX_LINE_LEN,
    });
  }

  Ok(true)
}

/// Handles a line outside of a multiline value.
fn parse_line(raw: &str, line_no: usize, vars: &mut HashMap<String, String>) -> Result<State, ParseError> {
  let line = raw.trim();

  if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
    return Ok(State::Normal);
  }

  let Some((key, value)) = line.split_once(ASSIGNMENT_OPERATOR) else {
    return Err(ParseError::InvalidLine {
      line: line_no,
      content: line.to_string(),
    });
  };

  let key = key.trim();
  if key.is_empty() {
    return Err(ParseError::EmptyKey { line: line_no });
  }

  let value = value.trim();

  if !value.ends_with(QUOTE)
    && let Some(rest) = value.strip_prefix(QUOTE)
  {
    trace!("Opening multiline value for {} at line {}", key, line_no);
    return Ok(State::Multiline {
      key: key.to_string(),
      value: rest.to_string(),
    });
  }

  trace!("Parsed variable {} at line {}", key, line_no);
  vars.insert(key.to_string(), unquote(value).to_string());

  Ok(State::Normal)
}

/// Strips exactly one pair of surrounding quotes. Escapes are left untouched.
/// A lone `"` counts as an empty quoted value.
fn unquote(value: &str) -> &str {
  match value.strip_prefix(QUOTE) {
    Some("") => "",
    Some(inner) => inner.strip_suffix(QUOTE).unwrap_or(value),
    None => value,
  }
}

/// Returns the line content before its closing quote, if the line closes a
/// multiline value. Trailing spaces and tabs after the quote are ignored.
fn closing_quote(line: &str) -> Option<&str> {
  line
    .trim_end_matches([' ', '\t'])
    .strip_suffix(QUOTE)
    .filter(|rest| !rest.ends_with(ESCAPE))
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("invalid env line {line}: {content:?}")]
  InvalidLine { line: usize, content: String },
  #[error("empty key at line {line}")]
  EmptyKey { line: usize },
  #[error("unterminated multiline value for key {key:?}")]
  UnterminatedValue { key: String },
  #[error("line {line} exceeds the {limit} byte limit")]
  LineTooLong { line: usize, limit: usize },
  #[error("line {line} is not valid UTF-8")]
  InvalidUtf8 { line: usize },
  #[error("error scanning input: {0}")]
  Io(#[from] io::Error),
}
