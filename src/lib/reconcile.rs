//! Decides which source entries get appended to the destination.

use std::{collections::BTreeMap, fmt};

use tracing::{debug, trace};

use crate::parse::EnvMap;

/// How differing values are treated during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
  /// Append only keys the destination lacks.
  #[default]
  Missing,
  /// Also append keys whose destination value differs from the source.
  Force,
}

impl SyncMode {
  pub fn from_force(force: bool) -> Self {
    if force { Self::Force } else { Self::Missing }
  }

  pub fn is_force(self) -> bool {
    self == Self::Force
  }
}

impl fmt::Display for SyncMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SyncMode::Missing => write!(f, "missing"),
      SyncMode::Force => write!(f, "force"),
    }
  }
}

/// Computes the entries of `source` to append to a file whose content is
/// `destination`.
///
/// The result iterates in lexicographic key order, which is the order entries
/// are written in.
pub fn reconcile<'a>(
  source: &'a EnvMap,
  destination: &EnvMap,
  mode: SyncMode,
) -> BTreeMap<&'a str, &'a str> {
  let pending: BTreeMap<_, _> = source
    .iter()
    .filter(|(key, value)| match destination.get(key) {
      None => {
        trace!("{} missing from destination", key);
        true
      }
      Some(existing) if mode.is_force() && existing != *value => {
        trace!("{} differs from destination", key);
        true
      }
      Some(_) => false,
    })
    .collect();

  debug!(
    "Reconciled {} source keys against {} destination keys: {} pending ({})",
    source.len(),
    destination.len(),
    pending.len(),
    mode
  );

  pending
}

#[cfg(test)]
mod tests {
  use super::*;

  fn source() -> EnvMap {
    EnvMap::from_iter([("A", "1"), ("B", "2"), ("C", "3")])
  }

  fn destination() -> EnvMap {
    EnvMap::from_iter([("A", "old"), ("C", "3")])
  }

  #[test]
  fn test_missing_mode_only_adds_absent_keys() {
    let (source, destination) = (source(), destination());
    let pending = reconcile(&source, &destination, SyncMode::Missing);

    assert_eq!(pending, BTreeMap::from([("B", "2")]));
  }

  #[test]
  fn test_force_mode_adds_changed_and_absent_keys() {
    let (source, destination) = (source(), destination());
    let pending = reconcile(&source, &destination, SyncMode::Force);

    assert_eq!(pending, BTreeMap::from([("A", "1"), ("B", "2")]));
  }

  #[test]
  fn test_force_mode_compares_exact_strings() {
    let source = EnvMap::from_iter([("A", "value"), ("B", "Value")]);
    let destination = EnvMap::from_iter([("A", "value "), ("B", "value")]);

    let pending = reconcile(&source, &destination, SyncMode::Force);
    assert_eq!(pending.len(), 2);
  }

  #[test]
  fn test_empty_destination_takes_everything() {
    let source = source();
    let destination = EnvMap::default();

    for mode in [SyncMode::Missing, SyncMode::Force] {
      assert_eq!(reconcile(&source, &destination, mode).len(), 3);
    }
  }

  #[test]
  fn test_destination_superset_is_noop() {
    let source = EnvMap::from_iter([("A", "1")]);
    let destination = EnvMap::from_iter([("A", "1"), ("Z", "26")]);

    assert!(reconcile(&source, &destination, SyncMode::Force).is_empty());
    assert!(reconcile(&source, &destination, SyncMode::Missing).is_empty());
  }

  #[test]
  fn test_reconcile_is_idempotent() {
    let (source, destination) = (source(), destination());

    for mode in [SyncMode::Missing, SyncMode::Force] {
      assert_eq!(
        reconcile(&source, &destination, mode),
        reconcile(&source, &destination, mode)
      );
    }
  }

  #[test]
  fn test_force_is_superset_of_missing() {
    let source = EnvMap::from_iter([("A", "1"), ("B", "2"), ("C", "3"), ("D", "")]);
    let destination = EnvMap::from_iter([("A", "1"), ("B", "x"), ("D", "d")]);

    let missing = reconcile(&source, &destination, SyncMode::Missing);
    let forced = reconcile(&source, &destination, SyncMode::Force);

    assert!(missing.iter().all(|(key, value)| forced.get(key) == Some(value)));
    assert!(forced.len() >= missing.len());
  }

  #[test]
  fn test_pending_is_sorted() {
    let source = EnvMap::from_iter([("b", "1"), ("Z", "1"), ("A", "1"), ("a", "1")]);
    let pending = reconcile(&source, &EnvMap::default(), SyncMode::Missing);

    let keys: Vec<_> = pending.keys().copied().collect();
    assert_eq!(keys, vec!["A", "Z", "a", "b"]);
  }

  #[test]
  fn test_sync_mode_from_force() {
    assert_eq!(SyncMode::from_force(true), SyncMode::Force);
    assert_eq!(SyncMode::from_force(false), SyncMode::Missing);
    assert_eq!(SyncMode::default(), SyncMode::Missing);
  }
}
