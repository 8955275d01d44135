//! Partial-update fields that tell an absent key apart from an explicit `null`.

use serde::{Deserialize, Deserializer};

/// Deserializer for `Option<Option<T>>` patch fields, used together with
/// `#[serde(default)]`.
///
/// A missing key stays `None` and leaves the column alone. `null` becomes
/// `Some(None)` and clears it. A value becomes `Some(Some(v))`.
pub fn nullable<'de, T, D>(
  deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
  use serde::Deserialize;

  #[derive(Debug, Deserialize)]
  struct Patch {
    #[serde(default, deserialize_with = "super::nullable")]
    note: Option<Option<String>>,
  }

  fn parse(json: &str) -> Option<Option<String>> {
    serde_json::from_str::<Patch>(json).unwrap().note
  }

  #[test]
  fn absent_null_and_value_are_distinct() {
    assert_eq!(parse("{}"), None);
    assert_eq!(parse(r#"{"note": null}"#), Some(None));
    assert_eq!(parse(r#"{"note": "x"}"#), Some(Some("x".into())));
  }
}
