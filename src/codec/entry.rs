//! The typed entry model and its binary codec.
//!
//! An entry document is a two-element array `[data, metadata]`.  Only
//! the data slot is interpreted here; the metadata slot is reserved and
//! written as null.  The data slot is a map `{"fields": {name: field}}`
//! whose field order is preserved.
//!
//! Fields and derived usages are tagged unions on the wire:
//! `{"variant": <tag>, "fields": [<tuple>]}` for every variant, unit
//! variants included.  Stored usages are bare text strings.
//!
//! Decoding is containing, not strict: a sub-structure this version
//! cannot interpret becomes the smallest possible `Unreadable` sentinel
//! while everything around it stays intact.  An `Unreadable` sentinel
//! means "data present but not understood" and is never the same thing
//! as an absent field.

use crate::codec::value::{self, Value};
use crate::crypto::keys::SecretBytes;
use crate::errors::{DerivaultError, Result};

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// Map key for the entry's field map and for tagged-union tuples.
const KEY_FIELDS: &str = "fields";

/// Map key carrying a tagged union's discriminator.
const KEY_VARIANT: &str = "variant";

const TAG_DERIVED: &str = "Derived";
const TAG_STORED: &str = "Stored";
const TAG_PASSWORD: &str = "Password";
const TAG_ED25519: &str = "Ed25519Key";
const TAG_RAW_KEY: &str = "RawKey";
const TAG_UNREADABLE: &str = "Unreadable";

const STORED_USAGE_TEXT: &str = "Text";
const STORED_USAGE_PASSWORD: &str = "Password";

// ---------------------------------------------------------------------------
// Typed model
// ---------------------------------------------------------------------------

/// How a stored payload is meant to be presented.
///
/// Presentation only: the payload bytes are identical either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredUsage {
    /// Plain text, safe to show on screen.
    Text,
    /// A password; display should be masked.
    Password,
    /// Usage written by a newer format version.  The payload is kept.
    Unreadable,
}

/// What a derived field regenerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedUsage {
    /// A password shaped by a named template preset (e.g. "Maximum").
    Password { template: String },
    /// An Ed25519 signing keypair, scoped by a usage string.
    Ed25519Key { usage: String },
    /// Raw derived key bytes, not intended for display.
    RawKey,
    /// Usage written by a newer format version.  Generation must refuse
    /// rather than guess: substituting a default would silently change
    /// the secret derived for the same counter.
    Unreadable,
}

/// A single named field inside an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A secret regenerated on demand; nothing secret is persisted.
    /// `site_name` defaults to the owning entry's name when absent.
    Derived {
        counter: u32,
        site_name: Option<String>,
        usage: DerivedUsage,
    },
    /// An opaque payload persisted as-is (sealed by the store).
    Stored { data: SecretBytes, usage: StoredUsage },
    /// A field this version could not interpret.  Round-trips as an
    /// explicit marker so the data is never silently dropped.
    Unreadable,
}

impl Field {
    /// UTF-8 view of a stored payload.
    ///
    /// `None` when the field is not `Stored` or the bytes are not valid
    /// UTF-8; callers render that as empty.  The view never mutates the
    /// payload, so binary data survives being looked at.
    pub fn stored_text(&self) -> Option<&str> {
        match self {
            Field::Stored { data, .. } => std::str::from_utf8(data.expose()).ok(),
            _ => None,
        }
    }

    /// Build a `Stored` field from an explicit text edit.
    pub fn stored_from_text(text: &str, usage: StoredUsage) -> Field {
        Field::Stored {
            data: SecretBytes::from_slice(text.as_bytes()),
            usage,
        }
    }
}

/// A named record of fields.
///
/// Field names are unique; inserting an existing name replaces the
/// field in place, keeping its position.  Iteration order is insertion
/// order, and the wire format preserves it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    fields: Vec<(String, Field)>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field by name.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    /// Remove a field by name, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Iterate fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode an entry as a `[data, metadata]` document.
///
/// Total: every reachable variant has an encoding, `Unreadable`
/// included.
pub fn encode_entry(entry: &Entry) -> Vec<u8> {
    let fields = entry
        .fields
        .iter()
        .map(|(name, field)| (text(name), field_value(field)))
        .collect();

    let data = Value::Map(vec![(text(KEY_FIELDS), Value::Map(fields))]);

    // The metadata slot is reserved; nothing in it is interpreted yet.
    let doc = Value::Array(vec![data, Value::Null]);
    value::encode_value(&doc)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// `{"variant": tag, "fields": [tuple...]}`
fn tagged(tag: &str, tuple: Vec<Value>) -> Value {
    Value::Map(vec![
        (text(KEY_VARIANT), text(tag)),
        (text(KEY_FIELDS), Value::Array(tuple)),
    ])
}

fn field_value(field: &Field) -> Value {
    match field {
        Field::Derived {
            counter,
            site_name,
            usage,
        } => tagged(
            TAG_DERIVED,
            vec![
                Value::Uint(*counter as u64),
                // Null keeps the usage at tuple index 2.
                match site_name {
                    Some(site) => text(site),
                    None => Value::Null,
                },
                derived_usage_value(usage),
            ],
        ),
        Field::Stored { data, usage } => tagged(
            TAG_STORED,
            vec![
                Value::Bytes(data.expose().to_vec()),
                stored_usage_value(usage),
            ],
        ),
        Field::Unreadable => tagged(TAG_UNREADABLE, Vec::new()),
    }
}

fn derived_usage_value(usage: &DerivedUsage) -> Value {
    match usage {
        DerivedUsage::Password { template } => tagged(TAG_PASSWORD, vec![text(template)]),
        DerivedUsage::Ed25519Key { usage } => tagged(TAG_ED25519, vec![text(usage)]),
        DerivedUsage::RawKey => tagged(TAG_RAW_KEY, Vec::new()),
        DerivedUsage::Unreadable => tagged(TAG_UNREADABLE, Vec::new()),
    }
}

fn stored_usage_value(usage: &StoredUsage) -> Value {
    match usage {
        StoredUsage::Text => text(STORED_USAGE_TEXT),
        StoredUsage::Password => text(STORED_USAGE_PASSWORD),
        StoredUsage::Unreadable => text(TAG_UNREADABLE),
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an entry document.
///
/// Fails only when the whole payload is unparseable: malformed bytes,
/// or a document that carries no fields map at all.  Every lesser
/// problem is contained per the module policy.
pub fn decode_entry(data: &[u8]) -> Result<Entry> {
    let doc = value::decode_value(data)?;

    // [data, metadata]; extra elements and a bare data map are tolerated.
    let entry_value = match &doc {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| DerivaultError::Codec("document array is empty".into()))?,
        Value::Map(_) => &doc,
        _ => {
            return Err(DerivaultError::Codec(
                "document is neither an array nor a map".into(),
            ))
        }
    };

    let fields_value = entry_value
        .map_get(KEY_FIELDS)
        .ok_or_else(|| DerivaultError::Codec("document has no fields map".into()))?;
    let pairs = fields_value
        .as_map()
        .ok_or_else(|| DerivaultError::Codec("fields is not a map".into()))?;

    let mut entry = Entry::new();
    for (key, field_val) in pairs {
        // A non-text key cannot be represented in a string-keyed model;
        // there is no name to hang a sentinel on.
        let name = match key.as_str() {
            Some(name) => name,
            None => continue,
        };
        entry.insert(name, decode_field(field_val));
    }
    Ok(entry)
}

/// Decode a field value.  Total: anything unrecognized becomes the
/// smallest fitting `Unreadable`.
fn decode_field(value: &Value) -> Field {
    let variant = match value.map_get(KEY_VARIANT).and_then(Value::as_str) {
        Some(v) => v,
        None => return Field::Unreadable,
    };
    let tuple = value
        .map_get(KEY_FIELDS)
        .and_then(Value::as_array)
        .unwrap_or(&[]);

    match variant {
        TAG_DERIVED => {
            // The counter is required and must fit u32.
            let counter = match tuple
                .first()
                .and_then(Value::as_uint)
                .and_then(|n| u32::try_from(n).ok())
            {
                Some(c) => c,
                None => return Field::Unreadable,
            };
            // Absent, null or ill-typed site names all mean "use the
            // entry name".
            let site_name = tuple.get(1).and_then(Value::as_str).map(str::to_string);
            let usage = match tuple.get(2) {
                Some(v) => decode_derived_usage(v),
                None => DerivedUsage::Unreadable,
            };
            Field::Derived {
                counter,
                site_name,
                usage,
            }
        }
        TAG_STORED => {
            let data = match tuple.first().and_then(Value::as_bytes) {
                Some(b) => SecretBytes::from_slice(b),
                None => return Field::Unreadable,
            };
            let usage = match tuple.get(1) {
                Some(v) => decode_stored_usage(v),
                None => StoredUsage::Unreadable,
            };
            Field::Stored { data, usage }
        }
        TAG_UNREADABLE => Field::Unreadable,
        _ => Field::Unreadable,
    }
}

fn decode_derived_usage(value: &Value) -> DerivedUsage {
    let variant = match value.map_get(KEY_VARIANT).and_then(Value::as_str) {
        Some(v) => v,
        None => return DerivedUsage::Unreadable,
    };
    let tuple = value
        .map_get(KEY_FIELDS)
        .and_then(Value::as_array)
        .unwrap_or(&[]);

    match variant {
        // The template is required.  No default: a guessed template
        // would derive a different password than the writer intended.
        TAG_PASSWORD => match tuple.first().and_then(Value::as_str) {
            Some(template) => DerivedUsage::Password {
                template: template.to_string(),
            },
            None => DerivedUsage::Unreadable,
        },
        TAG_ED25519 => match tuple.first().and_then(Value::as_str) {
            Some(usage) => DerivedUsage::Ed25519Key {
                usage: usage.to_string(),
            },
            None => DerivedUsage::Unreadable,
        },
        TAG_RAW_KEY => DerivedUsage::RawKey,
        TAG_UNREADABLE => DerivedUsage::Unreadable,
        _ => DerivedUsage::Unreadable,
    }
}

fn decode_stored_usage(value: &Value) -> StoredUsage {
    match value.as_str() {
        Some(STORED_USAGE_TEXT) => StoredUsage::Text,
        Some(STORED_USAGE_PASSWORD) => StoredUsage::Password,
        // Unknown strings, null, wrong types: keep the payload, mark
        // the presentation unknown.
        _ => StoredUsage::Unreadable,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(entry: &Entry) -> Entry {
        decode_entry(&encode_entry(entry)).unwrap()
    }

    #[test]
    fn empty_entry_round_trips() {
        let e = Entry::new();
        assert_eq!(round_trip(&e), e);
    }

    #[test]
    fn stored_field_round_trips() {
        let mut e = Entry::new();
        e.insert(
            "login",
            Field::Stored {
                data: SecretBytes::from_slice(b"alice123"),
                usage: StoredUsage::Text,
            },
        );
        assert_eq!(round_trip(&e), e);
    }

    #[test]
    fn derived_field_round_trips() {
        let mut e = Entry::new();
        e.insert(
            "password",
            Field::Derived {
                counter: 3,
                site_name: Some("example.com".into()),
                usage: DerivedUsage::Password {
                    template: "Maximum".into(),
                },
            },
        );
        e.insert(
            "ssh",
            Field::Derived {
                counter: 1,
                site_name: None,
                usage: DerivedUsage::Ed25519Key {
                    usage: "ssh".into(),
                },
            },
        );
        e.insert(
            "key",
            Field::Derived {
                counter: 1,
                site_name: None,
                usage: DerivedUsage::RawKey,
            },
        );
        assert_eq!(round_trip(&e), e);
    }

    #[test]
    fn unreadable_variants_round_trip_explicitly() {
        let mut e = Entry::new();
        e.insert("mystery", Field::Unreadable);
        e.insert(
            "partial",
            Field::Derived {
                counter: 1,
                site_name: None,
                usage: DerivedUsage::Unreadable,
            },
        );
        e.insert(
            "blob",
            Field::Stored {
                data: SecretBytes::from_slice(&[0, 159, 146]),
                usage: StoredUsage::Unreadable,
            },
        );
        assert_eq!(round_trip(&e), e);
    }

    #[test]
    fn field_order_is_preserved() {
        let mut e = Entry::new();
        e.insert("zebra", Field::Unreadable);
        e.insert("alpha", Field::Unreadable);
        e.insert("middle", Field::Unreadable);
        let decoded = round_trip(&e);
        let names: Vec<&str> = decoded.field_names().collect();
        assert_eq!(names, vec!["zebra", "alpha", "middle"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut e = Entry::new();
        e.insert("a", Field::Unreadable);
        e.insert("b", Field::Unreadable);
        e.insert(
            "a",
            Field::Stored {
                data: SecretBytes::from_slice(b"x"),
                usage: StoredUsage::Text,
            },
        );
        assert_eq!(e.len(), 2);
        assert_eq!(e.field_names().next(), Some("a"));
        assert!(matches!(e.get("a"), Some(Field::Stored { .. })));
    }

    #[test]
    fn unknown_field_variant_is_contained() {
        // Handcraft a document with one good field and one from the future.
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![
                    (
                        Value::Text("good".into()),
                        tagged(
                            TAG_STORED,
                            vec![
                                Value::Bytes(b"data".to_vec()),
                                Value::Text("Text".into()),
                            ],
                        ),
                    ),
                    (
                        Value::Text("future".into()),
                        tagged("Quantum", vec![Value::Uint(9)]),
                    ),
                ]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert_eq!(entry.len(), 2);
        assert!(matches!(entry.get("good"), Some(Field::Stored { .. })));
        assert_eq!(entry.get("future"), Some(&Field::Unreadable));
    }

    #[test]
    fn missing_counter_is_contained() {
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![(
                    Value::Text("d".into()),
                    tagged(TAG_DERIVED, vec![]),
                )]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert_eq!(entry.get("d"), Some(&Field::Unreadable));
    }

    #[test]
    fn oversized_counter_is_contained() {
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![(
                    Value::Text("d".into()),
                    tagged(TAG_DERIVED, vec![Value::Uint(u64::MAX), Value::Null]),
                )]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert_eq!(entry.get("d"), Some(&Field::Unreadable));
    }

    #[test]
    fn unknown_derived_usage_keeps_field_shape() {
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![(
                    Value::Text("d".into()),
                    tagged(
                        TAG_DERIVED,
                        vec![
                            Value::Uint(4),
                            Value::Text("site".into()),
                            tagged("PostQuantumKey", vec![]),
                        ],
                    ),
                )]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert_eq!(
            entry.get("d"),
            Some(&Field::Derived {
                counter: 4,
                site_name: Some("site".into()),
                usage: DerivedUsage::Unreadable,
            })
        );
    }

    #[test]
    fn missing_template_never_defaults() {
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![(
                    Value::Text("d".into()),
                    tagged(
                        TAG_DERIVED,
                        vec![Value::Uint(1), Value::Null, tagged(TAG_PASSWORD, vec![])],
                    ),
                )]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert_eq!(
            entry.get("d"),
            Some(&Field::Derived {
                counter: 1,
                site_name: None,
                usage: DerivedUsage::Unreadable,
            })
        );
    }

    #[test]
    fn unknown_stored_usage_keeps_data() {
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![(
                    Value::Text("s".into()),
                    tagged(
                        TAG_STORED,
                        vec![Value::Bytes(b"keep me".to_vec()), Value::Text("Hologram".into())],
                    ),
                )]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert_eq!(
            entry.get("s"),
            Some(&Field::Stored {
                data: SecretBytes::from_slice(b"keep me"),
                usage: StoredUsage::Unreadable,
            })
        );
    }

    #[test]
    fn extra_tuple_elements_are_ignored() {
        let doc = Value::Array(vec![
            Value::Map(vec![(
                Value::Text("fields".into()),
                Value::Map(vec![(
                    Value::Text("s".into()),
                    tagged(
                        TAG_STORED,
                        vec![
                            Value::Bytes(b"v".to_vec()),
                            Value::Text("Text".into()),
                            Value::Uint(42),
                            Value::Text("from the future".into()),
                        ],
                    ),
                )]),
            )]),
            Value::Null,
        ]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert!(matches!(
            entry.get("s"),
            Some(Field::Stored {
                usage: StoredUsage::Text,
                ..
            })
        ));
    }

    #[test]
    fn bare_data_map_is_accepted() {
        let doc = Value::Map(vec![(
            Value::Text("fields".into()),
            Value::Map(vec![]),
        )]);
        let entry = decode_entry(&value::encode_value(&doc)).unwrap();
        assert!(entry.is_empty());
    }

    #[test]
    fn garbage_payload_is_a_hard_error() {
        assert!(decode_entry(&[0xff, 0x00, 0x13]).is_err());
        assert!(decode_entry(&value::encode_value(&Value::Uint(7))).is_err());
    }

    #[test]
    fn stored_text_view_degrades_on_binary() {
        let text_field = Field::stored_from_text("hello", StoredUsage::Text);
        assert_eq!(text_field.stored_text(), Some("hello"));

        let binary = Field::Stored {
            data: SecretBytes::from_slice(&[0xff, 0xfe, 0x00]),
            usage: StoredUsage::Text,
        };
        assert_eq!(binary.stored_text(), None);

        // Looking at the view never rewrites the payload.
        if let Field::Stored { data, .. } = &binary {
            assert_eq!(data.expose(), &[0xff, 0xfe, 0x00]);
        }
    }
}
