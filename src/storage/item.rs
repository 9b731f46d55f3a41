//! Raw item type and typed attribute accessors.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use super::{Result, StorageError};
use crate::schema;

/// A stored row: attribute name to attribute value.
pub type Item = HashMap<String, AttributeValue>;

/// Typed accessors over an [`Item`].
///
/// Readers distinguish "attribute absent" from "attribute present but the
/// wrong type": absence is an `Option::None` (or a [`StorageError`] for
/// required attributes), a type mismatch is always an error. `NULL`
/// attribute values read as absent, matching how the writers use
/// `AttributeValue::Null` to reset fields.
pub trait ItemExt {
    fn req_s(&self, attr: &str) -> Result<&str>;
    fn opt_s(&self, attr: &str) -> Result<Option<&str>>;
    fn opt_i32(&self, attr: &str) -> Result<Option<i32>>;
    fn opt_i64(&self, attr: &str) -> Result<Option<i64>>;
    fn opt_f64(&self, attr: &str) -> Result<Option<f64>>;
    fn opt_bool(&self, attr: &str) -> Result<Option<bool>>;

    fn set_s(&mut self, attr: &str, value: impl Into<String>);
    fn set_opt_s(&mut self, attr: &str, value: Option<String>);
    fn set_i32(&mut self, attr: &str, value: i32);
    fn set_f64(&mut self, attr: &str, value: f64);
    fn set_bool(&mut self, attr: &str, value: bool);
    /// Store an explicit `NULL`, distinct from removing the attribute.
    fn set_null(&mut self, attr: &str);
}

fn describe_key(item: &Item) -> String {
    let pk = match item.get(schema::PK) {
        Some(AttributeValue::S(s)) => s.as_str(),
        _ => "?",
    };
    let sk = match item.get(schema::SK) {
        Some(AttributeValue::S(s)) => s.as_str(),
        _ => "?",
    };
    format!("{pk}/{sk}")
}

impl ItemExt for Item {
    fn req_s(&self, attr: &str) -> Result<&str> {
        self.opt_s(attr)?
            .ok_or_else(|| StorageError::MissingAttribute {
                key: describe_key(self),
                attribute: attr.to_string(),
            })
    }

    fn opt_s(&self, attr: &str) -> Result<Option<&str>> {
        match self.get(attr) {
            None | Some(AttributeValue::Null(_)) => Ok(None),
            Some(AttributeValue::S(s)) => Ok(Some(s)),
            Some(_) => Err(StorageError::BadAttribute {
                attribute: attr.to_string(),
                expected: "string",
            }),
        }
    }

    fn opt_i32(&self, attr: &str) -> Result<Option<i32>> {
        match self.get(attr) {
            None | Some(AttributeValue::Null(_)) => Ok(None),
            Some(AttributeValue::N(n)) => {
                n.parse::<i32>()
                    .map(Some)
                    .map_err(|_| StorageError::BadAttribute {
                        attribute: attr.to_string(),
                        expected: "i32",
                    })
            }
            Some(_) => Err(StorageError::BadAttribute {
                attribute: attr.to_string(),
                expected: "number",
            }),
        }
    }

    fn opt_i64(&self, attr: &str) -> Result<Option<i64>> {
        match self.get(attr) {
            None | Some(AttributeValue::Null(_)) => Ok(None),
            Some(AttributeValue::N(n)) => {
                n.parse::<i64>()
                    .map(Some)
                    .map_err(|_| StorageError::BadAttribute {
                        attribute: attr.to_string(),
                        expected: "i64",
                    })
            }
            Some(_) => Err(StorageError::BadAttribute {
                attribute: attr.to_string(),
                expected: "number",
            }),
        }
    }

    fn opt_f64(&self, attr: &str) -> Result<Option<f64>> {
        match self.get(attr) {
            None | Some(AttributeValue::Null(_)) => Ok(None),
            Some(AttributeValue::N(n)) => {
                n.parse::<f64>()
                    .map(Some)
                    .map_err(|_| StorageError::BadAttribute {
                        attribute: attr.to_string(),
                        expected: "f64",
                    })
            }
            Some(_) => Err(StorageError::BadAttribute {
                attribute: attr.to_string(),
                expected: "number",
            }),
        }
    }

    fn opt_bool(&self, attr: &str) -> Result<Option<bool>> {
        match self.get(attr) {
            None | Some(AttributeValue::Null(_)) => Ok(None),
            Some(AttributeValue::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(StorageError::BadAttribute {
                attribute: attr.to_string(),
                expected: "bool",
            }),
        }
    }

    fn set_s(&mut self, attr: &str, value: impl Into<String>) {
        self.insert(attr.to_string(), AttributeValue::S(value.into()));
    }

    fn set_opt_s(&mut self, attr: &str, value: Option<String>) {
        if let Some(v) = value {
            self.set_s(attr, v);
        }
    }

    fn set_i32(&mut self, attr: &str, value: i32) {
        self.insert(attr.to_string(), AttributeValue::N(value.to_string()));
    }

    fn set_f64(&mut self, attr: &str, value: f64) {
        self.insert(attr.to_string(), AttributeValue::N(value.to_string()));
    }

    fn set_bool(&mut self, attr: &str, value: bool) {
        self.insert(attr.to_string(), AttributeValue::Bool(value));
    }

    fn set_null(&mut self, attr: &str) {
        self.insert(attr.to_string(), AttributeValue::Null(true));
    }
}

/// Build a fresh item carrying just the primary key.
pub fn keyed(key: &crate::keys::ItemKey) -> Item {
    let mut item = Item::new();
    item.set_s(schema::PK, key.pk.clone());
    item.set_s(schema::SK, key.sk.clone());
    item
}
