//! Typed description of the object graph a [`crate::mirror::Mirror`] tracks.
//!
//! A [`Schema`] is supplied once, at construction time, and is never
//! mutated afterwards. It is fingerprinted and stored alongside the data it
//! describes so that a store can detect being reopened with an incompatible
//! schema (see [`crate::store`]).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The kind of a single field on an [`TypeDef::Object`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Field {
    /// The object's primary, globally-unique identifier. Exactly one of
    /// these must appear per object type.
    Id,
    /// A scalar value stored verbatim in the object's `data_T` row.
    Primitive,
    /// A singular link to another object, stored as a row in `links`.
    Node { target: String },
    /// A paginated list of other objects, stored as a `connections` row
    /// plus an ordered `connection_entries` log.
    Connection { element: String },
}

impl Field {
    pub fn id() -> Self {
        Field::Id
    }

    pub fn primitive() -> Self {
        Field::Primitive
    }

    pub fn node(target: impl Into<String>) -> Self {
        Field::Node {
            target: target.into(),
        }
    }

    pub fn connection(element: impl Into<String>) -> Self {
        Field::Connection {
            element: element.into(),
        }
    }
}

/// A type definition: either a concrete object with physical storage, or a
/// tag-only union used when the concrete type of a referenced object must
/// be resolved before it can be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDef {
    Object {
        /// Ordered so that bootstrap creates `data_T` columns in a stable,
        /// reproducible order.
        fields: BTreeMap<String, Field>,
    },
    Union {
        members: BTreeSet<String>,
    },
}

impl TypeDef {
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Field)>,
        S: Into<String>,
    {
        TypeDef::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn union<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeDef::Union {
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, TypeDef::Object { .. })
    }

    pub fn is_union(&self) -> bool {
        matches!(self, TypeDef::Union { .. })
    }

    /// Iterates the `Connection` fields of an object type. Empty for unions.
    pub fn connection_fields(&self) -> Vec<(&str, &str)> {
        match self {
            TypeDef::Object { fields } => fields
                .iter()
                .filter_map(|(name, field)| match field {
                    Field::Connection { element } => Some((name.as_str(), element.as_str())),
                    _ => None,
                })
                .collect(),
            TypeDef::Union { .. } => Vec::new(),
        }
    }

    /// Iterates the `Node` fields of an object type. Empty for unions.
    pub fn node_fields(&self) -> Vec<(&str, &str)> {
        match self {
            TypeDef::Object { fields } => fields
                .iter()
                .filter_map(|(name, field)| match field {
                    Field::Node { target } => Some((name.as_str(), target.as_str())),
                    _ => None,
                })
                .collect(),
            TypeDef::Union { .. } => Vec::new(),
        }
    }

    /// Iterates the `Primitive` field names of an object type. Empty for unions.
    pub fn primitive_fields(&self) -> Vec<&str> {
        match self {
            TypeDef::Object { fields } => fields
                .iter()
                .filter_map(|(name, field)| match field {
                    Field::Primitive => Some(name.as_str()),
                    _ => None,
                })
                .collect(),
            TypeDef::Union { .. } => Vec::new(),
        }
    }

    fn id_field(&self) -> Option<&str> {
        match self {
            TypeDef::Object { fields } => fields.iter().find_map(|(name, field)| {
                if matches!(field, Field::Id) {
                    Some(name.as_str())
                } else {
                    None
                }
            }),
            TypeDef::Union { .. } => None,
        }
    }
}

/// An immutable, validated mapping from type name to type definition.
///
/// Construction validates: exactly one `Id` field per object, every
/// `Node`/`Connection` target present in the same schema, every union
/// member naming an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema(BTreeMap<String, TypeDef>);

impl Schema {
    pub fn new(types: BTreeMap<String, TypeDef>) -> Result<Self, Error> {
        for (name, def) in &types {
            if let TypeDef::Object { .. } = def {
                let id_fields = match def {
                    TypeDef::Object { fields } => {
                        fields.values().filter(|f| matches!(f, Field::Id)).count()
                    }
                    TypeDef::Union { .. } => unreachable!(),
                };
                if id_fields != 1 {
                    return Err(Error::UnknownType(format!(
                        "object type '{name}' must have exactly one Id field, found {id_fields}"
                    )));
                }
            }

            for (_, target) in def.node_fields() {
                Self::check_target_exists(&types, name, target)?;
            }
            for (_, element) in def.connection_fields() {
                Self::check_target_exists(&types, name, element)?;
            }

            if let TypeDef::Union { members } = def {
                for member in members {
                    match types.get(member) {
                        Some(TypeDef::Object { .. }) => {}
                        Some(TypeDef::Union { .. }) => {
                            return Err(Error::UnknownType(format!(
                                "union '{name}' member '{member}' must be an object type, not a union"
                            )));
                        }
                        None => {
                            return Err(Error::UnknownType(format!(
                                "union '{name}' references unknown member '{member}'"
                            )));
                        }
                    }
                }
            }
        }

        Ok(Schema(types))
    }

    fn check_target_exists(
        types: &BTreeMap<String, TypeDef>,
        owner: &str,
        target: &str,
    ) -> Result<(), Error> {
        if types.contains_key(target) {
            Ok(())
        } else {
            Err(Error::UnknownType(format!(
                "type '{owner}' references unknown type '{target}'"
            )))
        }
    }

    pub fn get(&self, typename: &str) -> Option<&TypeDef> {
        self.0.get(typename)
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, &TypeDef)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn object_types(&self) -> impl Iterator<Item = (&str, &TypeDef)> {
        self.types().filter(|(_, def)| def.is_object())
    }

    pub fn id_field_name(&self, typename: &str) -> Option<&str> {
        self.get(typename).and_then(TypeDef::id_field)
    }

    /// Canonical (sorted-key) JSON encoding used as the schema fingerprint.
    /// `BTreeMap` already sorts keys for the inner schema map, and the
    /// wrapper's two fields are declared in sorted order (`schema` before
    /// `version`) so the whole document is key-sorted end to end.
    pub fn fingerprint(&self) -> Result<String, Error> {
        #[derive(Serialize)]
        struct Fingerprint<'a> {
            schema: &'a Schema,
            version: &'a str,
        }

        serde_json::to_string(&Fingerprint {
            schema: self,
            version: crate::store::MIRROR_VERSION,
        })
        .map_err(Error::from)
    }
}
