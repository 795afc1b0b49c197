use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// kind of parsed source-code unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// file header up to the first import or declaration
    Preamble,
    /// import / use / include block
    Import,
    /// a named declaration (function, type, const, …)
    Declaration,
    /// source between declarations that belongs to neither
    Interstitial,
}

/// a parsed source-code unit stored as a first-class object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// declared name, empty for preamble/interstitial
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// language-specific declaration kind, e.g. `func`, `struct`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub decl_kind: String,
    /// receiver for methods, empty otherwise
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub receiver: String,
    /// source bytes of the unit
    pub body: Vec<u8>,
    /// hash of the body bytes as reported by the extractor
    pub body_hash: Hash,
}

/// ordered entity collection for one file path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityList {
    pub language: String,
    pub path: String,
    pub entities: Vec<Hash>,
}

impl EntityList {
    pub fn new(language: impl Into<String>, path: impl Into<String>, entities: Vec<Hash>) -> Self {
        Self {
            language: language.into(),
            path: path.into(),
            entities,
        }
    }
}
