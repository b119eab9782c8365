//! Persisted boolean preferences, e.g. whether a module is enabled.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

/// Kind of a declared preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PreferenceKind {
    Bool,
}

/// Boolean preference declared on a module field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceDecl {
    pub kind: PreferenceKind,
    pub label: String,
    pub key: String,
    pub default: bool,
}

impl PreferenceDecl {
    pub fn bool(label: impl Into<String>, key: impl Into<String>, default: bool) -> PreferenceDecl {
        PreferenceDecl {
            kind: PreferenceKind::Bool,
            label: label.into(),
            key: key.into(),
            default,
        }
    }

    /// `(kind, "label:key")` pair the settings screen consumes.
    pub fn pair(&self) -> (String, String) {
        (self.kind.to_string(), format!("{}:{}", self.label, self.key))
    }
}

/// Converts an `UpperCamel` type name into the `lower_underscore` preference key.
///
/// Every uppercase letter after the first starts a new word, so `DPCTestModule` becomes
/// `d_p_c_test_module`. Module paths and generic arguments are stripped.
pub fn preference_key(type_name: &str) -> String {
    let name = type_name.split('<').next().unwrap_or(type_name);
    let name = name.rsplit("::").next().unwrap_or(name);

    let mut key = String::with_capacity(name.len() + 8);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                key.push('_');
            }
            key.push(c.to_ascii_lowercase());
        } else {
            key.push(c);
        }
    }
    key
}

pub trait PreferenceStore: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn set_bool(&self, key: &str, value: bool);
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, bool>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> MemoryPreferenceStore {
        MemoryPreferenceStore::default()
    }

    pub fn with_values(values: HashMap<String, bool>) -> MemoryPreferenceStore {
        MemoryPreferenceStore {
            values: RwLock::new(values),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}
