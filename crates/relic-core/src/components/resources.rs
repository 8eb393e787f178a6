// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Resources: named signed quantities with parent-delta inheritance.

use std::sync::{Arc, LazyLock};

use rustc_hash::FxHashMap;

use crate::codec::CodecError;
use crate::component::Component;
use crate::constants::RESOURCES_VERSION;
use crate::object::Owner;
use crate::registry::{register_component, ComponentType, Factory};
use crate::wire::{Reader, WireError, Writer};

/// Handle for the Resources component type.
///
/// The factory is registered by the time any root state exists.
pub static RESOURCES_TYPE: LazyLock<ComponentType> =
    LazyLock::new(|| register_component(Resources::factory()));

/// String-keyed signed 64-bit quantities.
///
/// Reads delegate to the parent object's Resources and add the local entry
/// on top; writes store the difference against the parent's transitive
/// value. An object therefore carries only its deviation from its parent,
/// and parentless objects behave as a flat map.
pub struct Resources {
    values: FxHashMap<String, i64>,
    owner: Owner,
}

impl Resources {
    /// Factory constructing an empty resource map.
    #[must_use]
    pub fn factory() -> Factory {
        Arc::new(|owner| {
            Box::new(Resources {
                values: FxHashMap::default(),
                owner,
            })
        })
    }

    /// The effective value of `key`: the local delta plus the parent
    /// object's transitive value. Missing entries read as 0.
    #[must_use]
    pub fn get(&self, key: &str) -> i64 {
        let mut value = self.values.get(key).copied().unwrap_or(0);
        if let Some(parent) = self.owner.parent() {
            if let Some(theirs) = parent.component::<Resources>(*RESOURCES_TYPE) {
                value += theirs.get(key);
            }
        }
        value
    }

    /// Sets the effective value of `key` to `value` by storing the
    /// difference against the parent object's transitive value.
    pub fn set(&mut self, key: &str, value: i64) {
        let mut stored = value;
        if let Some(parent) = self.owner.parent() {
            if let Some(theirs) = parent.component::<Resources>(*RESOURCES_TYPE) {
                stored -= theirs.get(key);
            }
        }
        self.values.insert(key.to_owned(), stored);
        self.owner.mark_modified();
    }

    /// Number of locally stored entries (deltas, not effective values).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no local entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Component for Resources {
    fn type_name(&self) -> &'static str {
        "*\"relic\".Resources"
    }

    fn clone_onto(&self, owner: Owner) -> Box<dyn Component> {
        Box::new(Resources {
            values: self.values.clone(),
            owner,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.put_uvarint(RESOURCES_VERSION);
        w.put_uvarint(self.values.len() as u64);
        let mut entries: Vec<_> = self.values.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            w.put_str(key);
            w.put_varint(*value);
        }
    }

    fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
        let version = r.uvarint()?;
        if version != RESOURCES_VERSION {
            return Err(CodecError::ResourcesVersionUnknown { found: version });
        }
        let count = usize::try_from(r.uvarint()?).map_err(|_| WireError::Truncated)?;
        if count > r.remaining() {
            return Err(WireError::Truncated.into());
        }
        let mut values = FxHashMap::default();
        for _ in 0..count {
            let key = r.str()?;
            let value = r.varint()?;
            if values.insert(key.to_owned(), value).is_some() {
                return Err(CodecError::ResourcesDuplicateKey {
                    key: key.to_owned(),
                });
            }
        }
        self.values = values;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn bare_resources() -> Resources {
        Resources {
            values: FxHashMap::default(),
            owner: Owner::none(),
        }
    }

    #[test]
    fn entries_encode_in_ascending_key_order() {
        let mut res = bare_resources();
        res.set("ore", 7);
        res.set("gold", -2);
        let mut w = Writer::new();
        res.encode(&mut w);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.uvarint().unwrap(), 0);
        assert_eq!(r.uvarint().unwrap(), 2);
        assert_eq!(r.str().unwrap(), "gold");
        assert_eq!(r.varint().unwrap(), -2);
        assert_eq!(r.str().unwrap(), "ore");
        assert_eq!(r.varint().unwrap(), 7);
        assert!(r.is_empty());
    }

    #[test]
    fn decode_rejects_duplicate_keys() {
        let mut w = Writer::new();
        w.put_uvarint(RESOURCES_VERSION);
        w.put_uvarint(2);
        w.put_str("ore");
        w.put_varint(1);
        w.put_str("ore");
        w.put_varint(2);
        let bytes = w.into_bytes();

        let mut res = bare_resources();
        let mut r = Reader::new(&bytes);
        assert_eq!(
            res.decode(&mut r).unwrap_err(),
            CodecError::ResourcesDuplicateKey { key: "ore".into() }
        );
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut res = bare_resources();
        let mut r = Reader::new(&[9]);
        assert_eq!(
            res.decode(&mut r).unwrap_err(),
            CodecError::ResourcesVersionUnknown { found: 9 }
        );
    }

    #[test]
    fn flat_semantics_without_a_parent() {
        let mut res = bare_resources();
        assert_eq!(res.get("ore"), 0);
        res.set("ore", 5);
        assert_eq!(res.get("ore"), 5);
        res.set("ore", -3);
        assert_eq!(res.get("ore"), -3);
    }
}
