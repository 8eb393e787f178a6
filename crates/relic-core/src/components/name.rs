// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Name: a display label.

use std::sync::{Arc, LazyLock};

use crate::codec::CodecError;
use crate::component::Component;
use crate::constants::NAME_VERSION;
use crate::object::Owner;
use crate::registry::{register_component, ComponentType, Factory};
use crate::wire::{Reader, Writer};

/// Handle for the Name component type.
///
/// The factory is registered by the time any root state exists, with an
/// empty initial value; the initial value is per-factory state, not part of
/// the type identity.
pub static NAME_TYPE: LazyLock<ComponentType> =
    LazyLock::new(|| register_component(Name::factory("")));

/// A human-readable label for an object.
pub struct Name {
    value: String,
    owner: Owner,
}

impl Name {
    /// Factory constructing a name with the given initial value.
    #[must_use]
    pub fn factory(value: &str) -> Factory {
        let value = value.to_owned();
        Arc::new(move |owner| {
            Box::new(Name {
                value: value.clone(),
                owner,
            })
        })
    }

    /// The current label.
    #[must_use]
    pub fn get(&self) -> &str {
        &self.value
    }

    /// Replaces the label.
    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.owner.mark_modified();
    }
}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.value)
    }
}

impl Component for Name {
    fn type_name(&self) -> &'static str {
        "*\"relic\".Name"
    }

    fn clone_onto(&self, owner: Owner) -> Box<dyn Component> {
        Box::new(Name {
            value: self.value.clone(),
            owner,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.put_uvarint(NAME_VERSION);
        w.put_str(&self.value);
    }

    fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
        let version = r.uvarint()?;
        if version != NAME_VERSION {
            return Err(CodecError::NameVersionUnknown { found: version });
        }
        self.value = r.str()?.to_owned();
        Ok(())
    }
}
