// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Process-wide component registry.
//!
//! The registry maps a component's stable type-name string to the factory
//! that constructs fresh instances, and interns each name into an opaque
//! [`ComponentType`] handle used as the component key on objects. It is
//! lazily initialized, append-only, and lives for the life of the process;
//! registration must be complete before concurrent state activity begins.

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::object::Owner;

/// Constructs a fresh component instance bound to `owner`.
///
/// A factory is invoked once at registration with the no-owner sentinel to
/// discover the component's concrete type, and thereafter once per new
/// instance (creation, cloning, decoding).
pub type Factory = Arc<dyn Fn(Owner) -> Box<dyn Component> + Send + Sync>;

/// Opaque handle for a registered component type.
///
/// Handles are process-local interned indexes; the stable cross-process
/// identity is the type-name string. Two handles compare equal exactly when
/// they name the same registered type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ComponentType(u32);

struct Entry {
    name: &'static str,
    factory: Factory,
}

#[derive(Default)]
struct RegistryInner {
    by_name: FxHashMap<&'static str, u32>,
    entries: Vec<Entry>,
}

static REGISTRY: LazyLock<RwLock<RegistryInner>> =
    LazyLock::new(|| RwLock::new(RegistryInner::default()));

/// Registers `factory` under the type name of the component it builds.
///
/// The factory is probed once with the no-owner sentinel to discover the
/// concrete type. Registering the same name twice replaces the factory and
/// returns the existing handle (last write wins).
pub fn register_component(factory: Factory) -> ComponentType {
    let probe = factory.as_ref()(Owner::none());
    let name = probe.type_name();
    let mut reg = REGISTRY.write();
    if let Some(&ix) = reg.by_name.get(name) {
        reg.entries[ix as usize].factory = factory;
        return ComponentType(ix);
    }
    let ix = reg.entries.len() as u32;
    reg.entries.push(Entry { name, factory });
    reg.by_name.insert(name, ix);
    ComponentType(ix)
}

/// Returns the handle for `name` if it has been registered.
pub(crate) fn lookup(name: &str) -> Option<ComponentType> {
    REGISTRY.read().by_name.get(name).copied().map(ComponentType)
}

/// Returns the factory registered under `name`.
pub(crate) fn factory(name: &str) -> Option<Factory> {
    let reg = REGISTRY.read();
    let &ix = reg.by_name.get(name)?;
    Some(Arc::clone(&reg.entries[ix as usize].factory))
}

/// Returns the registered type name behind `ty`.
pub(crate) fn type_name(ty: ComponentType) -> Option<&'static str> {
    REGISTRY.read().entries.get(ty.0 as usize).map(|e| e.name)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::codec::CodecError;
    use crate::wire::{Reader, Writer};

    // Distinct type names per test: the registry is process-global and the
    // test harness runs tests concurrently.
    macro_rules! probe_component {
        ($ty:ident, $name:literal) => {
            struct $ty(u8);

            impl Component for $ty {
                fn type_name(&self) -> &'static str {
                    $name
                }

                fn clone_onto(&self, _owner: Owner) -> Box<dyn Component> {
                    Box::new($ty(self.0))
                }

                fn encode(&self, w: &mut Writer) {
                    w.put_uvarint(u64::from(self.0));
                }

                fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
                    self.0 = u8::try_from(r.uvarint()?).unwrap_or(0);
                    Ok(())
                }
            }
        };
    }

    probe_component!(ProbeA, "*\"relic\".test.ProbeA");
    probe_component!(ProbeB, "*\"relic\".test.ProbeB");

    #[test]
    fn registration_is_last_write_wins() {
        let first = register_component(Arc::new(|_| Box::new(ProbeA(1))));
        let second = register_component(Arc::new(|_| Box::new(ProbeA(2))));
        assert_eq!(first, second);

        let made = factory("*\"relic\".test.ProbeA").unwrap().as_ref()(Owner::none());
        let mut w = Writer::new();
        made.encode(&mut w);
        assert_eq!(w.into_bytes(), vec![2]);
    }

    #[test]
    fn lookup_resolves_registered_names_only() {
        let ty = register_component(Arc::new(|_| Box::new(ProbeB(0))));
        assert_eq!(lookup("*\"relic\".test.ProbeB"), Some(ty));
        assert_eq!(type_name(ty), Some("*\"relic\".test.ProbeB"));
        assert!(lookup("*\"relic\".test.Missing").is_none());
    }
}
