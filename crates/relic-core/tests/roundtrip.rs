// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical serialization round trips and their invariants.
#![allow(clippy::unwrap_used)]

use relic_core::components::{
    Container, Location, Name, Resources, CONTAINER_TYPE, LOCATION_TYPE, NAME_TYPE, RESOURCES_TYPE,
};
use relic_core::{ObjectId, State};

fn populated_root() -> std::sync::Arc<State> {
    let root = State::new();
    assert!(root.atomic(|s| {
        let (_, miner) = s
            .create(&[
                Name::factory("miner"),
                Container::factory(),
                Location::factory(),
                Resources::factory(),
            ])
            .unwrap();
        let (_, pick) = s.create(&[Name::factory("pickaxe")]).unwrap();
        miner
            .component_mut::<Container>(*CONTAINER_TYPE)
            .unwrap()
            .add(&pick);
        miner
            .component_mut::<Location>(*LOCATION_TYPE)
            .unwrap()
            .set(4, -2, 1);
        miner
            .component_mut::<Resources>(*RESOURCES_TYPE)
            .unwrap()
            .set("ore", 12);
        true
    }));
    root
}

#[test]
fn empty_round_trip_preserves_nothing_but_the_counter() {
    let root = State::new();
    let decoded = State::decode(&root.encode().unwrap()).unwrap();
    assert!(decoded.ids().is_empty());
    let (first, _) = decoded.create(&[]).unwrap();
    assert_eq!(first, ObjectId(1));
}

#[test]
fn decoded_state_reencodes_byte_identical() {
    let root = populated_root();
    let bytes = root.encode().unwrap();
    let decoded = State::decode(&bytes).unwrap();
    assert_eq!(decoded.encode().unwrap(), bytes);
}

#[test]
fn decoded_state_reproduces_observations() {
    let root = populated_root();
    let decoded = State::decode(&root.encode().unwrap()).unwrap();

    assert_eq!(decoded.ids(), root.ids());
    assert_eq!(
        decoded.by_component(*CONTAINER_TYPE),
        root.by_component(*CONTAINER_TYPE)
    );

    let miner = decoded.get(ObjectId(1)).unwrap();
    assert_eq!(miner.component::<Name>(*NAME_TYPE).unwrap().get(), "miner");
    assert_eq!(
        miner.component::<Location>(*LOCATION_TYPE).unwrap().get(),
        (4, -2, 1)
    );
    assert_eq!(
        miner
            .component::<Resources>(*RESOURCES_TYPE)
            .unwrap()
            .get("ore"),
        12
    );
    assert_eq!(
        miner.component::<Container>(*CONTAINER_TYPE).unwrap().ids(),
        &[ObjectId(2)]
    );
}

#[test]
fn noop_transaction_keeps_the_root_byte_identical() {
    let root = populated_root();
    let before = root.encode().unwrap();
    assert!(root.atomic(|s| {
        // Reads clone into the child; nothing is modified.
        let miner = s.get(ObjectId(1)).unwrap();
        let _ = miner.component::<Name>(*NAME_TYPE).unwrap();
        true
    }));
    assert_eq!(root.encode().unwrap(), before);
}

#[test]
fn deleted_objects_vanish_from_every_surface() {
    let root = populated_root();
    let (gone, _) = root.create(&[Name::factory("doomed")]).unwrap();
    assert!(root.atomic(|s| {
        s.delete(gone);
        true
    }));

    assert!(root.get(gone).is_none());
    assert!(!root.ids().contains(&gone));
    assert!(!root.by_component(*NAME_TYPE).contains(&gone));

    let decoded = State::decode(&root.encode().unwrap()).unwrap();
    assert!(decoded.get(gone).is_none());
    assert!(!decoded.ids().contains(&gone));
    assert!(!decoded.by_component(*NAME_TYPE).contains(&gone));

    // The deleted id stays reserved.
    let (next, _) = decoded.create(&[]).unwrap();
    assert_eq!(next.0, gone.0 + 1);
}

#[test]
fn component_order_in_the_stream_is_by_type_name() {
    // Registration order deliberately differs from name order; the stream
    // must sort by type-name string regardless.
    let root = State::new();
    assert!(root.atomic(|s| {
        let _ = s
            .create(&[Resources::factory(), Container::factory(), Name::factory("n")])
            .unwrap();
        true
    }));
    let bytes = root.encode().unwrap();
    let container_at = find(&bytes, b"*\"relic\".Container").unwrap();
    let name_at = find(&bytes, b"*\"relic\".Name").unwrap();
    let resources_at = find(&bytes, b"*\"relic\".Resources").unwrap();
    assert!(container_at < name_at);
    assert!(name_at < resources_at);
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn arbitrary_worlds_reencode_byte_identical(
            resources in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
            coords in (any::<i64>(), any::<i64>(), any::<i64>()),
            extra in 0usize..4,
        ) {
            let root = State::new();
            assert!(root.atomic(|s| {
                let (_, holder) = s
                    .create(&[
                        Resources::factory(),
                        Location::factory(),
                        Container::factory(),
                    ])
                    .unwrap();
                {
                    let mut res = holder.component_mut::<Resources>(*RESOURCES_TYPE).unwrap();
                    for (key, value) in &resources {
                        res.set(key, *value);
                    }
                }
                holder
                    .component_mut::<Location>(*LOCATION_TYPE)
                    .unwrap()
                    .set(coords.0, coords.1, coords.2);
                for _ in 0..extra {
                    let (_, item) = s.create(&[]).unwrap();
                    holder
                        .component_mut::<Container>(*CONTAINER_TYPE)
                        .unwrap()
                        .add(&item);
                }
                true
            }));

            let bytes = root.encode().unwrap();
            let decoded = State::decode(&bytes).unwrap();
            prop_assert_eq!(decoded.encode().unwrap(), bytes);
        }
    }
}
