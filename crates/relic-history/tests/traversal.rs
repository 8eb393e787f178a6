// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end time travel: committed worlds appended, then replayed in both
//! directions.
#![allow(clippy::unwrap_used, clippy::panic)]

use std::io::Cursor;
use std::sync::Arc;

use relic_core::components::{Container, Name, CONTAINER_TYPE};
use relic_core::{ObjectId, State};
use relic_history::{History, HistoryError, Whence};

type MemHistory = History<Cursor<Vec<u8>>>;

fn held_ids(state: &Arc<State>, person: ObjectId) -> Vec<ObjectId> {
    state
        .get(person)
        .unwrap()
        .component::<Container>(*CONTAINER_TYPE)
        .unwrap()
        .ids()
        .to_vec()
}

#[test]
fn trade_is_visible_at_each_snapshot() {
    let mut h: MemHistory = History::new(Cursor::new(Vec::new()));
    let global = State::new();

    let mut person_a = ObjectId::NONE;
    let mut person_b = ObjectId::NONE;
    let mut item_a = ObjectId::NONE;
    let mut item_b = ObjectId::NONE;
    assert!(global.atomic(|s| {
        let (pa_id, pa) = s
            .create(&[Name::factory("person A"), Container::factory()])
            .unwrap();
        let (pb_id, pb) = s
            .create(&[Name::factory("person B"), Container::factory()])
            .unwrap();
        let (ia_id, ia) = s.create(&[Name::factory("item A")]).unwrap();
        let (ib_id, ib) = s.create(&[Name::factory("item B")]).unwrap();
        person_a = pa_id;
        person_b = pb_id;
        item_a = ia_id;
        item_b = ib_id;
        pa.component_mut::<Container>(*CONTAINER_TYPE).unwrap().add(&ia)
            && pb.component_mut::<Container>(*CONTAINER_TYPE).unwrap().add(&ib)
    }));
    h.append(&global).unwrap();

    let traded = global.atomic(|s| {
        let pa = s.get(person_a).unwrap();
        let pb = s.get(person_b).unwrap();
        let ia = s.get(item_a).unwrap();
        let ib = s.get(item_b).unwrap();
        let mut ca = pa.component_mut::<Container>(*CONTAINER_TYPE).unwrap();
        let mut cb = pb.component_mut::<Container>(*CONTAINER_TYPE).unwrap();
        ca.remove(&ia) && cb.remove(&ib) && ca.add(&ib) && cb.add(&ia)
    });
    assert!(traded);
    h.append(&global).unwrap();

    // Snapshot 0: the world before the trade.
    let before = h.seek(0, Whence::Start).unwrap();
    assert_eq!(held_ids(&before, person_a), vec![item_a]);
    assert_eq!(held_ids(&before, person_b), vec![item_b]);

    // Snapshot 1: the world after the trade.
    let after = h.seek(1, Whence::Start).unwrap();
    assert_eq!(held_ids(&after, person_a), vec![item_b]);
    assert_eq!(held_ids(&after, person_b), vec![item_a]);

    // Walking forward from a parked cursor visits 0 then 1 then ends.
    h.reset();
    let mut visited = Vec::new();
    loop {
        match h.seek(1, Whence::Cur) {
            Ok(_) => visited.push(h.tell()),
            Err(HistoryError::EndOfStream) => break,
            Err(err) => panic!("seek failed: {err}"),
        }
    }
    assert_eq!(visited, vec![0, 1]);

    // Walking backward visits 1 then 0 then ends.
    h.reset();
    let mut visited = Vec::new();
    loop {
        match h.seek(-1, Whence::Cur) {
            Ok(_) => visited.push(h.tell()),
            Err(HistoryError::EndOfStream) => break,
            Err(err) => panic!("seek failed: {err}"),
        }
    }
    assert_eq!(visited, vec![1, 0]);
}

#[test]
fn three_snapshots_reverse_with_tell_sequence() {
    let mut h: MemHistory = History::new(Cursor::new(Vec::new()));
    let global = State::new();
    let mut encodings = Vec::new();

    for round in 0..3 {
        if round > 0 {
            assert!(global.atomic(|s| {
                let _ = s.create(&[Name::factory("filler")]).unwrap();
                true
            }));
        }
        h.append(&global).unwrap();
        encodings.push(global.encode().unwrap());
    }

    h.reset();
    for expect in [2i64, 1, 0] {
        let state = h.seek(-1, Whence::Cur).unwrap();
        assert_eq!(h.tell(), expect);
        let index = usize::try_from(expect).unwrap();
        assert_eq!(state.encode().unwrap(), encodings[index]);
    }
    assert!(matches!(
        h.seek(-1, Whence::Cur),
        Err(HistoryError::EndOfStream)
    ));
    assert_eq!(h.tell(), -1);
}

#[test]
fn direction_changes_compose() {
    let mut h: MemHistory = History::new(Cursor::new(Vec::new()));
    let global = State::new();
    let mut encodings = Vec::new();
    for _ in 0..4 {
        assert!(global.atomic(|s| {
            let _ = s.create(&[]).unwrap();
            true
        }));
        h.append(&global).unwrap();
        encodings.push(global.encode().unwrap());
    }

    // tip → back two → forward one → back three to the start.
    let s3 = h.seek(0, Whence::End).unwrap();
    assert_eq!(s3.encode().unwrap(), encodings[3]);
    let s1 = h.seek(-2, Whence::Cur).unwrap();
    assert_eq!(s1.encode().unwrap(), encodings[1]);
    let s2 = h.seek(1, Whence::Cur).unwrap();
    assert_eq!(s2.encode().unwrap(), encodings[2]);
    let s0 = h.seek(-2, Whence::Cur).unwrap();
    assert_eq!(s0.encode().unwrap(), encodings[0]);
    assert_eq!(h.tell(), 0);
}
