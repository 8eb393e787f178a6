// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Messages: a bounded per-object message log.

use std::sync::{Arc, LazyLock};

use crate::codec::CodecError;
use crate::component::Component;
use crate::constants::{DEFAULT_MESSAGE_CAP, MESSAGES_VERSION};
use crate::ident::ObjectId;
use crate::object::Owner;
use crate::registry::{register_component, ComponentType, Factory};
use crate::wire::{Reader, WireError, Writer};

/// Handle for the Messages component type.
///
/// The factory is registered by the time any root state exists, configured
/// with the default retention cap.
pub static MESSAGES_TYPE: LazyLock<ComponentType> =
    LazyLock::new(|| register_component(Messages::factory()));

/// One logged message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Object the message originated from, [`ObjectId::NONE`] for system
    /// messages.
    pub source: ObjectId,
    /// Game-defined timestamp.
    pub time: i64,
    /// Message body.
    pub text: String,
    /// Game-defined category tag.
    pub kind: String,
}

/// A bounded message log.
///
/// Appending past the cap drops the oldest entries. The cap is factory
/// configuration; it is not serialized, so a decoded log keeps whatever the
/// registered factory was configured with.
pub struct Messages {
    entries: Vec<Message>,
    cap: usize,
    owner: Owner,
}

impl Messages {
    /// Factory with the default retention cap.
    #[must_use]
    pub fn factory() -> Factory {
        Self::factory_with_cap(DEFAULT_MESSAGE_CAP)
    }

    /// Factory with a custom retention cap.
    #[must_use]
    pub fn factory_with_cap(cap: usize) -> Factory {
        Arc::new(move |owner| {
            Box::new(Messages {
                entries: Vec::new(),
                cap,
                owner,
            })
        })
    }

    /// Appends a message, trimming the log to the retention cap.
    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            self.entries.drain(..excess);
        }
        self.owner.mark_modified();
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no message is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The message at index `i`, oldest first.
    #[must_use]
    pub fn at(&self, i: usize) -> Option<&Message> {
        self.entries.get(i)
    }

    /// Iterates the retained messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }
}

impl Component for Messages {
    fn type_name(&self) -> &'static str {
        "*\"relic\".Messages"
    }

    fn clone_onto(&self, owner: Owner) -> Box<dyn Component> {
        Box::new(Messages {
            entries: self.entries.clone(),
            cap: self.cap,
            owner,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.put_uvarint(MESSAGES_VERSION);
        w.put_uvarint(self.entries.len() as u64);
        for message in &self.entries {
            w.put_uvarint(message.source.0);
            w.put_varint(message.time);
            w.put_str(&message.text);
            w.put_str(&message.kind);
        }
    }

    fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
        let version = r.uvarint()?;
        if version != MESSAGES_VERSION {
            return Err(CodecError::MessagesVersionUnknown { found: version });
        }
        let count = usize::try_from(r.uvarint()?).map_err(|_| WireError::Truncated)?;
        if count > r.remaining() {
            return Err(WireError::Truncated.into());
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let source = ObjectId(r.uvarint()?);
            let time = r.varint()?;
            let text = r.str()?.to_owned();
            let kind = r.str()?.to_owned();
            entries.push(Message {
                source,
                time,
                text,
                kind,
            });
        }
        self.entries = entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn message(n: i64) -> Message {
        Message {
            source: ObjectId::NONE,
            time: n,
            text: format!("event {n}"),
            kind: "test".to_owned(),
        }
    }

    #[test]
    fn append_trims_to_the_cap() {
        let mut log = Messages {
            entries: Vec::new(),
            cap: 2,
            owner: Owner::none(),
        };
        for n in 0..4 {
            log.append(message(n));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.at(0), Some(&message(2)));
        assert_eq!(log.at(1), Some(&message(3)));
    }

    #[test]
    fn wire_round_trip_preserves_entries() {
        let mut log = Messages {
            entries: Vec::new(),
            cap: 8,
            owner: Owner::none(),
        };
        log.append(Message {
            source: ObjectId(2),
            time: -5,
            text: "struck ore".to_owned(),
            kind: "mining".to_owned(),
        });
        let mut w = Writer::new();
        log.encode(&mut w);
        let bytes = w.into_bytes();

        let mut decoded = Messages {
            entries: Vec::new(),
            cap: 8,
            owner: Owner::none(),
        };
        let mut r = Reader::new(&bytes);
        decoded.decode(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.at(0).unwrap().source, ObjectId(2));
        assert_eq!(decoded.at(0).unwrap().time, -5);
        assert_eq!(decoded.at(0).unwrap().text, "struck ore");
    }
}
