// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whatever order send acknowledgements and realtime echoes arrive in, every
//! optimistic row ends up holding exactly its own server id.

use parley_core::types::{LocalId, MessageId, RemoteMessage, Role};
use parley_sync::{ConversationStore, OutboundDraft, ReconcilePatch};
use proptest::prelude::*;
use proptest::test_runner::Config;

#[derive(Debug, Clone, Copy)]
enum Step {
    Ack(usize),
    Echo(usize),
}

fn server_id(i: usize) -> MessageId {
    MessageId(format!("srv-{i}"))
}

fn schedule() -> impl Strategy<Value = (Vec<&'static str>, Vec<Step>)> {
    prop::collection::vec(prop::sample::select(vec!["hi", "ok", "thanks"]), 1..5).prop_flat_map(
        |contents| {
            let mut steps = Vec::new();
            for i in 0..contents.len() {
                steps.push(Step::Ack(i));
                steps.push(Step::Echo(i));
                steps.push(Step::Echo(i));
            }
            (Just(contents), Just(steps).prop_shuffle())
        },
    )
}

proptest! {
    #![proptest_config(Config::with_cases(256))]
    #[test]
    fn acks_and_echoes_converge((contents, steps) in schedule()) {
        let store = ConversationStore::new();
        let locals: Vec<LocalId> = contents
            .iter()
            .map(|c| store.append_optimistic(OutboundDraft::text(*c)))
            .collect();

        for step in steps {
            match step {
                Step::Ack(i) => {
                    store.reconcile(locals[i], &server_id(i), ReconcilePatch::default());
                }
                Step::Echo(i) => {
                    store.merge_remote(RemoteMessage::text(server_id(i).0, Role::Visitor, contents[i]));
                }
            }
        }

        let transcript = store.snapshot();
        prop_assert_eq!(transcript.len(), contents.len());
        for (i, local) in locals.iter().enumerate() {
            let row = transcript.find_by_local(*local).expect("optimistic row kept");
            prop_assert_eq!(row.id.as_ref(), Some(&server_id(i)));
            prop_assert_eq!(row.content.as_str(), contents[i]);
            prop_assert!(!row.provisional_id);
            prop_assert!(!row.failed);
        }
        for i in 0..contents.len() {
            let holders = transcript
                .messages
                .iter()
                .filter(|m| m.id.as_ref() == Some(&server_id(i)))
                .count();
            prop_assert_eq!(holders, 1);
        }
    }

    #[test]
    fn late_echoes_never_duplicate(contents in prop::collection::vec("[a-c]{1,3}", 1..6)) {
        let store = ConversationStore::new();
        let locals: Vec<LocalId> = contents
            .iter()
            .map(|c| store.append_optimistic(OutboundDraft::text(c.clone())))
            .collect();
        for (i, local) in locals.iter().enumerate() {
            store.reconcile(*local, &server_id(i), ReconcilePatch::default());
        }
        for (i, content) in contents.iter().enumerate().rev() {
            store.merge_remote(RemoteMessage::text(server_id(i).0, Role::Visitor, content.clone()));
        }

        prop_assert_eq!(store.snapshot().len(), contents.len());
    }
}
