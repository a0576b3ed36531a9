//! Multi-node scenarios over the loopback relay.

use ledgerlink_ledger::{scan_for_first_invalid, Block};
use ledgerlink_sync_engine::DowngradeAlarm;
use ledgerlink_sync_protocol::{Message, SyncResponse};
use ledgerlink_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};

fn kinds_between(relay: &LoopbackRelay, to: usize, from: usize) -> Vec<String> {
    relay
        .history()
        .iter()
        .filter(|(t, f, _)| *t == to && *f == from)
        .filter_map(|(_, _, text)| serde_json::from_str::<Value>(text).ok())
        .filter_map(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[test]
fn empty_peer_catches_up_and_ignores_redelivery() {
    let chain = valid_chain(5);
    let mut relay = LoopbackRelay::new();
    let a = relay.add(seeded_node(test_config("a"), &chain));
    let b = relay.add(memory_node("b"));

    relay.connect_and_sync(a);
    relay.connect_and_sync(b);

    assert_eq!(relay.node(b).ledger().blocks(), chain.as_slice());
    assert_eq!(relay.node(a).stats().sync_responses_sent, 1);

    let responses: Vec<Delivery> = relay
        .delivered("sync-response")
        .into_iter()
        .filter(|(to, _, _)| *to == b)
        .collect();
    assert_eq!(responses.len(), 1);

    relay.redeliver(&responses[0]);
    relay.redeliver(&responses[0]);
    assert_eq!(relay.node(b).ledger().len(), 5);
    assert_eq!(relay.node(b).ledger().last_index(), 4);
}

#[test]
fn partial_peer_only_receives_the_suffix() {
    let chain = valid_chain(8);
    let mut relay = LoopbackRelay::new();
    let a = relay.add(seeded_node(test_config("a"), &chain));
    let b = relay.add(seeded_node(test_config("b"), &chain[..3]));

    relay.connect_and_sync(a);
    relay.connect_and_sync(b);

    let response = relay
        .delivered("sync-response")
        .into_iter()
        .find(|(to, _, _)| *to == b)
        .expect("Failed to find sync response");
    let value: Value = serde_json::from_str(&response.2).unwrap();
    let sent = value["data"]["blocks"].as_array().unwrap();
    assert_eq!(sent.len(), 5);
    assert_eq!(sent[0]["index"], 3);

    assert_eq!(relay.node(b).ledger().blocks(), chain.as_slice());
}

#[test]
fn published_block_reaches_every_room_member() {
    let mut relay = LoopbackRelay::new();
    let a = relay.add(memory_node("a"));
    let b = relay.add(memory_node("b"));
    let c = relay.add(memory_node("c"));
    for id in [a, b, c] {
        relay.connect_and_sync(id);
    }

    for block in valid_chain(3) {
        assert!(relay.node_mut(a).publish_block(block).unwrap());
        relay.pump();
    }

    for id in [b, c] {
        assert_eq!(relay.node(id).ledger().last_index(), 2);
        assert_eq!(scan_for_first_invalid(relay.node(id).ledger().blocks()), None);
    }
}

#[test]
fn forged_head_raises_alarm_and_keeps_chain() {
    let chain = valid_chain(10);
    let mut relay = LoopbackRelay::new();
    let a = relay.add(seeded_node(test_config("a"), &chain));
    let b = relay.add(seeded_node(test_config("b"), &chain));
    let mallory = relay.add(memory_node("mallory"));
    for id in [a, b, mallory] {
        relay.connect_and_sync(id);
    }

    let mut forged = serde_json::to_value(&chain[5]).unwrap();
    forged["voteHash"] = json!("f".repeat(64));
    forged["currentHash"] = json!("f".repeat(64));
    relay.broadcast_from(mallory, Message::NewBlock(forged));

    for id in [a, b] {
        let node = relay.node(id);
        assert_eq!(node.ledger().last_index(), 9);
        assert_eq!(node.ledger().len(), 10);
        assert!(!node.ledger().contains(5, &"f".repeat(64)));
        assert_eq!(node.monitor().total_alarms(), 1);
        assert!(matches!(
            node.monitor().alarms()[0],
            DowngradeAlarm::ForgedHead { .. }
        ));
    }
}

#[test]
fn stale_fork_raises_alarm_and_is_kept() {
    let chain = valid_chain(10);
    let mut relay = LoopbackRelay::new();
    let a = relay.add(seeded_node(test_config("a"), &chain));
    let mallory = relay.add(memory_node("mallory"));
    relay.connect_and_sync(a);
    relay.connect_and_sync(mallory);

    // Correctly hashed, but a different block at an index already passed.
    let fork = Block::new(5, 42, chain[4].current_hash.clone(), "other-vote", "other-sig");
    relay.broadcast_from(mallory, Message::NewBlock(serde_json::to_value(&fork).unwrap()));

    let node = relay.node(a);
    assert_eq!(node.ledger().len(), 11);
    assert_eq!(node.ledger().last_index(), 9);
    assert!(node.ledger().contains(5, &fork.current_hash));
    assert!(matches!(
        node.monitor().alarms()[0],
        DowngradeAlarm::StaleHead { .. }
    ));
}

#[test]
fn fork_outcome_does_not_depend_on_delivery_path() {
    let chain = valid_chain(10);
    let fork = Block::new(5, 42, chain[4].current_hash.clone(), "other-vote", "other-sig");
    let fork_value = serde_json::to_value(&fork).unwrap();

    let mut relay = LoopbackRelay::new();
    let gossiped = relay.add(seeded_node(test_config("a"), &chain));
    let synced = relay.add(seeded_node(test_config("b"), &chain));
    let mallory = relay.add(memory_node("mallory"));
    relay.connect_and_sync(gossiped);
    relay.connect_and_sync(synced);
    relay.connect_and_sync(mallory);

    relay.disconnect(synced);
    relay.broadcast_from(mallory, Message::NewBlock(fork_value.clone()));
    relay.connect_and_sync(synced);
    relay.disconnect(gossiped);
    relay.broadcast_from(
        mallory,
        Message::SyncResponse(SyncResponse {
            peer_id: Some("mallory".into()),
            blocks: vec![fork_value],
        }),
    );

    assert_eq!(
        relay.node(gossiped).ledger().blocks(),
        relay.node(synced).ledger().blocks()
    );
    assert!(relay.node(synced).ledger().contains(5, &fork.current_hash));
}

#[test]
fn offline_broadcasts_replay_in_order_after_connect() {
    let mut relay = LoopbackRelay::new();
    let a = relay.add(memory_node("a"));
    let b = relay.add(memory_node("b"));
    relay.connect_and_sync(a);

    let chain = valid_chain(2);
    relay.node_mut(b).publish_event(signed_event("e1", 1)).unwrap();
    relay.node_mut(b).publish_block(chain[0].clone()).unwrap();
    relay.node_mut(b).publish_block(chain[1].clone()).unwrap();
    assert_eq!(relay.node(b).queued(), 3);

    relay.connect_and_sync(b);

    assert_eq!(relay.node(b).queued(), 0);
    assert!(relay.node(a).events().contains("e1"));
    assert_eq!(relay.node(a).ledger().last_index(), 1);
    assert_eq!(
        kinds_between(&relay, a, b),
        [
            "peer-list",
            "new-event",
            "new-block",
            "new-block",
            "peer-addresses",
            "server-list",
            "request-sync",
        ]
    );
}

#[test]
fn reconnecting_peer_fetches_what_it_missed() {
    let mut relay = LoopbackRelay::new();
    let a = relay.add(memory_node("a"));
    let b = relay.add(memory_node("b"));
    relay.connect_and_sync(a);
    relay.connect_and_sync(b);

    let chain = valid_chain(6);
    for block in &chain[..2] {
        relay.node_mut(a).publish_block(block.clone()).unwrap();
        relay.pump();
    }
    assert_eq!(relay.node(b).ledger().len(), 2);

    relay.disconnect(b);
    for block in &chain[2..] {
        relay.node_mut(a).publish_block(block.clone()).unwrap();
        relay.pump();
    }
    assert_eq!(relay.node(b).ledger().len(), 2);

    relay.connect_and_sync(b);
    assert_eq!(relay.node(b).ledger().blocks(), chain.as_slice());
}

#[test]
fn directories_spread_through_joins() {
    let mut relay = LoopbackRelay::new();
    let a = relay.add(memory_node("a"));
    let b = relay.add(memory_node("b"));
    let c = relay.add(memory_node("c"));
    for id in [a, b, c] {
        relay.connect_and_sync(id);
    }

    assert_eq!(relay.node(a).directory().len(), 3);
    assert_eq!(relay.node(b).directory().len(), 2);
    assert_eq!(relay.node(c).directory().len(), 1);

    let record = relay.node(a).directory().get("ws://c.relay.test").unwrap();
    assert_eq!(record.added_by, "c");

    // A rejoin carries b's whole directory, including what it learned.
    relay.disconnect(b);
    relay.connect_and_sync(b);
    assert_eq!(relay.node(c).directory().len(), 2);
    assert!(relay.node(c).directory().contains("ws://b.relay.test"));
    assert_eq!(relay.node(a).directory().len(), 3);
}

#[test]
fn bounded_peer_keeps_newest_blocks() {
    let chain = valid_chain(5);
    let mut relay = LoopbackRelay::new();
    let a = relay.add(seeded_node(test_config("a"), &chain));
    let b = relay.add(seeded_node(test_config("b").with_max_blocks(3), &[]));
    relay.connect_and_sync(a);
    relay.connect_and_sync(b);

    let held: Vec<u64> = relay.node(b).ledger().blocks().iter().map(|b| b.index).collect();
    assert_eq!(held, [2, 3, 4]);

    let response = relay
        .delivered("sync-response")
        .into_iter()
        .find(|(to, _, _)| *to == b)
        .unwrap();
    relay.redeliver(&response);
    let held: Vec<u64> = relay.node(b).ledger().blocks().iter().map(|b| b.index).collect();
    assert_eq!(held, [2, 3, 4]);
}

#[test]
fn events_deduplicate_across_peers() {
    let mut relay = LoopbackRelay::new();
    let a = relay.add(memory_node("a"));
    let b = relay.add(memory_node("b"));
    let c = relay.add(memory_node("c"));
    for id in [a, b, c] {
        relay.connect_and_sync(id);
    }

    relay.node_mut(a).publish_event(signed_event("same", 1)).unwrap();
    relay.pump();
    assert!(!relay.node_mut(b).publish_event(signed_event("same", 1)).unwrap());
    relay.pump();

    for id in [a, b, c] {
        assert_eq!(relay.node(id).events().len(), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_prefix_converges(total in 1usize..24, held in 0usize..24) {
        let chain = valid_chain(total);
        let held = held.min(total);
        let mut relay = LoopbackRelay::new();
        let a = relay.add(seeded_node(test_config("a"), &chain));
        let b = relay.add(seeded_node(test_config("b"), &chain[..held]));
        relay.connect_and_sync(a);
        relay.connect_and_sync(b);

        prop_assert_eq!(relay.node(b).ledger().blocks(), chain.as_slice());
        prop_assert_eq!(relay.node(b).monitor().total_alarms(), 0);
    }
}
