use super::*;
use crate::node_adapter;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

struct Record {
    key: Vec<u8>,
    chunk: usize,
    node: TrieNode,
}

impl Record {
    fn new(key: Vec<u8>, chunk: usize) -> Self {
        Self {
            key,
            chunk,
            node: TrieNode::new(),
        }
    }
}

fn record_key<'k>(record: &'k Record, key: &mut KeyWindow<'k>, offset: usize) {
    let end = (offset + record.chunk).min(record.key.len());
    if offset == 0 {
        key.start(record.key.len(), &record.key[..end]);
    } else {
        key.advance(offset, &record.key[offset..end]);
    }
}

fn new_trie<'a>() -> Trie<'a, Record> {
    Trie::new(node_adapter!(Record, node, record_key))
}

/// Slice order of the sentinel-extended key, which is the trie's order.
fn order_key(key: &[u8]) -> Vec<u8> {
    let mut k = key.to_vec();
    k.push(0xFF);
    k
}

fn validate_trie<T>(t: &Trie<'_, T>) {
    let Some(root) = t.root else {
        assert_eq!(t.len, 0, "empty trie must have len 0");
        return;
    };
    if t.node(root).is_bottom_leaf(root) {
        assert_eq!(t.len, 1, "a bottom leaf root holds exactly one record");
        assert_eq!(t.node(root).bit_offset(), 0);
        return;
    }

    let mut stack = vec![root];
    let mut internal = 0usize;
    let mut back_targets: Vec<NodePtr> = Vec::new();
    while let Some(node) = stack.pop() {
        let n = t.node(node);
        assert!(
            !n.is_bottom_leaf(node),
            "bottom leaf reached through a downward link"
        );
        internal += 1;
        for bit in [false, true] {
            let target = n.link(bit);
            if t.is_back_edge(node, target) {
                assert_eq!(
                    t.cursor(target).bit(n.bit_offset()),
                    bit,
                    "back-edge target must have the bit it is filed under"
                );
                back_targets.push(target);
            } else {
                stack.push(target);
            }
        }
    }

    assert_eq!(internal + 1, t.len, "every record but the bottom leaf discriminates");
    assert_eq!(back_targets.len(), t.len);
    let bottom_leaves = back_targets
        .iter()
        .filter(|&&node| t.node(node).is_bottom_leaf(node))
        .count();
    assert_eq!(bottom_leaves, 1, "exactly one bottom leaf");

    back_targets.sort();
    back_targets.dedup();
    assert_eq!(back_targets.len(), t.len, "each record has one back-edge");

    for node in back_targets {
        let mut cursor = t.cursor(node);
        let key: Vec<u8> = (0..cursor.len()).map(|i| cursor.byte(i)).collect();
        let found = t.find(&key).map(|owner| t.adapter.node_of(owner));
        assert_eq!(found, Some(node), "record must be found by its own key");
    }
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A small alphabet produces duplicates, shared prefixes and keys that
    // collide with the end marker.
    prop::collection::vec(
        prop::sample::select(vec![0x00u8, 0x01, 0x61, 0x62, 0xFE, 0xFF]),
        0..=5,
    )
}

fn prefix_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![0x00u8, 0x61, 0xFF]), 0..=2)
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 50)]
    Insert(#[proptest(strategy = "key_strategy()")] Vec<u8>),
    #[proptest(weight = 25)]
    Remove(#[proptest(strategy = "key_strategy()")] Vec<u8>),
    #[proptest(weight = 20)]
    Find(#[proptest(strategy = "key_strategy()")] Vec<u8>),
    #[proptest(weight = 5)]
    Prefix(#[proptest(strategy = "prefix_strategy()")] Vec<u8>),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let records: Vec<Record> = ops
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Op::Insert(key) => Some(Record::new(key.clone(), 1 + i % 4)),
                _ => None,
            })
            .collect();
        let mut next_record = 0;

        let mut t = new_trie();
        // order key -> index into `records`
        let mut m: BTreeMap<Vec<u8>, usize> = BTreeMap::new();

        for op in &ops {
            match op {
                Op::Insert(key) => {
                    let i = next_record;
                    next_record += 1;
                    let result = t.insert(&records[i]);
                    match m.get(&order_key(key)) {
                        Some(&j) => {
                            let existing = result.unwrap_err().into_existing();
                            prop_assert!(existing.is_some_and(|r| std::ptr::eq(r, &records[j])));
                        }
                        None => {
                            prop_assert!(result.is_ok());
                            m.insert(order_key(key), i);
                        }
                    }
                }
                Op::Remove(key) => {
                    let got = t.remove(key).map(|r| r as *const Record);
                    let expected = m.remove(&order_key(key)).map(|j| &records[j] as *const Record);
                    prop_assert_eq!(got, expected);
                }
                Op::Find(key) => {
                    let got = t.find(key).map(|r| r as *const Record);
                    let expected = m.get(&order_key(key)).map(|&j| &records[j] as *const Record);
                    prop_assert_eq!(got, expected);
                }
                Op::Prefix(prefix) => {
                    let got: Vec<*const Record> =
                        t.iter_prefix(prefix).map(|r| r as *const Record).collect();
                    let expected: Vec<*const Record> = m
                        .values()
                        .filter(|&&j| records[j].key.starts_with(prefix))
                        .map(|&j| &records[j] as *const Record)
                        .collect();
                    prop_assert_eq!(got, expected);
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_trie(&t);
        let expected: Vec<*const Record> =
            m.values().map(|&j| &records[j] as *const Record).collect();
        let got: Vec<*const Record> = t.iter().map(|r| r as *const Record).collect();
        prop_assert_eq!(&got, &expected);
        let mut rev: Vec<*const Record> = t.iter_rev().map(|r| r as *const Record).collect();
        rev.reverse();
        prop_assert_eq!(&rev, &expected);

        let mut released: Vec<*const Record> = Vec::new();
        t.remove_all(|r: &Record| {
            released.push(r as *const Record);
            Ok::<(), ()>(())
        })
        .unwrap();
        released.sort();
        let mut expected = expected;
        expected.sort();
        prop_assert_eq!(released, expected);
        prop_assert!(records.iter().all(|r| !r.node.is_linked()));
    }
}

/// Calls `f` with every ordering of `0..n` (Heap's algorithm).
fn for_each_order(n: usize, mut f: impl FnMut(&[usize])) {
    let mut order: Vec<usize> = (0..n).collect();
    let mut counters = vec![0usize; n];
    f(&order);
    let mut i = 1;
    while i < n {
        if counters[i] < i {
            let j = if i % 2 == 0 { 0 } else { counters[i] };
            order.swap(j, i);
            f(&order);
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

#[test]
fn orderings_are_complete_and_distinct() {
    let mut seen = std::collections::BTreeSet::new();
    for_each_order(4, |order| {
        assert!(seen.insert(order.to_vec()), "repeated ordering {order:?}");
    });
    assert_eq!(seen.len(), 24);

    let mut calls = 0;
    for_each_order(0, |order| {
        assert!(order.is_empty());
        calls += 1;
    });
    assert_eq!(calls, 1);
}

fn small_set() -> Vec<Record> {
    [&b""[..], b"a", b"ab", b"abc", b"a\xff", b"b"]
        .iter()
        .map(|key| Record::new(key.to_vec(), 2))
        .collect()
}

fn sorted_by_order_key(records: &[Record]) -> Vec<*const Record> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by_key(|r| order_key(&r.key));
    sorted.into_iter().map(|r| r as *const Record).collect()
}

#[test]
fn exhaustive_insert_order_small_set() {
    let records = small_set();
    let expected = sorted_by_order_key(&records);

    for_each_order(records.len(), |order| {
        let mut t = new_trie();
        for &i in order {
            t.insert(&records[i]).unwrap();
            validate_trie(&t);
        }

        let got: Vec<*const Record> = t.iter().map(|r| r as *const Record).collect();
        assert_eq!(got, expected);
        for r in &records {
            assert!(std::ptr::eq(t.find(&r.key).unwrap(), r));
        }
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let records = small_set();

    // Insert in a fixed order, then remove in every order.
    for_each_order(records.len(), |order| {
        let mut t = new_trie();
        for r in &records {
            t.insert(r).unwrap();
        }

        for (removed, &i) in order.iter().enumerate() {
            let r = &records[i];
            assert!(std::ptr::eq(t.remove(&r.key).unwrap(), r));
            assert!(!r.node.is_linked());
            assert!(t.find(&r.key).is_none());
            assert_eq!(t.len(), records.len() - removed - 1);
            validate_trie(&t);
        }
        assert!(t.is_empty());
        assert!(t.root.is_none());
    });
}
