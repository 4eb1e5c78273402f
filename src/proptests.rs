use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

/// A stored key lies at or below `key` when it equals it or continues
/// with the delimiter.
fn under(stored: &str, key: &str) -> bool {
    stored == key
        || stored
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn validate_tree(t: &Trie<u8>, m: &BTreeMap<String, u8>) {
    let issues = t.verify_integrity();
    assert!(issues.is_empty(), "integrity issues: {issues:?}");

    let mut got = Vec::new();
    t.walk("", |path, _, node| {
        if let Some(v) = node.data() {
            got.push((path.to_owned(), *v));
        }
    });
    got.sort();
    let expected: Vec<(String, u8)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(got, expected);
}

fn key_strategy() -> impl Strategy<Value = String> + Clone {
    // Few short segments over a tiny alphabet, so keys collide, share
    // fragments and sit on each other's delimiter boundaries.
    prop::collection::vec("[ab]{1,2}", 1..=3).prop_map(|segments| segments.join("."))
}

#[derive(Clone, Debug, Arbitrary)]
enum TrieOp {
    #[proptest(weight = 5)]
    Insert(#[proptest(strategy = "key_strategy()")] String, u8),
    #[proptest(weight = 2)]
    Remove(#[proptest(strategy = "key_strategy()")] String),
    #[proptest(weight = 2)]
    Get(#[proptest(strategy = "key_strategy()")] String),
    #[proptest(weight = 1)]
    Probe(#[proptest(strategy = "key_strategy()")] String),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in prop::collection::vec(any::<TrieOp>(), 0..=300)) {
        let t: Trie<u8> = Trie::new();
        let mut m: BTreeMap<String, u8> = BTreeMap::new();

        for op in ops {
            match op {
                TrieOp::Insert(key, value) => {
                    let old_t = t.insert(&key, value);
                    let old_m = m.insert(key, value);
                    prop_assert_eq!(old_t, old_m);
                }
                TrieOp::Remove(key) => {
                    let expect = m.keys().any(|k| under(k, &key));
                    prop_assert_eq!(t.remove(&key), expect, "remove {}", key);
                    m.retain(|k, _| !under(k, &key));
                }
                TrieOp::Get(key) => {
                    prop_assert_eq!(t.get(&key), m.get(&key).copied());
                }
                TrieOp::Probe(key) => {
                    let named = m.keys().any(|k| under(k, &key));
                    let prefixed = m.keys().any(|k| k.starts_with(key.as_str()));
                    prop_assert_eq!(t.search(&key), named, "search {}", key);
                    prop_assert_eq!(t.starts_with(&key), prefixed, "starts_with {}", key);
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tree(&t, &m);
    }

    #[test]
    fn prop_dup_is_independent(
        keys in prop::collection::vec(key_strategy(), 1..=40),
        victim in key_strategy(),
    ) {
        let t: Trie<u8> = Trie::new();
        let mut m = BTreeMap::new();
        for (i, k) in keys.iter().enumerate() {
            t.insert(k, i as u8);
            m.insert(k.clone(), i as u8);
        }
        let copy = t.dup();
        copy.remove(&victim);
        copy.insert("zz", 0);
        validate_tree(&t, &m);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

const SMALL_SET: [&str; 6] = ["a", "a.b", "a.c", "ab", "b", "a.b.c"];

#[test]
fn exhaustive_insert_order_small_set() {
    for_each_permutation(&SMALL_SET, |perm| {
        let t: Trie<u8> = Trie::new();
        let mut m = BTreeMap::new();
        for (i, k) in perm.into_iter().enumerate() {
            let v = i as u8;
            assert_eq!(t.insert(k, v), m.insert(k.to_owned(), v));
        }
        validate_tree(&t, &m);
        for k in SMALL_SET {
            assert!(t.search(k), "{k}");
        }
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let base_tree: Trie<u8> = Trie::new();
    let mut base_map = BTreeMap::new();
    for (i, k) in SMALL_SET.iter().enumerate() {
        let v = i as u8;
        assert_eq!(base_tree.insert(k, v), base_map.insert(k.to_string(), v));
    }

    for_each_permutation(&SMALL_SET, |perm| {
        let t = base_tree.dup();
        let mut m = base_map.clone();

        for k in perm {
            let expect = m.keys().any(|s| under(s, k));
            assert_eq!(t.remove(k), expect, "{k}");
            m.retain(|s, _| !under(s, k));
            validate_tree(&t, &m);
        }
        assert!(t.is_empty());
        assert_eq!(t.verify_integrity(), Vec::<String>::new());
    });
}
