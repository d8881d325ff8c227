use meta_tree::{
    deserialize, merge_join, merge_replace, meta_eq, serialize, Decimal, Meta, MetaTree,
    SealedMeta, Timestamp, Value,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Set(String, Value),
    Put(String, Value),
    PutNode(&'static str, &'static str, Value),
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e12f64..1.0e12).prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::from),
        (any::<i64>(), 0i32..8).prop_map(|(u, s)| Value::from(Decimal::new(u as i128, s))),
        (-4_000_000_000i64..4_000_000_000, 0u32..1_000_000_000)
            .prop_map(|(s, n)| Value::from(Timestamp::new(s, n))),
    ]
}

/// Scalars plus hand-built lists: empty, single, flat and nested.
fn stored_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar(),
        1 => Just(Value::List(Vec::new())),
        1 => scalar().prop_map(|v| Value::List(vec![v])),
        1 => prop::collection::vec(scalar(), 2..4).prop_map(Value::List),
        1 => (prop::collection::vec(scalar(), 0..3), scalar())
            .prop_map(|(inner, last)| Value::List(vec![Value::List(inner), last])),
    ]
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 1..4)
        .prop_map(|segments| segments.join("."))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (path(), stored_value()).prop_map(|(p, v)| Op::Set(p, v)),
        (path(), stored_value()).prop_map(|(p, v)| Op::Put(p, v)),
        (
            prop::sample::select(vec!["g", "h"]),
            prop::sample::select(vec!["x", "y"]),
            stored_value()
        )
            .prop_map(|(g, k, v)| Op::PutNode(g, k, v)),
    ]
}

fn build(ops: &[Op]) -> MetaTree {
    let mut tree = MetaTree::new("root");
    let mut root = tree.root_mut();
    for op in ops {
        let applied = match op {
            Op::Set(path, value) => root.set_value(path, value.clone()),
            Op::Put(path, value) => root.put_value(path, value.clone()),
            Op::PutNode(group, key, value) => {
                let mut node = MetaTree::new(*group);
                node.root_mut()
                    .set_value(key, value.clone())
                    .expect("set on a fresh node must succeed");
                root.put_node(&node)
            }
        };
        applied.expect("mutation must succeed");
    }
    tree
}

proptest! {
    #[test]
    fn binary_roundtrip_preserves_structure(ops in prop::collection::vec(op(), 0..24)) {
        let tree = build(&ops);
        let bytes = serialize(&tree).expect("serialize must succeed");
        let decoded = deserialize(&bytes).expect("deserialize must succeed");
        prop_assert!(meta_eq(&decoded, &tree));
        prop_assert_eq!(decoded, tree.seal());
    }

    #[test]
    fn merge_with_empty_is_identity(ops in prop::collection::vec(op(), 0..24)) {
        let tree = build(&ops);
        let empty = SealedMeta::empty("other");
        prop_assert_eq!(merge_replace(&tree, &empty), tree.seal());
        prop_assert_eq!(merge_join(&tree, &empty), tree.seal());
    }

    #[test]
    fn sealing_a_tree_copy_is_stable(ops in prop::collection::vec(op(), 0..24)) {
        let tree = build(&ops);
        let copy = MetaTree::from_meta(&tree);
        prop_assert_eq!(copy.seal(), tree.seal());
        prop_assert_eq!(copy.value_stream().len(), tree.value_stream().len());
    }
}
