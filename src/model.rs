//! A model-based equivalence check of [`WavlMap`] against [`BTreeMap`].
//!
//! Shared by the crate's property tests and the fuzz targets.

extern crate std;

use std::{collections::BTreeMap, prelude::v1::*};

use arbitrary::Arbitrary;
use proptest::strategy::{Just, Strategy};

use crate::{Error, WavlMap};

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Delete(ItemValue),
    Min,
    PopFirst,
    Max,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::Get(item) => FinalOp::Get(get_value(sorted, item)),
            Op::Delete(item) => FinalOp::Delete(get_value(sorted, item)),
            Op::Min => FinalOp::Min,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Max => FinalOp::Max,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Delete(u32),
    Min,
    PopFirst,
    Max,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Delete),
        Just(Op::Min),
        Just(Op::PopFirst),
        Just(Op::Max),
        Just(Op::PopLast),
    ]
}

// Values are derived from keys so that value order can be checked alongside key order.
fn value_of(key: u32) -> u64 {
    u64::from(key) * 3 + 1
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut btree = BTreeMap::new();
    let mut wavl: WavlMap<u32, u64> = WavlMap::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        // Index-based operations pick an existing key, so most of them hit.
        let sorted: Vec<u32> = btree.keys().copied().collect();
        let final_op = op.finalize(&sorted);

        match final_op {
            FinalOp::Insert(key) => {
                let from_btree = if btree.contains_key(&key) {
                    Err(Error::DuplicateKey)
                } else {
                    btree.insert(key, value_of(key));
                    Ok(())
                };
                let from_wavl = wavl.insert(key, value_of(key)).map(drop);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(key) => {
                let from_btree = btree.get(&key);
                let from_wavl = wavl.get(&key);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Delete(key) => {
                let from_btree = btree.remove(&key).map(drop).ok_or(Error::KeyNotFound);
                let from_wavl = wavl.delete(&key).map(drop);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Min => {
                let from_btree = btree.values().next();
                let from_wavl = wavl.min();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_wavl = wavl.pop_first();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Max => {
                let from_btree = btree.values().next_back();
                let from_wavl = wavl.max();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_wavl = wavl.pop_last();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        wavl.assert_invariants();
        assert_eq!(btree.len(), wavl.len());
        assert!(btree.keys().eq(wavl.keys_in_order()));
        assert!(btree.values().eq(wavl.values_in_order()));
    }
}
