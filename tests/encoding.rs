use belt_vm::prelude::*;

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

fn hex(s: &str) -> Vec<u8> {
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap();
            u8::from_str_radix(text, 16).unwrap()
        })
        .collect()
}

#[test]
fn complex_forest_decodes() {
    let bytes = hex(concat!(
        "020403",
        "0009",
        "010302",
        "0008", "0001",
        "0000", "0005",
        "0007", "0002",
        "020601", "0003",
        "010201",
        "000a",
        "0002",
    ));
    let forest = decode_loop_trees(&bytes).unwrap();
    assert_eq!(
        forest,
        vec![
            LoopTree::Cartesian(
                4,
                vec![
                    LoopTree::Leaf(9),
                    LoopTree::RolledOut(vec![
                        vec![LoopTree::Leaf(8), LoopTree::Leaf(1)],
                        vec![LoopTree::Leaf(0), LoopTree::Leaf(5)],
                        vec![LoopTree::Leaf(7), LoopTree::Leaf(2)],
                    ]),
                    LoopTree::Cartesian(6, vec![LoopTree::Leaf(3)]),
                ],
            ),
            LoopTree::RolledOut(vec![vec![LoopTree::Leaf(10)], vec![LoopTree::Leaf(2)]]),
        ]
    );
    assert_eq!(encode_loop_trees(&forest), bytes);
}

#[test]
fn multi_byte_counts_round_trip() {
    let bytes = hex("000300ff01007f");
    let forest = decode_loop_trees(&bytes).unwrap();
    assert_eq!(
        forest,
        vec![LoopTree::Leaf(3), LoopTree::Leaf(0xff), LoopTree::Leaf(0x7f)]
    );
    assert_eq!(encode_loop_trees(&forest), bytes);
}

#[test]
fn truncated_stream_is_rejected() {
    let err = decode_loop_trees(&hex("0204")).unwrap_err();
    assert_eq!(err.kind, DecodeErrorKind::UnexpectedEof);
}

#[test]
fn unknown_tag_is_rejected() {
    let err = decode_loop_trees(&hex("03")).unwrap_err();
    assert_eq!(err.kind, DecodeErrorKind::UnknownTag(0x03));
    assert_eq!(err.offset, 0);
}

/// Generator wrapper: sized, rectangular loop trees.
#[derive(Debug, Clone)]
struct ArbTree(LoopTree);

fn arbitrary_tree(g: &mut Gen, depth: usize) -> LoopTree {
    let small = |g: &mut Gen| u64::from(u8::arbitrary(g) % 4);
    if depth == 0 {
        return LoopTree::Leaf(small(g));
    }
    match u8::arbitrary(g) % 3 {
        0 => LoopTree::Leaf(small(g)),
        1 => {
            let rows = small(g) as usize;
            let columns = small(g) as usize;
            LoopTree::RolledOut(
                (0..rows)
                    .map(|_| (0..columns).map(|_| arbitrary_tree(g, depth - 1)).collect())
                    .collect(),
            )
        }
        _ => {
            let children = small(g) as usize;
            LoopTree::Cartesian(
                small(g),
                (0..children).map(|_| arbitrary_tree(g, depth - 1)).collect(),
            )
        }
    }
}

impl Arbitrary for ArbTree {
    fn arbitrary(g: &mut Gen) -> Self {
        ArbTree(arbitrary_tree(g, 3))
    }
}

#[quickcheck]
fn encode_decode_round_trips(trees: Vec<ArbTree>) -> bool {
    let forest: Vec<LoopTree> = trees.into_iter().map(|t| t.0).collect();
    let bytes = encode_loop_trees(&forest);
    decode_loop_trees(&bytes) == Ok(forest)
}

/// Walk a stack exactly along the shapes of its own forest; the two
/// sides must never diverge.
fn drive(stack: &mut LoopStack, tree: &LoopTree) {
    stack.start_loop().unwrap();
    let n = tree.num_loops();
    for i in 0..n as usize {
        assert!(!stack.next().unwrap());
        match tree {
            LoopTree::Leaf(_) => {}
            LoopTree::RolledOut(matrix) => {
                for child in &matrix[i] {
                    drive(stack, child);
                }
            }
            LoopTree::Cartesian(_, children) => {
                for child in children {
                    drive(stack, child);
                }
            }
        }
    }
    assert!(stack.next().unwrap());
}

#[quickcheck]
fn loop_stack_follows_any_well_formed_forest(trees: Vec<ArbTree>) -> bool {
    let forest: Vec<LoopTree> = trees.into_iter().map(|t| t.0).collect();
    let mut stack = LoopStack::new(forest.clone());
    for tree in &forest {
        drive(&mut stack, tree);
    }
    stack.next() == Err(TrapReason::NoCurrentLoop)
}
