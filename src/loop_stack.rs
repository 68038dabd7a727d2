//! Runtime cursor over the witness loop-tree forest.
//!
//! The witness, not the program, decides how many times every loop
//! runs. The stack walks the forest as the program enters, iterates,
//! breaks out of and continues loops; any divergence between the
//! program's loop nesting and the witness shapes is a trap.

use crate::error::TrapReason;
use crate::loop_tree::LoopTree;

#[derive(Debug, Clone)]
struct Frame {
    tree: LoopTree,
    /// Completed iterations of this frame's own loop.
    position: u64,
    /// Child shapes consumed within the current iteration.
    inner_position: usize,
}

/// Cursor over a sequence of loop trees.
///
/// The forest is consumed exactly once, in order; each top-level
/// `Loop` pops the next tree.
#[derive(Debug, Clone)]
pub struct LoopStack {
    trees: Vec<LoopTree>,
    index: usize,
    stack: Vec<Frame>,
}

impl LoopStack {
    /// A cursor over the given forest.
    pub fn new(trees: Vec<LoopTree>) -> Self {
        Self {
            trees,
            index: 0,
            stack: Vec::new(),
        }
    }

    /// Enter a loop: the next forest tree at the top level, or the
    /// child shape the current iteration of the enclosing loop expects.
    pub fn start_loop(&mut self) -> Result<(), TrapReason> {
        let Some(top) = self.stack.last_mut() else {
            let tree = self
                .trees
                .get(self.index)
                .ok_or(TrapReason::LoopForestExhausted)?
                .clone();
            self.index += 1;
            self.stack.push(Frame {
                tree,
                position: 0,
                inner_position: 0,
            });
            return Ok(());
        };

        let child = match &top.tree {
            LoopTree::Leaf(_) => return Err(TrapReason::LoopInLeaf),
            LoopTree::RolledOut(matrix) => {
                if top.position == 0 {
                    return Err(TrapReason::LoopBeforeIteration);
                }
                if top.position > matrix.len() as u64 {
                    return Err(TrapReason::LoopIteratedTooFar);
                }
                matrix[top.position as usize - 1]
                    .get(top.inner_position)
                    .ok_or(TrapReason::NoSuchNestedLoop)?
                    .clone()
            }
            LoopTree::Cartesian(n, children) => {
                if top.position == 0 {
                    return Err(TrapReason::LoopBeforeIteration);
                }
                if top.position > *n {
                    return Err(TrapReason::LoopIteratedTooFar);
                }
                children
                    .get(top.inner_position)
                    .ok_or(TrapReason::NoSuchNestedLoop)?
                    .clone()
            }
        };
        top.inner_position += 1;
        self.stack.push(Frame {
            tree: child,
            position: 0,
            inner_position: 0,
        });
        Ok(())
    }

    /// Advance the current loop. Returns true when the loop has run its
    /// full iteration count and the caller must exit it.
    pub fn next(&mut self) -> Result<bool, TrapReason> {
        let top = self.stack.last_mut().ok_or(TrapReason::NoCurrentLoop)?;
        if top.position == top.tree.num_loops() {
            self.stack.pop();
            if let Some(parent) = self.stack.last_mut() {
                if parent.inner_position == parent.tree.num_children() {
                    parent.inner_position = 0;
                }
            }
            return Ok(true);
        }
        top.position += 1;
        Ok(false)
    }

    /// Leave the current loop early.
    pub fn break_loop(&mut self) -> Result<(), TrapReason> {
        self.stack.pop().ok_or(TrapReason::NoCurrentLoop)?;
        if let Some(parent) = self.stack.last_mut() {
            parent.inner_position += 1;
            if parent.inner_position == parent.tree.num_children() {
                parent.inner_position = 0;
            }
        }
        Ok(())
    }

    /// Restart the current iteration's child shapes.
    pub fn continue_loop(&mut self) -> Result<(), TrapReason> {
        let top = self.stack.last_mut().ok_or(TrapReason::NoCurrentLoop)?;
        top.inner_position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_runs_its_count_then_exhausts() {
        let mut stack = LoopStack::new(vec![LoopTree::Leaf(9)]);
        stack.start_loop().unwrap();
        for _ in 0..9 {
            assert!(!stack.next().unwrap());
        }
        assert!(stack.next().unwrap());
        assert_eq!(stack.next(), Err(TrapReason::NoCurrentLoop));
    }

    #[test]
    fn cartesian_children_repeat_every_iteration() {
        let mut stack = LoopStack::new(vec![LoopTree::Cartesian(
            3,
            vec![LoopTree::Leaf(2), LoopTree::Leaf(4)],
        )]);
        stack.start_loop().unwrap();
        for _ in 0..3 {
            assert!(!stack.next().unwrap());

            stack.start_loop().unwrap();
            for _ in 0..2 {
                assert!(!stack.next().unwrap());
            }
            assert!(stack.next().unwrap());

            stack.start_loop().unwrap();
            for _ in 0..4 {
                assert!(!stack.next().unwrap());
            }
            assert!(stack.next().unwrap());
        }
        assert!(stack.next().unwrap());
        assert_eq!(stack.next(), Err(TrapReason::NoCurrentLoop));
    }

    #[test]
    fn rolled_out_rows_differ_per_iteration() {
        let mut stack = LoopStack::new(vec![LoopTree::Cartesian(
            2,
            vec![LoopTree::RolledOut(vec![
                vec![LoopTree::Leaf(3), LoopTree::Leaf(1)],
                vec![LoopTree::Leaf(4), LoopTree::Leaf(2)],
            ])],
        )]);
        stack.start_loop().unwrap();
        for _ in 0..2 {
            assert!(!stack.next().unwrap());

            stack.start_loop().unwrap();
            for (loop1, loop2) in [(3, 1), (4, 2)] {
                assert!(!stack.next().unwrap());

                stack.start_loop().unwrap();
                for _ in 0..loop1 {
                    assert!(!stack.next().unwrap());
                }
                assert!(stack.next().unwrap());

                stack.start_loop().unwrap();
                for _ in 0..loop2 {
                    assert!(!stack.next().unwrap());
                }
                assert!(stack.next().unwrap());
            }
            assert!(stack.next().unwrap());
        }
        assert!(stack.next().unwrap());
        assert_eq!(stack.next(), Err(TrapReason::NoCurrentLoop));
    }

    #[test]
    fn mixed_forest_walks_to_exhaustion() {
        let mut stack = LoopStack::new(vec![
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
        ]);
        stack.start_loop().unwrap();
        for _ in 0..4 {
            assert!(!stack.next().unwrap());

            stack.start_loop().unwrap();
            for _ in 0..9 {
                assert!(!stack.next().unwrap());
            }
            assert!(stack.next().unwrap());

            stack.start_loop().unwrap();
            for (loop1, loop2) in [(8, 1), (0, 5), (7, 2)] {
                assert!(!stack.next().unwrap());

                stack.start_loop().unwrap();
                for _ in 0..loop1 {
                    assert!(!stack.next().unwrap());
                }
                assert!(stack.next().unwrap());

                stack.start_loop().unwrap();
                for _ in 0..loop2 {
                    assert!(!stack.next().unwrap());
                }
                assert!(stack.next().unwrap());
            }
            assert!(stack.next().unwrap());

            stack.start_loop().unwrap();
            for _ in 0..6 {
                assert!(!stack.next().unwrap());

                stack.start_loop().unwrap();
                for _ in 0..3 {
                    assert!(!stack.next().unwrap());
                }
                assert!(stack.next().unwrap());
            }
            assert!(stack.next().unwrap());
        }
        assert!(stack.next().unwrap());

        stack.start_loop().unwrap();
        for count in [10, 2] {
            assert!(!stack.next().unwrap());

            stack.start_loop().unwrap();
            for _ in 0..count {
                assert!(!stack.next().unwrap());
            }
            assert!(stack.next().unwrap());
        }
        assert!(stack.next().unwrap());
        assert_eq!(stack.next(), Err(TrapReason::NoCurrentLoop));
    }

    #[test]
    fn nesting_into_a_leaf_traps() {
        let mut stack = LoopStack::new(vec![LoopTree::Leaf(2)]);
        stack.start_loop().unwrap();
        assert!(!stack.next().unwrap());
        assert_eq!(stack.start_loop(), Err(TrapReason::LoopInLeaf));
    }

    #[test]
    fn nesting_before_first_iteration_traps() {
        let mut stack = LoopStack::new(vec![LoopTree::Cartesian(1, vec![LoopTree::Leaf(1)])]);
        stack.start_loop().unwrap();
        assert_eq!(stack.start_loop(), Err(TrapReason::LoopBeforeIteration));
    }

    #[test]
    fn nested_loop_without_child_shape_traps() {
        let mut stack = LoopStack::new(vec![LoopTree::Cartesian(1, vec![])]);
        stack.start_loop().unwrap();
        assert!(!stack.next().unwrap());
        assert_eq!(stack.start_loop(), Err(TrapReason::NoSuchNestedLoop));
    }

    #[test]
    fn empty_forest_exhausts_immediately() {
        let mut stack = LoopStack::new(vec![]);
        assert_eq!(stack.start_loop(), Err(TrapReason::LoopForestExhausted));
    }
}
