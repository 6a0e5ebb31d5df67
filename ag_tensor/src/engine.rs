//! Reverse-mode execution of the backward graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::array::{self, Array};
use crate::error::{Error, Result};
use crate::node::{Node, NodeRef};

/// Key for per-node bookkeeping: the node's allocation.
type NodeKey = *const Node;

fn key(node: &NodeRef) -> NodeKey {
    Rc::as_ptr(node)
}

/// A node together with the gradient accumulated for it so far.
struct NodeTask {
    node: NodeRef,
    grad: Array,
}

/// Executes a backward pass from a root node.
///
/// A node fires exactly once, after every node that feeds it a gradient has
/// fired. Ready nodes run in FIFO order, so for a given graph the order of
/// `apply` calls is deterministic.
#[derive(Debug, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Engine
    }

    /// Propagate `seed` (the gradient of the root's output) through the graph.
    pub fn execute(&self, root: &NodeRef, seed: Array) -> Result<()> {
        let mut dependencies = compute_dependencies(root);
        tracing::debug!(
            root = root.name(),
            nodes = dependencies.len() + 1,
            "executing backward pass"
        );

        let mut pending: HashMap<NodeKey, NodeTask> = HashMap::new();
        let mut ready: VecDeque<NodeTask> = VecDeque::new();
        ready.push_back(NodeTask {
            node: Rc::clone(root),
            grad: seed,
        });

        while let Some(task) = ready.pop_front() {
            let node = task.node;
            let edges = node.next_edges();

            let grads = {
                let _span = tracing::trace_span!("apply", node = node.name()).entered();
                node.apply(task.grad)?
            };

            if grads.len() != edges.len() {
                return Err(Error::ContractViolation(format!(
                    "{} returned {} gradients for {} edges",
                    node.name(),
                    grads.len(),
                    edges.len()
                )));
            }

            for (edge, grad) in edges.iter().zip(grads) {
                let target = edge.node();
                let target_key = key(target);

                let remaining = dependencies.get_mut(&target_key).ok_or_else(|| {
                    Error::ContractViolation(format!(
                        "{} is not in the dependency map",
                        target.name()
                    ))
                })?;
                *remaining -= 1;
                let is_ready = *remaining == 0;

                match pending.get_mut(&target_key) {
                    Some(task) => array::accumulate_into(&mut task.grad, &grad)?,
                    None => {
                        pending.insert(
                            target_key,
                            NodeTask {
                                node: Rc::clone(target),
                                grad,
                            },
                        );
                    }
                }

                if is_ready {
                    if let Some(task) = pending.remove(&target_key) {
                        ready.push_back(task);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Count in-edges of every node reachable from `root`.
///
/// Each node is expanded once, so a shared subgraph contributes its edges a
/// single time no matter how many paths lead to it. The root itself has no
/// entry unless the graph loops back to it, which op construction rules out.
fn compute_dependencies(root: &NodeRef) -> HashMap<NodeKey, usize> {
    let mut dependencies: HashMap<NodeKey, usize> = HashMap::new();
    let mut visited: HashSet<NodeKey> = HashSet::new();
    let mut stack: Vec<NodeRef> = vec![Rc::clone(root)];
    visited.insert(key(root));

    while let Some(node) = stack.pop() {
        for edge in node.next_edges() {
            let target = edge.node();
            *dependencies.entry(key(target)).or_insert(0) += 1;
            if visited.insert(key(target)) {
                stack.push(Rc::clone(target));
            }
        }
    }

    dependencies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Backward, Edge};
    use crate::shape::Shape;
    use crate::tensor::Tensor;
    use std::rc::Weak;

    #[test]
    fn test_dependencies_count_each_edge_once() {
        // y = (x * x) + (x * x): the AccumulateGrad node for x has four
        // in-edges, each product node one.
        let x = Tensor::new(2.0, true);
        let a = &x * &x;
        let b = &x * &x;
        let y = &a + &b;

        let deps = compute_dependencies(&y.grad_fn().unwrap());
        let leaf = x.grad_fn().unwrap();
        assert_eq!(deps[&key(&leaf)], 4);
        assert_eq!(deps[&key(&a.grad_fn().unwrap())], 1);
        assert_eq!(deps[&key(&b.grad_fn().unwrap())], 1);
        assert_eq!(deps.len(), 3);
    }

    #[test]
    fn test_shared_subgraph_counted_once() {
        // s = x * x is reached twice; its own edges must only count once.
        let x = Tensor::new(3.0, true);
        let s = &x * &x;
        let y = &s + &s;

        let deps = compute_dependencies(&y.grad_fn().unwrap());
        assert_eq!(deps[&key(&s.grad_fn().unwrap())], 2);
        assert_eq!(deps[&key(&x.grad_fn().unwrap())], 2);
    }

    #[test]
    fn test_execute_diamond() {
        let x = Tensor::new(3.0, true);
        let s = &x * &x;
        let y = &s + &s;

        Engine::new()
            .execute(&y.grad_fn().unwrap(), array::scalar(1.0))
            .unwrap();
        // y = 2x^2, dy/dx = 4x
        assert_eq!(x.grad().unwrap().item().unwrap(), 12.0);
    }

    #[test]
    fn test_execute_from_leaf_root() {
        let x = Tensor::new(1.0, true);
        let root = x.ensure_grad_fn();
        Engine::new().execute(&root, array::scalar(5.0)).unwrap();
        assert_eq!(x.grad().unwrap().item().unwrap(), 5.0);
    }

    #[test]
    fn test_gradient_count_must_match_edges() {
        // Two operand slots but only one edge.
        let node = Node::new(
            Backward::Add {
                lhs: Some(Shape::scalar()),
                rhs: Some(Shape::scalar()),
            },
            vec![Edge::new(Node::accumulate_grad(Weak::new()))],
        );
        let err = Engine::new().execute(&node, array::scalar(1.0)).unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)), "{:?}", err);
        assert!(err.to_string().contains("AddBackward returned 2 gradients for 1 edges"));

        // A gradient with nowhere to go.
        let node = Node::new(Backward::Neg, Vec::new());
        assert!(matches!(
            Engine::new().execute(&node, array::scalar(1.0)),
            Err(Error::ContractViolation(_))
        ));
    }
}
