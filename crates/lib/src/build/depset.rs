//! Immutable ordered sets with structural sharing.
//!
//! A [`DepSet`] is a node holding direct elements and references to other
//! depsets. Building one is cheap; the flattened list is computed once, on
//! first query, and duplicates are dropped keeping the first occurrence.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

/// How [`DepSet::to_list`] orders elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepSetOrder {
  /// Direct elements, then each transitive set in order.
  #[default]
  Preorder,
  /// Each transitive set in order, then direct elements: dependencies come
  /// before the modules that depend on them.
  Postorder,
  /// Direct elements of a node before those of any node it contains, with
  /// shared nodes placed after every node that contains them.
  Topological,
}

#[derive(Debug)]
struct Node<T> {
  order: DepSetOrder,
  direct: Vec<T>,
  transitive: Vec<DepSet<T>>,
  flat: OnceLock<Vec<T>>,
}

#[derive(Debug)]
pub struct DepSet<T> {
  node: Option<Arc<Node<T>>>,
}

impl<T> Clone for DepSet<T> {
  fn clone(&self) -> Self {
    Self { node: self.node.clone() }
  }
}

impl<T> Default for DepSet<T> {
  fn default() -> Self {
    Self { node: None }
  }
}

impl<T: Clone + Eq + Hash> DepSet<T> {
  pub fn new(order: DepSetOrder, direct: Vec<T>, transitive: Vec<DepSet<T>>) -> Self {
    let transitive: Vec<DepSet<T>> = transitive.into_iter().filter(|t| !t.is_empty()).collect();
    if direct.is_empty() && transitive.is_empty() {
      return Self::default();
    }
    // a set wrapping exactly one other set adds nothing
    if direct.is_empty() && transitive.len() == 1 && transitive[0].order() == Some(order) {
      return transitive.into_iter().next().unwrap_or_default();
    }
    Self {
      node: Some(Arc::new(Node {
        order,
        direct,
        transitive,
        flat: OnceLock::new(),
      })),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.node.is_none()
  }

  fn order(&self) -> Option<DepSetOrder> {
    self.node.as_ref().map(|n| n.order)
  }

  /// The flattened elements, computed on first call.
  pub fn to_list(&self) -> Vec<T> {
    match &self.node {
      None => Vec::new(),
      Some(node) => node.flat.get_or_init(|| flatten(node)).clone(),
    }
  }
}

fn flatten<T: Clone + Eq + Hash>(root: &Arc<Node<T>>) -> Vec<T> {
  let mut nodes = Vec::new();
  let mut visited = HashSet::new();
  match root.order {
    DepSetOrder::Preorder => preorder(root, &mut visited, &mut nodes),
    DepSetOrder::Postorder => postorder(root, &mut visited, &mut nodes, false),
    DepSetOrder::Topological => {
      postorder(root, &mut visited, &mut nodes, true);
      nodes.reverse();
    }
  }

  let mut seen = HashSet::new();
  let mut out = Vec::new();
  for node in nodes {
    for item in &node.direct {
      if seen.insert(item.clone()) {
        out.push(item.clone());
      }
    }
  }
  out
}

fn preorder<'a, T>(node: &'a Arc<Node<T>>, visited: &mut HashSet<*const Node<T>>, out: &mut Vec<&'a Node<T>>) {
  if !visited.insert(Arc::as_ptr(node)) {
    return;
  }
  out.push(node.as_ref());
  for child in node.transitive.iter().filter_map(|t| t.node.as_ref()) {
    preorder(child, visited, out);
  }
}

fn postorder<'a, T>(
  node: &'a Arc<Node<T>>,
  visited: &mut HashSet<*const Node<T>>,
  out: &mut Vec<&'a Node<T>>,
  reverse_children: bool,
) {
  if !visited.insert(Arc::as_ptr(node)) {
    return;
  }
  let children: Vec<&Arc<Node<T>>> = node.transitive.iter().filter_map(|t| t.node.as_ref()).collect();
  if reverse_children {
    for child in children.into_iter().rev() {
      postorder(child, visited, out, reverse_children);
    }
  } else {
    for child in children {
      postorder(child, visited, out, reverse_children);
    }
  }
  out.push(node.as_ref());
}

#[cfg(test)]
mod tests {
  use super::*;

  fn set(order: DepSetOrder, direct: &[&str], transitive: Vec<DepSet<String>>) -> DepSet<String> {
    DepSet::new(order, direct.iter().map(|s| s.to_string()).collect(), transitive)
  }

  #[test]
  fn postorder_puts_dependencies_first() {
    let q = set(DepSetOrder::Postorder, &["q.out"], vec![]);
    let p = set(DepSetOrder::Postorder, &["p.out"], vec![q]);
    assert_eq!(p.to_list(), vec!["q.out", "p.out"]);
  }

  #[test]
  fn diamonds_are_deduplicated() {
    use DepSetOrder::*;
    let d = set(Postorder, &["d"], vec![]);
    let b = set(Postorder, &["b"], vec![d.clone()]);
    let c = set(Postorder, &["c", "d"], vec![d.clone()]);
    let a = set(Postorder, &["a"], vec![b.clone(), c.clone()]);
    assert_eq!(a.to_list(), vec!["d", "b", "c", "a"]);

    let d = set(Preorder, &["d"], vec![]);
    let b = set(Preorder, &["b"], vec![d.clone()]);
    let c = set(Preorder, &["c"], vec![d]);
    let a = set(Preorder, &["a"], vec![b, c]);
    assert_eq!(a.to_list(), vec!["a", "b", "d", "c"]);
  }

  #[test]
  fn topological_places_shared_nodes_last() {
    use DepSetOrder::Topological;
    let d = set(Topological, &["d"], vec![]);
    let b = set(Topological, &["b"], vec![d.clone()]);
    let c = set(Topological, &["c"], vec![d]);
    let a = set(Topological, &["a"], vec![b, c]);
    assert_eq!(a.to_list(), vec!["a", "b", "c", "d"]);
  }

  #[test]
  fn empty_sets_collapse() {
    let empty: DepSet<String> = DepSet::new(DepSetOrder::Postorder, vec![], vec![DepSet::default()]);
    assert!(empty.is_empty());
    assert!(empty.to_list().is_empty());
  }
}
