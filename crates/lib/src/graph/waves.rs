//! Wave scheduling over the live module graph.
//!
//! A wave is a set of variants with no edges between them, so a mutator or
//! generator can run on all of them in parallel. Bottom-up waves place every
//! dependency in an earlier wave than its dependents; top-down waves are the
//! reverse. Edges whose tag is `may_cycle` do not constrain the order.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::{Graph, ModuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
  BottomUp,
  TopDown,
}

/// Group the live variants of `graph` into waves.
///
/// On a cycle, returns the cycle as a path `a -> b -> ... -> a` of
/// dependents to dependencies.
pub(crate) fn compute_waves(graph: &Graph, direction: Direction) -> Result<Vec<Vec<ModuleId>>, Vec<ModuleId>> {
  let order = graph.live_modules();
  let rank: HashMap<ModuleId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

  // edges point from dependency to dependent
  let mut dag: DiGraph<ModuleId, ()> = DiGraph::with_capacity(order.len(), order.len());
  let nodes: HashMap<ModuleId, NodeIndex> = order.iter().map(|&id| (id, dag.add_node(id))).collect();
  for &id in &order {
    for edge in graph.deps(id) {
      if edge.tag.may_cycle {
        continue;
      }
      let Some(&dep) = nodes.get(&edge.target) else {
        continue;
      };
      dag.update_edge(dep, nodes[&id], ());
    }
  }

  let levels = match kahn_levels(&dag) {
    Ok(levels) => levels,
    Err(remaining) => return Err(find_cycle(&dag, &remaining, &rank)),
  };

  let mut waves: Vec<Vec<ModuleId>> = levels
    .into_iter()
    .map(|level| {
      let mut wave: Vec<ModuleId> = level.into_iter().map(|n| dag[n]).collect();
      wave.sort_by_key(|id| rank[id]);
      wave
    })
    .collect();
  if direction == Direction::TopDown {
    waves.reverse();
  }
  Ok(waves)
}

fn kahn_levels(dag: &DiGraph<ModuleId, ()>) -> Result<Vec<Vec<NodeIndex>>, HashSet<NodeIndex>> {
  let mut in_degree: HashMap<NodeIndex, usize> = dag
    .node_indices()
    .map(|n| (n, dag.neighbors_directed(n, petgraph::Direction::Incoming).count()))
    .collect();
  let mut remaining: HashSet<NodeIndex> = dag.node_indices().collect();
  let mut levels = Vec::new();

  while !remaining.is_empty() {
    let ready: Vec<NodeIndex> = remaining.iter().filter(|n| in_degree[*n] == 0).copied().collect();
    if ready.is_empty() {
      return Err(remaining);
    }
    for n in &ready {
      remaining.remove(n);
      for dependent in dag.neighbors_directed(*n, petgraph::Direction::Outgoing) {
        if let Some(deg) = in_degree.get_mut(&dependent) {
          *deg = deg.saturating_sub(1);
        }
      }
    }
    levels.push(ready);
  }
  Ok(levels)
}

/// Extract one concrete cycle from the nodes Kahn could not schedule.
fn find_cycle(dag: &DiGraph<ModuleId, ()>, remaining: &HashSet<NodeIndex>, rank: &HashMap<ModuleId, usize>) -> Vec<ModuleId> {
  let sub = dag.filter_map(
    |n, id| remaining.contains(&n).then_some(*id),
    |_, _| Some(()),
  );
  let component = tarjan_scc(&sub)
    .into_iter()
    .filter(|scc| scc.len() > 1 || sub.contains_edge(scc[0], scc[0]))
    .min_by_key(|scc| scc.iter().map(|n| rank[&sub[*n]]).min().unwrap_or(usize::MAX))
    .unwrap_or_default();
  let Some(&start) = component.iter().min_by_key(|n| rank[&sub[**n]]) else {
    return Vec::new();
  };
  let members: HashSet<NodeIndex> = component.iter().copied().collect();

  // walk dependent -> dependency, i.e. against the edge direction
  let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
  let mut queue = VecDeque::from([start]);
  let mut closing = None;
  while let Some(n) = queue.pop_front() {
    let mut next: Vec<NodeIndex> = sub
      .neighbors_directed(n, petgraph::Direction::Incoming)
      .filter(|m| members.contains(m))
      .collect();
    next.sort_by_key(|m| rank[&sub[*m]]);
    for m in next {
      if m == start {
        closing = Some(n);
        break;
      }
      if let std::collections::hash_map::Entry::Vacant(e) = prev.entry(m) {
        e.insert(n);
        queue.push_back(m);
      }
    }
    if closing.is_some() {
      break;
    }
  }

  let mut path = vec![sub[start]];
  let mut back = Vec::new();
  let mut cursor = closing.unwrap_or(start);
  while cursor != start {
    back.push(sub[cursor]);
    match prev.get(&cursor) {
      Some(p) => cursor = *p,
      None => break,
    }
  }
  back.reverse();
  path.extend(back);
  path.push(sub[start]);
  path
}
