//! Read-only walks over the graph, shared by mutator, action and singleton
//! contexts.

use std::collections::HashSet;

use crate::module::Module;

use super::{DependencyTag, Graph, ModuleId, ModuleInfo, ProviderKey, Variations};

/// A dependency as seen from the module being visited.
#[derive(Clone, Copy)]
pub struct DepView<'g> {
  graph: &'g Graph,
  id: ModuleId,
  tag: DependencyTag,
}

impl<'g> DepView<'g> {
  pub(crate) fn new(graph: &'g Graph, id: ModuleId, tag: DependencyTag) -> Self {
    Self { graph, id, tag }
  }

  pub fn id(&self) -> ModuleId {
    self.id
  }

  pub fn tag(&self) -> DependencyTag {
    self.tag
  }

  pub fn info(&self) -> &'g ModuleInfo {
    self.graph.info(self.id)
  }

  pub fn name(&self) -> &'g str {
    &self.info().name
  }

  pub fn variations(&self) -> &'g Variations {
    &self.info().variations
  }

  pub fn dir(&self) -> &'g str {
    &self.info().dir
  }

  pub fn enabled(&self) -> bool {
    self.info().enabled
  }

  /// The module value, unless a worker currently owns it.
  pub fn module(&self) -> Option<&'g dyn Module> {
    self.info().module()
  }

  pub fn downcast<T: Module>(&self) -> Option<&'g T> {
    self.module()?.downcast_ref::<T>()
  }

  pub fn provider<T: Send + Sync + 'static>(&self, key: &ProviderKey<T>) -> Option<&'g T> {
    self.info().providers.get(key)
  }
}

/// One step of [`Walker::walk_deps`].
pub struct WalkStep<'g> {
  pub child: DepView<'g>,
  pub parent: ModuleId,
  /// Variants from the walk root down to `child`, inclusive.
  pub path: Vec<ModuleId>,
  /// Tags of the edges along `path`.
  pub tags: Vec<&'static str>,
}

/// Walk primitives rooted at one variant.
#[derive(Clone, Copy)]
pub(crate) struct Walker<'g> {
  pub(crate) graph: &'g Graph,
  pub(crate) id: ModuleId,
}

impl<'g> Walker<'g> {
  pub(crate) fn new(graph: &'g Graph, id: ModuleId) -> Self {
    Self { graph, id }
  }

  /// One call per edge, in insertion order.
  pub(crate) fn visit_direct_deps(&self, mut f: impl FnMut(DepView<'g>)) {
    for edge in self.graph.deps(self.id) {
      f(DepView::new(self.graph, edge.target, edge.tag));
    }
  }

  pub(crate) fn visit_direct_deps_if(&self, pred: impl Fn(&DepView<'g>) -> bool, mut f: impl FnMut(DepView<'g>)) {
    self.visit_direct_deps(|dep| {
      if pred(&dep) {
        f(dep)
      }
    });
  }

  pub(crate) fn direct_deps(&self) -> Vec<DepView<'g>> {
    let mut deps = Vec::new();
    self.visit_direct_deps(|d| deps.push(d));
    deps
  }

  /// Depth-first walk from this variant. The visitor is called once per edge
  /// and returns whether to descend into the child; each variant's subtree
  /// is descended into at most once.
  pub(crate) fn walk_deps(&self, mut f: impl FnMut(&WalkStep<'g>) -> bool) {
    let mut visited = HashSet::new();
    let mut path = vec![self.id];
    let mut tags = Vec::new();
    self.walk(self.id, &mut visited, &mut path, &mut tags, &mut f);
  }

  fn walk(
    &self,
    parent: ModuleId,
    visited: &mut HashSet<ModuleId>,
    path: &mut Vec<ModuleId>,
    tags: &mut Vec<&'static str>,
    f: &mut dyn FnMut(&WalkStep<'g>) -> bool,
  ) {
    for edge in self.graph.deps(parent) {
      path.push(edge.target);
      tags.push(edge.tag.name);
      let step = WalkStep {
        child: DepView::new(self.graph, edge.target, edge.tag),
        parent,
        path: path.clone(),
        tags: tags.clone(),
      };
      if f(&step) && visited.insert(edge.target) {
        self.walk(edge.target, visited, path, tags, f);
      }
      path.pop();
      tags.pop();
    }
  }

  /// Every live variant sharing this variant's name, including itself.
  pub(crate) fn visit_all_variants(&self, mut f: impl FnMut(ModuleId, &'g ModuleInfo)) {
    for &id in self.graph.siblings(self.id) {
      f(id, self.graph.info(id));
    }
  }

  pub(crate) fn provider<T: Send + Sync + 'static>(&self, id: ModuleId, key: &ProviderKey<T>) -> Option<&'g T> {
    self.graph.info(id).providers.get(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::DepEdge;
  use crate::testutil::graph_with;

  const STATIC: DependencyTag = DependencyTag::new("static");
  const SHARED: DependencyTag = DependencyTag::new("shared");

  fn link(graph: &mut Graph, from: usize, to: usize, tag: DependencyTag) {
    graph.modules[from].deps.push(DepEdge {
      tag,
      target: ModuleId(to),
    });
  }

  #[test]
  fn direct_deps_visit_each_edge() {
    let mut graph = graph_with(&["a", "b"]);
    link(&mut graph, 0, 1, STATIC);
    link(&mut graph, 0, 1, SHARED);

    let walker = Walker::new(&graph, ModuleId(0));
    let seen: Vec<_> = walker.direct_deps().iter().map(|d| (d.name(), d.tag().name)).collect();
    assert_eq!(seen, vec![("b", "static"), ("b", "shared")]);

    let mut shared = Vec::new();
    walker.visit_direct_deps_if(|d| d.tag() == SHARED, |d| shared.push(d.id()));
    assert_eq!(shared, vec![ModuleId(1)]);
  }

  #[test]
  fn walk_records_paths_and_descends_once() {
    // a -> b -> d, a -> c -> d
    let mut graph = graph_with(&["a", "b", "c", "d"]);
    link(&mut graph, 0, 1, STATIC);
    link(&mut graph, 0, 2, SHARED);
    link(&mut graph, 1, 3, STATIC);
    link(&mut graph, 2, 3, SHARED);

    let mut steps = Vec::new();
    Walker::new(&graph, ModuleId(0)).walk_deps(|step| {
      let names: Vec<&str> = step.path.iter().map(|id| graph.info(*id).name()).collect();
      steps.push((names.join("->"), step.tags.join(",")));
      true
    });
    assert_eq!(
      steps,
      vec![
        ("a->b".to_string(), "static".to_string()),
        ("a->b->d".to_string(), "static,static".to_string()),
        ("a->c".to_string(), "shared".to_string()),
        ("a->c->d".to_string(), "shared,shared".to_string()),
      ]
    );
  }

  #[test]
  fn walk_stops_when_visitor_declines() {
    let mut graph = graph_with(&["a", "b", "c"]);
    link(&mut graph, 0, 1, STATIC);
    link(&mut graph, 1, 2, STATIC);

    let mut count = 0;
    Walker::new(&graph, ModuleId(0)).walk_deps(|_| {
      count += 1;
      false
    });
    assert_eq!(count, 1);
  }
}
