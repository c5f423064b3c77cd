//! Directed acyclic graphs of build rules.
//!
//! [`MutableDirectedGraph`] is a generic DAG over petgraph that refuses edges
//! closing a cycle. [`DependencyGraph`] specialises it to rules, and
//! [`GraphBuilder`] fills one from build files.

mod builder;
mod dependency;

pub use builder::GraphBuilder;
pub use dependency::DependencyGraph;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};

/// An edge was refused because it would close a cycle.
///
/// `path` starts and ends with the same node and follows existing edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
  pub path: Vec<T>,
}

impl<T: fmt::Display> fmt::Display for CycleError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let path: Vec<String> = self.path.iter().map(ToString::to_string).collect();
    write!(f, "cycle detected: {}", path.join(" -> "))
  }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for CycleError<T> {}

/// A directed graph that stays acyclic.
///
/// Nodes are identified by value. Traversals visit neighbours in sorted
/// order so results do not depend on insertion order.
#[derive(Debug, Clone)]
pub struct MutableDirectedGraph<T> {
  graph: DiGraph<T, ()>,
  indices: HashMap<T, NodeIndex>,
}

impl<T> Default for MutableDirectedGraph<T> {
  fn default() -> Self {
    Self {
      graph: DiGraph::new(),
      indices: HashMap::new(),
    }
  }
}

impl<T: Clone + Eq + Hash + Ord> MutableDirectedGraph<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `false` if the node was already present.
  pub fn add_node(&mut self, node: T) -> bool {
    if self.indices.contains_key(&node) {
      return false;
    }
    let idx = self.graph.add_node(node.clone());
    self.indices.insert(node, idx);
    true
  }

  fn index_of(&mut self, node: &T) -> NodeIndex {
    match self.indices.get(node) {
      Some(idx) => *idx,
      None => {
        let idx = self.graph.add_node(node.clone());
        self.indices.insert(node.clone(), idx);
        idx
      }
    }
  }

  /// Add `from -> to`, inserting missing nodes.
  ///
  /// Fails iff a path `to -> from` already exists; the graph is unchanged in
  /// that case apart from the inserted nodes.
  pub fn add_edge(&mut self, from: &T, to: &T) -> Result<(), CycleError<T>> {
    let from_idx = self.index_of(from);
    let to_idx = self.index_of(to);

    if has_path_connecting(&self.graph, to_idx, from_idx, None) {
      let mut path = vec![from.clone()];
      path.extend(self.find_path(to, from).unwrap_or_default());
      return Err(CycleError { path });
    }

    self.graph.update_edge(from_idx, to_idx, ());
    Ok(())
  }

  pub fn contains(&self, node: &T) -> bool {
    self.indices.contains_key(node)
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn has_edge(&self, from: &T, to: &T) -> bool {
    match (self.indices.get(from), self.indices.get(to)) {
      (Some(a), Some(b)) => self.graph.contains_edge(*a, *b),
      _ => false,
    }
  }

  /// Nodes `node` points to, sorted.
  pub fn outgoing(&self, node: &T) -> Vec<&T> {
    self.neighbors(node, Direction::Outgoing)
  }

  /// Nodes pointing to `node`, sorted.
  pub fn incoming(&self, node: &T) -> Vec<&T> {
    self.neighbors(node, Direction::Incoming)
  }

  fn neighbors(&self, node: &T, direction: Direction) -> Vec<&T> {
    let Some(idx) = self.indices.get(node) else {
      return Vec::new();
    };
    let mut out: Vec<&T> = self
      .graph
      .neighbors_directed(*idx, direction)
      .map(|n| &self.graph[n])
      .collect();
    out.sort();
    out.dedup();
    out
  }

  /// Shortest path `from -> .. -> to`, both ends included.
  pub fn find_path(&self, from: &T, to: &T) -> Option<Vec<T>> {
    let start = *self.indices.get(from)?;
    let goal = *self.indices.get(to)?;

    let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
      if current == goal {
        let mut path = vec![self.graph[current].clone()];
        let mut cursor = current;
        while let Some(parent) = parents.get(&cursor) {
          path.push(self.graph[*parent].clone());
          cursor = *parent;
        }
        path.reverse();
        return Some(path);
      }
      let mut next: Vec<NodeIndex> = self.graph.neighbors(current).collect();
      next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
      for n in next {
        if seen.insert(n) {
          parents.insert(n, current);
          queue.push_back(n);
        }
      }
    }
    None
  }

  /// Every node, each before the nodes it points to. Ties are broken by node
  /// order.
  pub fn topological_order(&self) -> Vec<T> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut ready: BTreeSet<(T, NodeIndex)> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(idx, _)| (self.graph[*idx].clone(), *idx))
      .collect();

    let mut order = Vec::with_capacity(self.graph.node_count());
    while let Some((node, idx)) = ready.pop_first() {
      order.push(node);
      for succ in self.graph.neighbors(idx) {
        if let Some(degree) = in_degree.get_mut(&succ) {
          *degree -= 1;
          if *degree == 0 {
            ready.insert((self.graph[succ].clone(), succ));
          }
        }
      }
    }
    order
  }

  /// Every node after all the nodes it points to.
  pub fn reverse_topological_order(&self) -> Vec<T> {
    let mut order = self.topological_order();
    order.reverse();
    order
  }

  /// Nodes reachable from `roots`, roots included, each exactly once and
  /// after everything it points to.
  pub fn postorder_from(&self, roots: &[T]) -> Vec<T> {
    let mut sorted_roots: Vec<&T> = roots.iter().collect();
    sorted_roots.sort();

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut order = Vec::new();

    for root in sorted_roots {
      let Some(&start) = self.indices.get(root) else {
        continue;
      };
      if !visited.insert(start) {
        continue;
      }
      let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, self.sorted_successors(start))];
      while let Some((node, pending)) = stack.last_mut() {
        match pending.pop() {
          Some(child) => {
            if visited.insert(child) {
              let children = self.sorted_successors(child);
              stack.push((child, children));
            }
          }
          None => {
            order.push(self.graph[*node].clone());
            stack.pop();
          }
        }
      }
    }
    order
  }

  /// Successors in reverse order, so popping yields them smallest first.
  fn sorted_successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut succ: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
    succ.sort_by(|a, b| self.graph[*b].cmp(&self.graph[*a]));
    succ.dedup();
    succ
  }
}
