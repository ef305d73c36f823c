use std::collections::{BTreeSet, VecDeque};

use crate::error::GraphError;
use crate::node::CompositeGraph;

/// Data dependencies between the sub-graphs of one composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependencies {
    /// `depends_on[j]` holds every index whose outputs feed an input of `j`.
    pub depends_on: Vec<BTreeSet<usize>>,
    /// Reverse of `depends_on`.
    pub feeds: Vec<BTreeSet<usize>>,
}

impl Dependencies {
    /// Connections with an out-of-range index are skipped; the builder has
    /// already rejected them.
    pub fn collect(graph: &CompositeGraph) -> Self {
        let n = graph.sub_graphs.len();
        let mut depends_on = vec![BTreeSet::new(); n];
        let mut feeds = vec![BTreeSet::new(); n];
        for c in &graph.connections {
            let (Some(from), Some(to)) = (c.from.index(), c.to.index()) else {
                continue;
            };
            if from >= n || to >= n {
                continue;
            }
            depends_on[to].insert(from);
            feeds[from].insert(to);
        }
        Dependencies { depends_on, feeds }
    }
}

/// Order sub-graph indices so that producers come before consumers.
///
/// Kahn's algorithm seeded in index order, so the result only depends on the
/// graph structure. Indices left over when the queue drains form (or hang off)
/// a cycle and are reported.
pub fn schedule(name: &str, graph: &CompositeGraph) -> Result<Vec<usize>, GraphError> {
    let deps = Dependencies::collect(graph);
    let n = deps.depends_on.len();

    let mut indeg: Vec<usize> = deps.depends_on.iter().map(BTreeSet::len).collect();
    let mut q: VecDeque<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(n);

    while let Some(i) = q.pop_front() {
        order.push(i);
        for &m in &deps.feeds[i] {
            indeg[m] -= 1;
            if indeg[m] == 0 {
                q.push_back(m);
            }
        }
    }

    if order.len() != n {
        let indices = (0..n).filter(|i| !order.contains(i)).collect();
        return Err(GraphError::CyclicDependency {
            node: name.to_string(),
            indices,
        });
    }
    Ok(order)
}
