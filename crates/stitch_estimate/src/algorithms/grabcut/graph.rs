//! s-t min-cut on a capacitated graph (Dinic's max-flow).

use std::collections::VecDeque;

const NONE: u32 = u32::MAX;
const EPSILON: f64 = 1e-9;

/// Flow network whose nodes are pixels plus an implicit source and sink.
///
/// Edges are stored pairwise: edge `e` and its reverse `e ^ 1`.
#[derive(Debug)]
pub struct CutGraph {
    nodes: usize,
    head: Vec<u32>,
    next: Vec<u32>,
    to: Vec<u32>,
    capacity: Vec<f64>,
    level: Vec<i32>,
    cursor: Vec<u32>,
}

impl CutGraph {
    pub fn new(nodes: usize, edge_hint: usize) -> Self {
        Self {
            nodes,
            head: vec![NONE; nodes + 2],
            next: Vec::with_capacity(edge_hint * 2),
            to: Vec::with_capacity(edge_hint * 2),
            capacity: Vec::with_capacity(edge_hint * 2),
            level: vec![-1; nodes + 2],
            cursor: vec![NONE; nodes + 2],
        }
    }

    fn source(&self) -> usize {
        self.nodes
    }

    fn sink(&self) -> usize {
        self.nodes + 1
    }

    fn push_arc(&mut self, from: usize, to: usize, capacity: f64) {
        self.to.push(to as u32);
        self.capacity.push(capacity);
        self.next.push(self.head[from]);
        self.head[from] = (self.to.len() - 1) as u32;
    }

    /// Undirected-style pair: `capacity` from a to b, `reverse` from b to a.
    pub fn add_edge(&mut self, a: usize, b: usize, capacity: f64, reverse: f64) {
        self.push_arc(a, b, capacity);
        self.push_arc(b, a, reverse);
    }

    /// Terminal links. Only the difference matters for the cut, so a single
    /// arc carries it.
    pub fn add_terminal_weights(&mut self, node: usize, from_source: f64, to_sink: f64) {
        let delta = from_source - to_sink;
        if delta > 0.0 {
            let source = self.source();
            self.add_edge(source, node, delta, 0.0);
        } else if delta < 0.0 {
            let sink = self.sink();
            self.add_edge(node, sink, -delta, 0.0);
        }
    }

    fn build_levels(&mut self) -> bool {
        let (source, sink) = (self.source(), self.sink());
        self.level.iter_mut().for_each(|l| *l = -1);
        self.level[source] = 0;

        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e as usize] as usize;
                if self.capacity[e as usize] > EPSILON && self.level[v] < 0 {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
                e = self.next[e as usize];
            }
        }
        self.level[sink] >= 0
    }

    /// Push a blocking flow through the current level graph.
    fn blocking_flow(&mut self) -> f64 {
        let (source, sink) = (self.source(), self.sink());
        self.cursor.copy_from_slice(&self.head);

        let mut total = 0.0;
        let mut path: Vec<u32> = Vec::new();
        let mut u = source;
        loop {
            if u == sink {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.capacity[e as usize])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.capacity[e as usize] -= bottleneck;
                    self.capacity[(e ^ 1) as usize] += bottleneck;
                }
                total += bottleneck;

                // Retreat to the tail of the first saturated arc.
                let saturated = path
                    .iter()
                    .position(|&e| self.capacity[e as usize] <= EPSILON)
                    .unwrap_or(0);
                path.truncate(saturated);
                u = path.last().map_or(source, |&e| self.to[e as usize] as usize);
                continue;
            }

            let mut advanced = false;
            while self.cursor[u] != NONE {
                let e = self.cursor[u];
                let v = self.to[e as usize] as usize;
                if self.capacity[e as usize] > EPSILON && self.level[v] == self.level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.cursor[u] = self.next[e as usize];
            }
            if advanced {
                continue;
            }

            // Dead end: prune the node and back off one arc.
            self.level[u] = -1;
            match path.pop() {
                Some(e) => {
                    u = self.to[(e ^ 1) as usize] as usize;
                    self.cursor[u] = self.next[e as usize];
                }
                None => break,
            }
        }
        total
    }

    /// Saturate the network and return the max-flow value.
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = 0.0;
        while self.build_levels() {
            flow += self.blocking_flow();
        }
        flow
    }

    /// Nodes still reachable from the source in the residual graph, i.e. the
    /// source side of the minimum cut. Call after [`CutGraph::max_flow`].
    pub fn source_segment(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.nodes + 2];
        let source = self.source();
        reachable[source] = true;

        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e as usize] as usize;
                if self.capacity[e as usize] > EPSILON && !reachable[v] {
                    reachable[v] = true;
                    queue.push_back(v);
                }
                e = self.next[e as usize];
            }
        }
        reachable.truncate(self.nodes);
        reachable
    }
}
