//! HNSW (Hierarchical Navigable Small World) index implementation
//!
//! Based on the paper "Efficient and robust approximate nearest neighbor search using
//! Hierarchical Navigable Small World graphs" by Malkov & Yashunin (2018).
//!
//! The HNSW algorithm creates a multi-layer graph structure where:
//! - Layer 0 contains all elements
//! - Higher layers contain exponentially fewer elements
//! - Each element has connections to its nearest neighbors at each layer
//! - Search starts at the top layer and zooms in to find nearest neighbors
//!
//! The graph stores only point positions; distances are computed through the
//! [`Space`] passed to each call, so the same graph code serves every point
//! encoding and both distance value types.
//!
//! # Parameters
//!
//! | name | when | default | meaning |
//! |------|------|---------|---------|
//! | `M` | build | 16 | links per node above layer 0 (2·M at layer 0) |
//! | `efConstruction` | build | 200 | candidate list size during insertion |
//! | `delaunay_type` | build | 1 | 0 = keep M closest, 1+ = diversity heuristic |
//! | `seed` | build | random | seed for level assignment |
//! | `ef` | query | 50 | candidate list size during search |

use super::{check_points, ensure_covered, Progress, SearchMethod};
use crate::config::{
    HNSW_DEFAULT_EF_CONSTRUCTION, HNSW_DEFAULT_EF_SEARCH, HNSW_DEFAULT_M, HNSW_MAX_M,
};
use crate::point::{Point, PointRef};
use crate::query::{KnnQueue, Neighbor};
use crate::space::{DistValue, Space};
use crate::{Params, Result, SimdexError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// Configuration for HNSW index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bidirectional links created for each element (except layer 0)
    /// Typical value: 16. Higher values increase recall but use more memory.
    pub m: usize,

    /// Number of bidirectional links created for each element in layer 0
    /// Typical value: 2 * m (32 for m=16)
    pub m0: usize,

    /// Size of the dynamic candidate list during construction
    pub ef_construction: usize,

    /// Size of the dynamic candidate list during search
    pub ef_search: usize,

    /// Normalization factor for level generation, 1 / ln(m)
    pub ml: f64,

    /// Use the heuristic neighbor selection algorithm (Algorithm 4 from paper)
    /// When true, selects diverse neighbors that aren't "behind" already-selected ones.
    pub use_heuristic: bool,

    /// When pruning, keep some pruned connections for better connectivity
    /// Only applies when use_heuristic is true.
    pub keep_pruned_connections: bool,

    /// Seed for level assignment; a fresh random seed when `None`
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        let m = HNSW_DEFAULT_M;
        Self {
            m,
            m0: m * 2,
            ef_construction: HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: HNSW_DEFAULT_EF_SEARCH,
            ml: 1.0 / (m as f64).ln(),
            use_heuristic: true,
            keep_pruned_connections: true,
            seed: None,
        }
    }
}

impl HnswConfig {
    /// Read build parameters, keeping the current `ef_search`.
    pub fn from_params(params: &Params, ef_search: usize) -> Result<Self> {
        let mut reader = params.reader();
        let m = reader.get_or("M", HNSW_DEFAULT_M)?;
        let ef_construction = reader.get_or("efConstruction", HNSW_DEFAULT_EF_CONSTRUCTION)?;
        let delaunay_type = reader.get_or::<u32>("delaunay_type", 1)?;
        let seed = reader.get_opt::<u64>("seed")?;
        reader.finish()?;

        if !(2..=HNSW_MAX_M).contains(&m) {
            return Err(SimdexError::InvalidParam(format!(
                "Parameter 'M' must be between 2 and {}, got {}",
                HNSW_MAX_M, m
            )));
        }
        if ef_construction == 0 {
            return Err(SimdexError::InvalidParam(
                "Parameter 'efConstruction' must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            seed,
            use_heuristic: delaunay_type > 0,
            ef_search,
            ..Self::default().with_m(m).with_ef_construction(ef_construction)
        })
    }

    /// Use simple nearest-neighbor selection (faster construction, lower recall)
    pub fn with_simple_selection(mut self) -> Self {
        self.use_heuristic = false;
        self
    }

    /// Set ef_search parameter
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set ef_construction parameter
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set M parameter (connections per node)
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self.m0 = m * 2;
        self.ml = 1.0 / (m as f64).ln();
        self
    }

    /// Fix the level-assignment seed for reproducible graphs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Internal node in the HNSW graph; node `i` is the point at position `i`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
    /// Connections at each layer: layer -> neighbor positions
    connections: Vec<Vec<usize>>,
}

/// Space and points a graph operation measures against
struct Graph<'a, D: DistValue> {
    space: &'a dyn Space<D>,
    points: &'a [Point],
}

impl<'a, D: DistValue> Graph<'a, D> {
    #[inline]
    fn to_query(&self, query: PointRef<'_>, node: usize) -> D {
        self.space.distance(query, self.points[node].view())
    }

    #[inline]
    fn between(&self, a: usize, b: usize) -> D {
        self.space.distance(self.points[a].view(), self.points[b].view())
    }
}

/// HNSW index for approximate similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    /// Configuration parameters
    config: HnswConfig,
    /// All nodes in the graph
    nodes: Vec<Node>,
    /// Entry point (node index with highest layer)
    entry_point: Option<usize>,
    /// Maximum layer in the graph
    max_layer: usize,
}

impl HnswIndex {
    /// Creates an empty HNSW index with the given configuration
    pub fn new(config: HnswConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            entry_point: None,
            max_layer: 0,
        }
    }

    /// Get the HNSW configuration
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Entry point node index, or None if the graph is empty
    pub fn entry_point(&self) -> Option<usize> {
        self.entry_point
    }

    /// Maximum layer in the graph
    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Build the graph over `points` with the current configuration.
    fn build<D: DistValue>(&mut self, graph: &Graph<'_, D>, progress: bool) {
        self.nodes = Vec::with_capacity(graph.points.len());
        self.entry_point = None;
        self.max_layer = 0;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut progress = Progress::new("hnsw", graph.points.len(), progress);

        for node_id in 0..graph.points.len() {
            let node_level = self.random_level(&mut rng);
            self.nodes.push(Node {
                connections: vec![Vec::new(); node_level + 1],
            });

            match self.entry_point {
                None => {
                    self.entry_point = Some(node_id);
                    self.max_layer = node_level;
                }
                Some(_) => {
                    self.insert_node(graph, node_id, node_level);
                    if node_level > self.max_layer {
                        self.max_layer = node_level;
                        self.entry_point = Some(node_id);
                    }
                }
            }

            progress.update(node_id + 1);
        }
    }

    /// Generates a random level for a new node using exponential decay
    fn random_level(&self, rng: &mut StdRng) -> usize {
        let uniform: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        (-uniform.ln() * self.config.ml).floor() as usize
    }

    /// Inserts a node into the graph structure
    fn insert_node<D: DistValue>(&mut self, graph: &Graph<'_, D>, node_id: usize, node_level: usize) {
        let Some(entry_point) = self.entry_point else {
            return;
        };
        let query = graph.points[node_id].view();
        let mut current_nearest = vec![entry_point];

        // Greedy descent from the top layer to the node's top layer + 1
        for layer in (node_level + 1..=self.max_layer).rev() {
            current_nearest = self.search_layer(graph, query, &current_nearest, 1, layer);
        }

        // Insert into layers from top to bottom
        for layer in (0..=node_level.min(self.max_layer)).rev() {
            current_nearest = self.search_layer(
                graph,
                query,
                &current_nearest,
                self.config.ef_construction,
                layer,
            );

            let m = self.max_links(layer);
            let neighbors = self.select_neighbors(graph, &current_nearest, query, m);

            for &neighbor_id in &neighbors {
                push_unique(&mut self.nodes[node_id].connections[layer], neighbor_id);

                // Only link back if the neighbor exists at this layer
                if layer < self.nodes[neighbor_id].connections.len() {
                    push_unique(&mut self.nodes[neighbor_id].connections[layer], node_id);

                    if self.nodes[neighbor_id].connections[layer].len() > m {
                        let candidates = self.nodes[neighbor_id].connections[layer].clone();
                        let pruned = self.select_neighbors(
                            graph,
                            &candidates,
                            graph.points[neighbor_id].view(),
                            m,
                        );
                        self.nodes[neighbor_id].connections[layer] = pruned;
                    }
                }
            }
        }
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m0
        } else {
            self.config.m
        }
    }

    /// Searches one layer and returns node ids sorted by distance (closest first)
    fn search_layer<D: DistValue>(
        &self,
        graph: &Graph<'_, D>,
        query: PointRef<'_>,
        entry_points: &[usize],
        ef: usize,
        layer: usize,
    ) -> Vec<usize> {
        self.search_layer_scored(graph, query, entry_points, ef, layer)
            .into_iter()
            .map(|(_, id)| id)
            .collect()
    }

    fn search_layer_scored<D: DistValue>(
        &self,
        graph: &Graph<'_, D>,
        query: PointRef<'_>,
        entry_points: &[usize],
        ef: usize,
        layer: usize,
    ) -> Vec<(D, usize)> {
        let mut visited = HashSet::new();
        let mut candidates = BinaryHeap::new(); // Min-heap by distance
        let mut best = BinaryHeap::new(); // Max-heap by distance

        for &ep in entry_points {
            if visited.insert(ep) {
                let dist = OrdDist(graph.to_query(query, ep));
                candidates.push(Reverse((dist, ep)));
                best.push((dist, ep));
            }
        }

        while let Some(Reverse((current_dist, current_id))) = candidates.pop() {
            // If current is farther than the ef-th nearest, we're done
            if best.len() >= ef {
                if let Some(&(furthest_dist, _)) = best.peek() {
                    if current_dist > furthest_dist {
                        break;
                    }
                }
            }

            let Some(neighbors) = self.nodes[current_id].connections.get(layer) else {
                continue;
            };

            for &neighbor_id in neighbors {
                if !visited.insert(neighbor_id) {
                    continue;
                }

                let dist = OrdDist(graph.to_query(query, neighbor_id));
                let improves = best.len() < ef
                    || best
                        .peek()
                        .map_or(true, |&(furthest_dist, _)| dist < furthest_dist);

                if improves {
                    candidates.push(Reverse((dist, neighbor_id)));
                    best.push((dist, neighbor_id));
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
            .into_iter()
            .map(|(OrdDist(dist), id)| (dist, id))
            .collect()
    }

    /// Selects M best neighbors
    ///
    /// When `use_heuristic` is enabled (default), uses Algorithm 4 from the HNSW paper
    /// which ensures diversity by only selecting candidates that are closer to the query
    /// than to any already-selected neighbor.
    fn select_neighbors<D: DistValue>(
        &self,
        graph: &Graph<'_, D>,
        candidates: &[usize],
        query: PointRef<'_>,
        m: usize,
    ) -> Vec<usize> {
        let mut scored: Vec<(OrdDist<D>, usize)> = candidates
            .iter()
            .map(|&id| (OrdDist(graph.to_query(query, id)), id))
            .collect();
        scored.sort();

        if !self.config.use_heuristic {
            return scored.into_iter().take(m).map(|(_, id)| id).collect();
        }

        let mut selected: Vec<usize> = Vec::with_capacity(m.min(candidates.len()));
        let mut pruned: Vec<usize> = Vec::new();

        for (OrdDist(dist_to_query), candidate_id) in scored {
            if selected.len() >= m {
                break;
            }

            // A candidate closer to an already selected neighbor than to the
            // query is "behind" that neighbor
            let is_good = selected
                .iter()
                .all(|&selected_id| graph.between(candidate_id, selected_id) >= dist_to_query);

            if is_good {
                selected.push(candidate_id);
            } else {
                pruned.push(candidate_id);
            }
        }

        if self.config.keep_pruned_connections {
            for pruned_id in pruned {
                if selected.len() >= m {
                    break;
                }
                selected.push(pruned_id);
            }
        }

        selected
    }

    /// Layer-0 candidates for `query`, closest first.
    fn search<D: DistValue>(
        &self,
        graph: &Graph<'_, D>,
        query: PointRef<'_>,
        ef: usize,
    ) -> Vec<(D, usize)> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };

        let mut current_nearest = vec![entry_point];
        for layer in (1..=self.max_layer).rev() {
            current_nearest = self.search_layer(graph, query, &current_nearest, 1, layer);
        }

        self.search_layer_scored(graph, query, &current_nearest, ef, 0)
    }
}

impl<D: DistValue> SearchMethod<D> for HnswIndex {
    fn name(&self) -> &'static str {
        "hnsw"
    }

    fn create_index(
        &mut self,
        space: &dyn Space<D>,
        points: &[Point],
        params: &Params,
        progress: bool,
    ) -> Result<()> {
        self.config = HnswConfig::from_params(params, self.config.ef_search)?;
        check_points(space, points)?;

        let started = Instant::now();
        self.build(&Graph { space, points }, progress);

        tracing::debug!(
            points = points.len(),
            max_layer = self.max_layer,
            m = self.config.m,
            ef_construction = self.config.ef_construction,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HNSW graph built"
        );
        Ok(())
    }

    fn set_query_params(&mut self, params: &Params) -> Result<()> {
        let mut reader = params.reader();
        let ef = reader.get_or("ef", HNSW_DEFAULT_EF_SEARCH)?;
        reader.finish()?;

        if ef == 0 {
            return Err(SimdexError::InvalidParam(
                "Parameter 'ef' must be greater than 0".to_string(),
            ));
        }
        self.config.ef_search = ef;
        Ok(())
    }

    fn knn(
        &self,
        space: &dyn Space<D>,
        points: &[Point],
        query: PointRef<'_>,
        k: usize,
    ) -> Result<KnnQueue<D>> {
        ensure_covered(self.nodes.len(), points.len())?;

        let mut queue = KnnQueue::new(k);
        if k == 0 {
            return Ok(queue);
        }

        let ef = self.config.ef_search.max(k);
        for (distance, position) in self.search(&Graph { space, points }, query, ef) {
            queue.push(distance, position, points[position].id);
        }
        Ok(queue)
    }

    /// Approximate: only layer-0 candidates found with `ef` are considered.
    fn range(
        &self,
        space: &dyn Space<D>,
        points: &[Point],
        query: PointRef<'_>,
        radius: D,
    ) -> Result<Vec<Neighbor<D>>> {
        ensure_covered(self.nodes.len(), points.len())?;

        Ok(self
            .search(&Graph { space, points }, query, self.config.ef_search)
            .into_iter()
            .take_while(|(distance, _)| *distance <= radius)
            .map(|(distance, position)| Neighbor {
                id: points[position].id,
                position,
                distance,
            })
            .collect())
    }

    fn indexed_count(&self) -> usize {
        self.nodes.len()
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        let loaded: HnswIndex = bincode::deserialize(bytes)?;

        let valid = loaded.entry_point.map_or(loaded.nodes.is_empty(), |ep| ep < loaded.nodes.len())
            && loaded
                .nodes
                .iter()
                .flat_map(|node| node.connections.iter().flatten())
                .all(|&neighbor| neighbor < loaded.nodes.len());
        if !valid {
            return Err(SimdexError::StorageError(
                "HNSW graph references nodes that do not exist".to_string(),
            ));
        }

        *self = loaded;
        Ok(())
    }

    fn memory_usage(&self) -> usize {
        let links: usize = self
            .nodes
            .iter()
            .map(|node| {
                std::mem::size_of::<Node>()
                    + node
                        .connections
                        .iter()
                        .map(|layer| {
                            std::mem::size_of::<Vec<usize>>()
                                + layer.capacity() * std::mem::size_of::<usize>()
                        })
                        .sum::<usize>()
            })
            .sum();
        std::mem::size_of::<Self>() + links
    }
}

fn push_unique(links: &mut Vec<usize>, id: usize) {
    if !links.contains(&id) {
        links.push(id);
    }
}

/// Wrapper for distances that implements Ord for use in BinaryHeap
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrdDist<D>(D);

impl<D: DistValue> Eq for OrdDist<D> {}

impl<D: DistValue> PartialOrd for OrdDist<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D: DistValue> Ord for OrdDist<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}
