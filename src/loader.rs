//! Mini-batch collation and iteration over pose graphs.
//!
//! A [`GraphBatch`] is the disjoint union of its graphs: node features are
//! stacked, edge indices are offset by each graph's first node, and a
//! per-node membership vector records which graph a node belongs to. This is
//! the `(node features, edge topology, batch grouping)` triple every
//! [`GraphClassifier`](crate::model::GraphClassifier) consumes.
//!
//! [`DataLoader`] yields batches in order, or shuffled with a ChaCha8 RNG
//! seeded from `seed + epoch` so every epoch sees a new but reproducible
//! order.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::graph::{PoseGraph, NODE_FEATURE_DIM};
use crate::split::CorpusView;

// ---------------------------------------------------------------------------
// GraphBatch
// ---------------------------------------------------------------------------

/// Several pose graphs collated into one disjoint graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatch {
    node_features: Array2<f32>,
    edge_index: Array2<usize>,
    batch: Array1<usize>,
    graph_ptr: Vec<usize>,
    labels: Array1<f32>,
}

impl GraphBatch {
    /// Collate `graphs` in the given order.
    pub fn collate(graphs: &[&PoseGraph]) -> Self {
        let total_nodes: usize = graphs.iter().map(|g| g.num_nodes()).sum();
        let total_edges: usize = graphs.iter().map(|g| g.num_directed_edges()).sum();

        let mut node_features = Array2::<f32>::zeros((total_nodes, NODE_FEATURE_DIM));
        let mut edge_index = Array2::<usize>::zeros((2, total_edges));
        let mut batch = Array1::<usize>::zeros(total_nodes);
        let mut graph_ptr = Vec::with_capacity(graphs.len() + 1);
        graph_ptr.push(0);

        let mut node_off = 0usize;
        let mut edge_off = 0usize;
        for (gi, g) in graphs.iter().enumerate() {
            let n = g.num_nodes();
            node_features
                .slice_mut(ndarray::s![node_off..node_off + n, ..])
                .assign(g.node_features());
            batch.slice_mut(ndarray::s![node_off..node_off + n]).fill(gi);
            for (src, dst) in g.directed_edges() {
                edge_index[[0, edge_off]] = src + node_off;
                edge_index[[1, edge_off]] = dst + node_off;
                edge_off += 1;
            }
            node_off += n;
            graph_ptr.push(node_off);
        }

        let labels = graphs.iter().map(|g| g.label()).collect();
        GraphBatch { node_features, edge_index, batch, graph_ptr, labels }
    }

    /// Stacked node features `[total_nodes, 3]`.
    pub fn node_features(&self) -> ArrayView2<'_, f32> {
        self.node_features.view()
    }

    /// Offset directed edge index `[2, total_edges]`.
    pub fn edge_index(&self) -> ArrayView2<'_, usize> {
        self.edge_index.view()
    }

    /// Graph index of every node.
    pub fn batch(&self) -> ArrayView1<'_, usize> {
        self.batch.view()
    }

    /// Node range of graph `g` is `graph_ptr[g]..graph_ptr[g + 1]`.
    pub fn graph_ptr(&self) -> &[usize] {
        &self.graph_ptr
    }

    /// Labels, one per graph.
    pub fn labels(&self) -> ArrayView1<'_, f32> {
        self.labels.view()
    }

    /// Number of graphs.
    pub fn num_graphs(&self) -> usize {
        self.labels.len()
    }

    /// Total number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    /// Total number of directed edges.
    pub fn num_edges(&self) -> usize {
        self.edge_index.ncols()
    }

    /// `true` when the batch holds no graphs.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DataLoader
// ---------------------------------------------------------------------------

/// Batched, optionally shuffled iterator over a [`CorpusView`].
///
/// Given the same `seed`, epoch number and view, the batch order is always
/// identical.
#[derive(Debug, Clone)]
pub struct DataLoader<'v, 'a> {
    view: &'v CorpusView<'a>,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl<'v, 'a> DataLoader<'v, 'a> {
    /// Create a loader. A `batch_size` of zero is treated as one.
    pub fn new(view: &'v CorpusView<'a>, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        DataLoader { view, batch_size: batch_size.max(1), shuffle, seed }
    }

    /// Number of batches per epoch (the last one may be partial).
    pub fn num_batches(&self) -> usize {
        (self.view.len() + self.batch_size - 1) / self.batch_size
    }

    /// Number of samples per epoch.
    pub fn num_samples(&self) -> usize {
        self.view.len()
    }

    /// Sample order for `epoch`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.view.len()).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Batches of `epoch`.
    pub fn iter_epoch(&self, epoch: usize) -> DataLoaderIter<'v, 'a> {
        DataLoaderIter {
            view: self.view,
            order: self.epoch_order(epoch),
            batch_size: self.batch_size,
            cursor: 0,
        }
    }

    /// Batches in view order, ignoring `shuffle`.
    pub fn iter_ordered(&self) -> DataLoaderIter<'v, 'a> {
        DataLoaderIter {
            view: self.view,
            order: (0..self.view.len()).collect(),
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

/// Iterator returned by [`DataLoader::iter_epoch`].
pub struct DataLoaderIter<'v, 'a> {
    view: &'v CorpusView<'a>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'v, 'a> Iterator for DataLoaderIter<'v, 'a> {
    type Item = GraphBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let graphs: Vec<&PoseGraph> =
            self.order[self.cursor..end].iter().filter_map(|&i| self.view.get(i)).collect();
        self.cursor = end;
        Some(GraphBatch::collate(&graphs))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.order.len().saturating_sub(self.cursor);
        let n = (left + self.batch_size - 1) / self.batch_size;
        (n, Some(n))
    }
}

impl<'v, 'a> ExactSizeIterator for DataLoaderIter<'v, 'a> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PoseGraphBuilder;
    use crate::keypoints::{ClassLabel, KeypointArray};

    fn graphs(n: usize) -> Vec<PoseGraph> {
        let b = PoseGraphBuilder::coco().normalize(false);
        (0..n)
            .map(|i| {
                let kp = KeypointArray::from_triples(
                    &(0..17).map(|j| [i as f32, j as f32, 1.0]).collect::<Vec<_>>(),
                );
                let label = if i % 2 == 0 { ClassLabel::Violent } else { ClassLabel::NonViolent };
                b.build(&kp, label).unwrap()
            })
            .collect()
    }

    #[test]
    fn collate_offsets_edges() {
        let gs = graphs(3);
        let refs: Vec<&PoseGraph> = gs.iter().collect();
        let b = GraphBatch::collate(&refs);
        assert_eq!(b.num_graphs(), 3);
        assert_eq!(b.num_nodes(), 51);
        assert_eq!(b.num_edges(), 114);
        assert_eq!(b.graph_ptr(), &[0, 17, 34, 51]);
        assert_eq!(b.batch()[17], 1);
        assert_eq!(b.batch()[50], 2);
        // Every edge stays inside its own graph.
        for e in 0..b.num_edges() {
            let (s, d) = (b.edge_index()[[0, e]], b.edge_index()[[1, e]]);
            assert_eq!(b.batch()[s], b.batch()[d]);
        }
        assert_eq!(b.labels().to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(b.node_features()[[17, 0]], 1.0);
    }

    #[test]
    fn loader_covers_every_sample_once() {
        let gs = graphs(10);
        let view = CorpusView::new(gs.iter().collect());
        let loader = DataLoader::new(&view, 4, true, 42);
        assert_eq!(loader.num_batches(), 3);
        let sizes: Vec<usize> = loader.iter_epoch(0).map(|b| b.num_graphs()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let mut order = loader.epoch_order(0);
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_is_seeded_per_epoch() {
        let gs = graphs(20);
        let view = CorpusView::new(gs.iter().collect());
        let loader = DataLoader::new(&view, 8, true, 3);
        assert_eq!(loader.epoch_order(1), loader.epoch_order(1));
        assert_ne!(loader.epoch_order(1), loader.epoch_order(2));

        let ordered = DataLoader::new(&view, 8, false, 3);
        assert_eq!(ordered.epoch_order(5), (0..20).collect::<Vec<_>>());
    }
}
