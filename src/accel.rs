//! BVH construction over a flat leaf array.
//!
//! Both the per-mesh and the per-scene BVH use the same layout: for `N`
//! leaves, `2N - 1` nodes and bounding boxes, leaves in the last `N` slots
//! (`[N - 1, 2N - 2]`), internal nodes in `[0, N - 2]` with the root at 0.

use crate::data_structures::{
    bbox::Bbox,
    kernel::{AccelNode, BboxRaw},
};

/// Number of nodes in a BVH over `leaf_count` leaves, `0` for no leaves.
pub fn node_count(leaf_count: usize) -> usize {
    (2 * leaf_count).saturating_sub(1)
}

/// Index of leaf `i` in a BVH over `leaf_count` leaves.
pub fn leaf_index(leaf_count: usize, i: usize) -> usize {
    leaf_count - 1 + i
}

/// Fold of the leaf boxes of a `2N - 1` bbox array.
pub fn merged_leaf_bbox(bboxes: &[BboxRaw], leaf_count: usize) -> Bbox {
    bboxes[leaf_count.saturating_sub(1)..node_count(leaf_count)]
        .iter()
        .fold(Bbox::EMPTY, |acc, raw| acc.merge(&Bbox::from_raw(raw)))
}

/**
 * Fills the internal nodes of a BVH.
 *
 * On entry `bboxes[N - 1 ..= 2N - 2]` hold the leaf boxes and `merged` is
 * their union. On return `nodes[0 ..= 2N - 2]` and `bboxes[0 ..= N - 2]`
 * are written; the leaf boxes are left untouched. `leaf_count` is at
 * least one.
 */
pub trait AccelBuilder {
    fn build(&self, nodes: &mut [AccelNode], bboxes: &mut [BboxRaw], merged: &Bbox, leaf_count: usize);
}

/// Top-down builder splitting at the median centroid along the widest axis.
#[derive(Clone, Copy, Debug, Default)]
pub struct MedianSplitBuilder;

impl AccelBuilder for MedianSplitBuilder {
    fn build(&self, nodes: &mut [AccelNode], bboxes: &mut [BboxRaw], merged: &Bbox, leaf_count: usize) {
        let n = leaf_count;
        assert!(n >= 1, "BVH build over zero leaves");
        let total = node_count(n);
        assert!(
            nodes.len() >= total && bboxes.len() >= total,
            "BVH arrays hold {} nodes and {} boxes, {} needed",
            nodes.len(),
            bboxes.len(),
            total
        );

        for i in 0..n {
            nodes[leaf_index(n, i)] = AccelNode::leaf(i as u32);
        }
        if n == 1 {
            return;
        }

        let centroids: Vec<_> = (0..n)
            .map(|i| Bbox::from_raw(&bboxes[leaf_index(n, i)]).centroid())
            .collect();
        let mut order: Vec<u32> = (0..n as u32).collect();

        struct Task {
            node: usize,
            start: usize,
            end: usize,
        }
        let mut next_internal = 1;
        let mut stack = vec![Task {
            node: 0,
            start: 0,
            end: n,
        }];
        while let Some(Task { node, start, end }) = stack.pop() {
            let range = &mut order[start..end];
            let axis = range
                .iter()
                .fold(Bbox::EMPTY, |acc, &i| acc.merge_point(centroids[i as usize]))
                .longest_axis();
            let mid = range.len() / 2;
            range.select_nth_unstable_by(mid, |&a, &b| {
                centroids[a as usize][axis].total_cmp(&centroids[b as usize][axis])
            });

            let mut child = |start: usize, end: usize| -> usize {
                if end - start == 1 {
                    leaf_index(n, order[start] as usize)
                } else {
                    let index = next_internal;
                    next_internal += 1;
                    stack.push(Task {
                        node: index,
                        start,
                        end,
                    });
                    index
                }
            };
            let left = child(start, start + mid);
            let right = child(start + mid, end);
            nodes[node] = AccelNode::internal(left as u32, right as u32);
        }
        debug_assert_eq!(next_internal, n - 1);

        // Children of an internal node always have a larger index than the node itself.
        for i in (0..n - 1).rev() {
            let AccelNode { left, right } = nodes[i];
            let bbox = Bbox::from_raw(&bboxes[left as usize]).merge(&Bbox::from_raw(&bboxes[right as usize]));
            bboxes[i] = bbox.to_raw();
        }
        bboxes[0] = merged.to_raw();
    }
}
