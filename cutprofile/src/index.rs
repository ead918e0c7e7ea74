use geo::geometry::Rect;
use rstar::{
    primitives::{GeomWithData, Rectangle},
    RTree, AABB,
};
use std::ops::ControlFlow;

type Entry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Bounding box index mapping envelopes to item indices.
#[derive(Debug, Clone)]
pub struct EnvelopeIndex {
    tree: RTree<Entry>,
}

impl EnvelopeIndex {
    pub fn bulk_load(items: impl IntoIterator<Item = (Rect<f64>, usize)>) -> Self {
        let entries = items
            .into_iter()
            .map(|(rect, item)| {
                let (min, max) = (rect.min(), rect.max());
                GeomWithData::new(Rectangle::from_corners([min.x, min.y], [max.x, max.y]), item)
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Items whose envelope intersects `rect`, in ascending order.
    ///
    /// Sorting keeps query results independent of the tree layout.
    pub fn query(&self, rect: Rect<f64>) -> Vec<usize> {
        let (min, max) = (rect.min(), rect.max());
        let envelope = AABB::from_corners([min.x, min.y], [max.x, max.y]);
        let mut items: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect();
        items.sort_unstable();
        items.dedup();
        items
    }

    /// Feeds every item intersecting `rect` to `visitor` until it
    /// breaks.
    pub fn visit<B>(
        &self,
        rect: Rect<f64>,
        mut visitor: impl FnMut(usize) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        for item in self.query(rect) {
            if let ControlFlow::Break(b) = visitor(item) {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }
}
