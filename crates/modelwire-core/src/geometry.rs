//! Frame and edge geometry kept consistent after view changes.
//!
//! Every write goes through [`Graph::set_property`] so the adjustments are
//! part of the caller's undo unit.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::graph::{Graph, HostError, Point, Target, View};
use crate::kind::ViewKind;

pub const DEFAULT_MARGIN: f64 = 30.0;

/// Derived axis-aligned box of a view; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2.0,
            y: (self.top + self.bottom) / 2.0,
        }
    }
}

/// Box of a view: its position and size when non-degenerate, else the
/// extent of its points, else its raw position.
pub fn bounds(view: &View) -> Bounds {
    if view.width > 0.0 || view.height > 0.0 {
        return Bounds {
            left: view.left,
            top: view.top,
            right: view.left + view.width,
            bottom: view.top + view.height,
        };
    }
    if let Some(first) = view.points.first() {
        let mut b = Bounds {
            left: first.x,
            top: first.y,
            right: first.x,
            bottom: first.y,
        };
        for p in &view.points[1..] {
            b.left = b.left.min(p.x);
            b.top = b.top.min(p.y);
            b.right = b.right.max(p.x);
            b.bottom = b.bottom.max(p.y);
        }
        return b;
    }
    Bounds {
        left: view.left,
        top: view.top,
        right: view.left,
        bottom: view.top,
    }
}

fn frame(graph: &Graph, diagram: &str) -> Result<View, HostError> {
    graph
        .frame_of(diagram)
        .cloned()
        .ok_or_else(|| HostError::missing("Diagram", diagram))
}

fn content(graph: &Graph, diagram: &str) -> Vec<(ViewKind, Bounds)> {
    graph
        .views_on(diagram)
        .into_iter()
        .filter(|v| !v.kind.is_frame())
        .map(|v| (v.kind, bounds(v)))
        .collect()
}

fn set_number(graph: &mut Graph, view: &str, field: &str, value: f64) -> Result<(), HostError> {
    graph.set_property(Target::View(view), field, Value::from(value))
}

fn lanes(graph: &Graph, diagram: &str) -> Vec<String> {
    graph
        .views_on(diagram)
        .into_iter()
        .filter(|v| v.kind.is_frame_tracking())
        .map(|v| v.id.clone())
        .collect()
}

/// Grow the frame so every view plus `margin` fits; never shrinks. Lanes are
/// left out of the horizontal extent and then resized to the frame width.
pub fn auto_expand_frame(graph: &mut Graph, diagram: &str, margin: f64) -> Result<Bounds, HostError> {
    let frame = frame(graph, diagram)?;
    let content = content(graph, diagram);
    let max_right = content
        .iter()
        .filter(|(kind, _)| !kind.is_frame_tracking())
        .map(|(_, b)| b.right)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_bottom = content
        .iter()
        .map(|(_, b)| b.bottom)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut width = frame.width;
    let mut height = frame.height;
    if max_right.is_finite() && max_right + margin > frame.left + frame.width {
        width = max_right + margin - frame.left;
    }
    if max_bottom.is_finite() && max_bottom + margin > frame.top + frame.height {
        height = max_bottom + margin - frame.top;
    }

    let lanes = lanes(graph, diagram);
    graph.batch(|g| {
        set_number(g, &frame.id, "width", width)?;
        set_number(g, &frame.id, "height", height)?;
        for lane in &lanes {
            set_number(g, lane, "width", width)?;
        }
        Ok::<_, HostError>(())
    })?;
    debug!(diagram, width, height, "frame expanded");
    Ok(Bounds {
        left: frame.left,
        top: frame.top,
        right: frame.left + width,
        bottom: frame.top + height,
    })
}

/// Fit the frame around all content after a layout pass. The frame only
/// moves up/left; lanes take the frame's left and width.
pub fn fit_frame_to_views(graph: &mut Graph, diagram: &str, margin: f64) -> Result<Bounds, HostError> {
    let frame = frame(graph, diagram)?;
    let content = content(graph, diagram);

    let (mut left, mut top) = (frame.left, frame.top);
    let (mut width, mut height) = (frame.width, frame.height);

    let horizontal: Vec<&Bounds> = content
        .iter()
        .filter(|(kind, _)| !kind.is_frame_tracking())
        .map(|(_, b)| b)
        .collect();
    if !content.is_empty() {
        let min_top = content.iter().map(|(_, b)| b.top).fold(f64::INFINITY, f64::min);
        let max_bottom = content
            .iter()
            .map(|(_, b)| b.bottom)
            .fold(f64::NEG_INFINITY, f64::max);
        top = top.min(min_top - margin);
        height = height.max(max_bottom + margin - top);
    }
    if !horizontal.is_empty() {
        let min_left = horizontal.iter().map(|b| b.left).fold(f64::INFINITY, f64::min);
        let max_right = horizontal
            .iter()
            .map(|b| b.right)
            .fold(f64::NEG_INFINITY, f64::max);
        left = left.min(min_left - margin);
        width = width.max(max_right + margin - left);
    }

    let lanes = lanes(graph, diagram);
    graph.batch(|g| {
        set_number(g, &frame.id, "left", left)?;
        set_number(g, &frame.id, "top", top)?;
        set_number(g, &frame.id, "width", width)?;
        set_number(g, &frame.id, "height", height)?;
        for lane in &lanes {
            set_number(g, lane, "left", left)?;
            set_number(g, lane, "width", width)?;
        }
        Ok::<_, HostError>(())
    })?;
    Ok(Bounds {
        left,
        top,
        right: left + width,
        bottom: top + height,
    })
}

/// Replace an edge's path with the two centers of its endpoint views.
///
/// The new state is computed on a copy, diffed field by field and replayed
/// as one undoable unit.
pub fn clear_edge_waypoints(graph: &mut Graph, edge: &str) -> Result<(), HostError> {
    let current = graph
        .view(edge)
        .cloned()
        .ok_or_else(|| HostError::missing("View", edge))?;
    if !current.kind.is_edge() {
        return Err(HostError::InvalidValue {
            field: "viewId".to_string(),
            reason: format!("{} is not an edge view", edge),
        });
    }
    let endpoint = |id: &Option<String>, end: &str| -> Result<Point, HostError> {
        let id = id.as_deref().ok_or_else(|| HostError::InvalidValue {
            field: end.to_string(),
            reason: format!("edge {} has no {} view", edge, end),
        })?;
        let view = graph.view(id).ok_or_else(|| HostError::missing("View", id))?;
        Ok(bounds(view).center())
    };
    let tail = endpoint(&current.tail, "tail")?;
    let head = endpoint(&current.head, "head")?;

    let mut next = current.clone();
    next.points = vec![tail, head];
    next.left = tail.x.min(head.x);
    next.top = tail.y.min(head.y);
    next.width = (tail.x - head.x).abs();
    next.height = (tail.y - head.y).abs();

    let diffs: Vec<(&str, Value)> = ["points", "left", "top", "width", "height"]
        .into_iter()
        .filter(|field| current.field(field) != next.field(field))
        .map(|field| (field, next.field(field)))
        .collect();
    graph.batch(|g| {
        for (field, value) in diffs {
            g.set_property(Target::View(edge), field, value)?;
        }
        Ok::<_, HostError>(())
    })
}

/// Re-route every edge attached to `view`. Returns how many were re-routed.
pub fn reroute_edges_of(graph: &mut Graph, view: &str) -> Result<usize, HostError> {
    let edges: Vec<String> = graph
        .views()
        .iter()
        .filter(|v| v.kind.is_edge())
        .filter(|v| v.tail.as_deref() == Some(view) || v.head.as_deref() == Some(view))
        .map(|v| v.id.clone())
        .collect();
    for edge in &edges {
        clear_edge_waypoints(graph, edge)?;
    }
    Ok(edges.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Placement, Rect};
    use crate::kind::ElementKind;
    use float_cmp::assert_approx_eq;
    use serde_json::{json, Map};

    fn rect(left: f64, top: f64, width: f64, height: f64) -> Rect {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    fn diagram(graph: &mut Graph, kind: ElementKind, frame: Rect) -> String {
        let model = graph.root_model().unwrap().id.clone();
        graph.create_diagram(kind, &model, None, frame).unwrap()
    }

    fn node(graph: &mut Graph, diagram: &str, at: Rect) -> String {
        graph
            .create_model_and_view(ElementKind::Class, diagram, diagram, Placement::at(at), &Map::new())
            .unwrap()
            .1
    }

    #[test]
    fn bounds_prefers_box_then_points() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::ClassDiagram, rect(0.0, 0.0, 400.0, 400.0));
        let a = node(&mut graph, &d, rect(10.0, 20.0, 30.0, 40.0));
        let b = bounds(graph.view(&a).unwrap());
        assert_approx_eq!(f64, b.right, 40.0);
        assert_approx_eq!(f64, b.bottom, 60.0);

        let mut edge = graph.view(&a).unwrap().clone();
        edge.width = 0.0;
        edge.height = 0.0;
        edge.points = vec![Point { x: 5.0, y: 90.0 }, Point { x: 50.0, y: 15.0 }];
        let b = bounds(&edge);
        assert_eq!((b.left, b.top, b.right, b.bottom), (5.0, 15.0, 50.0, 90.0));

        edge.points.clear();
        let b = bounds(&edge);
        assert_eq!((b.left, b.right), (10.0, 10.0));
    }

    #[test]
    fn expand_grows_to_content_plus_margin() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::ClassDiagram, rect(0.0, 0.0, 400.0, 400.0));
        node(&mut graph, &d, rect(500.0, 500.0, 0.0, 0.0));
        node(&mut graph, &d, rect(700.0, 700.0, 0.0, 0.0));
        let b = auto_expand_frame(&mut graph, &d, DEFAULT_MARGIN).unwrap();
        assert_approx_eq!(f64, b.right, 730.0);
        assert_approx_eq!(f64, b.bottom, 730.0);
        assert_eq!((b.left, b.top), (0.0, 0.0));
    }

    #[test]
    fn expand_never_shrinks() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::ClassDiagram, rect(0.0, 0.0, 1000.0, 900.0));
        node(&mut graph, &d, rect(10.0, 10.0, 50.0, 50.0));
        let b = auto_expand_frame(&mut graph, &d, DEFAULT_MARGIN).unwrap();
        assert_eq!((b.width(), b.height()), (1000.0, 900.0));
    }

    #[test]
    fn lanes_follow_frame_width_but_do_not_drive_it() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::TimingDiagram, rect(0.0, 0.0, 400.0, 300.0));
        let (_, lane) = graph
            .create_model_and_view(
                ElementKind::TimingLifeline,
                &d,
                &d,
                Placement::at(rect(0.0, 250.0, 2000.0, 100.0)),
                &Map::new(),
            )
            .unwrap();
        let b = auto_expand_frame(&mut graph, &d, DEFAULT_MARGIN).unwrap();
        assert_approx_eq!(f64, b.width(), 400.0);
        assert_approx_eq!(f64, b.height(), 380.0);
        assert_approx_eq!(f64, graph.view(&lane).unwrap().width, 400.0);
    }

    #[test]
    fn fit_moves_frame_up_left_and_aligns_lanes() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::TimingDiagram, rect(0.0, 0.0, 100.0, 100.0));
        let (_, lane) = graph
            .create_model_and_view(
                ElementKind::TimingLifeline,
                &d,
                &d,
                Placement::at(rect(-50.0, 10.0, 100.0, 100.0)),
                &Map::new(),
            )
            .unwrap();
        let first = fit_frame_to_views(&mut graph, &d, DEFAULT_MARGIN).unwrap();
        assert_approx_eq!(f64, first.top, -20.0);
        assert_approx_eq!(f64, first.left, 0.0);
        let lane = graph.view(&lane).unwrap();
        assert_approx_eq!(f64, lane.left, first.left);
        assert_approx_eq!(f64, lane.width, first.width());
        let second = fit_frame_to_views(&mut graph, &d, DEFAULT_MARGIN).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn waypoints_collapse_to_endpoint_centers_in_one_undo() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::ClassDiagram, rect(0.0, 0.0, 400.0, 400.0));
        let a = node(&mut graph, &d, rect(0.0, 0.0, 100.0, 100.0));
        let b = node(&mut graph, &d, rect(200.0, 300.0, 100.0, 100.0));
        let (_, edge) = graph
            .create_model_and_view(ElementKind::Dependency, &d, &d, Placement::between(&a, &b), &Map::new())
            .unwrap();
        graph
            .set_property(Target::View(&edge), "points", json!([{"x": 1, "y": 1}, {"x": 9, "y": 9}, {"x": 3, "y": 3}]))
            .unwrap();

        clear_edge_waypoints(&mut graph, &edge).unwrap();
        let view = graph.view(&edge).unwrap();
        assert_eq!(view.points, vec![Point { x: 50.0, y: 50.0 }, Point { x: 250.0, y: 350.0 }]);
        assert_approx_eq!(f64, view.width, 200.0);

        assert!(graph.undo());
        assert_eq!(graph.view(&edge).unwrap().points.len(), 3);
    }

    #[test]
    fn non_edges_are_rejected() {
        let mut graph = Graph::new();
        let d = diagram(&mut graph, ElementKind::ClassDiagram, rect(0.0, 0.0, 400.0, 400.0));
        let a = node(&mut graph, &d, rect(0.0, 0.0, 100.0, 100.0));
        assert!(matches!(
            clear_edge_waypoints(&mut graph, &a),
            Err(HostError::InvalidValue { .. })
        ));
    }
}
