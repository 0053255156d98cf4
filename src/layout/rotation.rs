use std::collections::BTreeMap;

use serde::Serialize;

use crate::graph::{EdgeId, Graph, NodeId, NodeKind};

const ALIGN_EPS: f32 = 0.5;

/// Routed polyline of one edge: straight when the endpoints align on an
/// axis, otherwise a single elbow leaving the first node along its cell
/// axis before running level.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeRoute {
    pub edge: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub points: Vec<(f32, f32)>,
}

pub(super) fn route_edges(graph: &Graph) -> Vec<EdgeRoute> {
    let mut routes = Vec::new();
    for edge_id in graph.edge_ids() {
        let edge = graph.edge(edge_id);
        let [a, b] = edge.nodes;
        let (Some(ax), Some(ay)) = (graph.node(a).x_coord(), graph.node(a).y_coord()) else {
            continue;
        };
        let (Some(bx), Some(by)) = (graph.node(b).x_coord(), graph.node(b).y_coord()) else {
            continue;
        };
        let mut points = vec![(ax, ay)];
        if (ax - bx).abs() > ALIGN_EPS && (ay - by).abs() > ALIGN_EPS {
            points.push((ax, by));
        }
        points.push((bx, by));
        routes.push(EdgeRoute {
            edge: edge_id,
            from: a,
            to: b,
            points,
        });
    }
    routes
}

/// Rotation heuristic for 2- and 3-winding junction nodes: compare the
/// penultimate point of each branch path, in incident-edge (electrical)
/// order. Three branches whose outer points sit level in y pick 0 or 180
/// degrees from the middle branch's relative y; outer points aligned in x
/// pick 90 or 270 from the relative x. Two branches use the transposed
/// rule.
pub(super) fn assign_rotations(graph: &mut Graph, routes: &[EdgeRoute]) {
    let by_edge: BTreeMap<EdgeId, &EdgeRoute> = routes.iter().map(|r| (r.edge, r)).collect();
    for id in graph.node_ids().collect::<Vec<_>>() {
        let node = graph.node(id);
        if node.kind != NodeKind::Other {
            continue;
        }
        let branch_count = node.edges.len();
        if !(2..=3).contains(&branch_count) {
            continue;
        }
        let mut approach: Vec<(f32, f32)> = Vec::new();
        for edge in &node.edges {
            let Some(route) = by_edge.get(edge) else {
                break;
            };
            let point = if route.from == id {
                route.points[1]
            } else {
                route.points[route.points.len() - 2]
            };
            approach.push(point);
        }
        if approach.len() != branch_count {
            continue;
        }
        let angle = match approach.as_slice() {
            [p1, p2] => {
                if (p1.0 - p2.0).abs() <= ALIGN_EPS {
                    Some(if p1.1 < p2.1 { 0.0 } else { 180.0 })
                } else if (p1.1 - p2.1).abs() <= ALIGN_EPS {
                    Some(if p1.0 < p2.0 { 90.0 } else { 270.0 })
                } else {
                    None
                }
            }
            [p1, p2, p3] => {
                if (p1.1 - p3.1).abs() <= ALIGN_EPS {
                    Some(if p2.1 > p1.1 { 180.0 } else { 0.0 })
                } else if (p1.0 - p3.0).abs() <= ALIGN_EPS {
                    Some(if p2.0 > p1.0 { 90.0 } else { 270.0 })
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(angle) = angle {
            graph.node_mut(id).rotation_angle = Some(angle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(graph: &mut Graph, node: NodeId, x: f32, y: f32) {
        graph.node_mut(node).x.propose_priority(x);
        graph.node_mut(node).y.propose_priority(y);
    }

    #[test]
    fn three_winding_flips_when_middle_branch_is_below() {
        let mut graph = Graph::new();
        let m = graph.add_node("m", NodeKind::Other);
        let a = graph.add_node("a", NodeKind::Fictitious);
        let b = graph.add_node("b", NodeKind::Fictitious);
        let c = graph.add_node("c", NodeKind::Fictitious);
        graph.add_edge(m, a);
        graph.add_edge(m, b);
        graph.add_edge(m, c);
        pin(&mut graph, m, 100.0, 100.0);
        pin(&mut graph, a, 60.0, 60.0);
        pin(&mut graph, b, 100.0, 160.0);
        pin(&mut graph, c, 140.0, 60.0);
        let routes = route_edges(&graph);
        assign_rotations(&mut graph, &routes);
        // the outer branches elbow at y = 60, level with each other; the
        // middle branch approaches from y = 160, below them
        assert_eq!(graph.node(m).rotation_angle, Some(180.0));
    }

    #[test]
    fn two_winding_on_a_vertical_line_stays_upright() {
        let mut graph = Graph::new();
        let m = graph.add_node("m", NodeKind::Other);
        let a = graph.add_node("a", NodeKind::Fictitious);
        let b = graph.add_node("b", NodeKind::Fictitious);
        graph.add_edge(m, a);
        graph.add_edge(m, b);
        pin(&mut graph, m, 50.0, 100.0);
        pin(&mut graph, a, 50.0, 40.0);
        pin(&mut graph, b, 50.0, 160.0);
        let routes = route_edges(&graph);
        assign_rotations(&mut graph, &routes);
        assert_eq!(graph.node(m).rotation_angle, Some(0.0));
    }

    #[test]
    fn skewed_branches_leave_rotation_unset() {
        let mut graph = Graph::new();
        let m = graph.add_node("m", NodeKind::Other);
        let a = graph.add_node("a", NodeKind::Fictitious);
        let b = graph.add_node("b", NodeKind::Fictitious);
        // a->m elbows into m horizontally, m->b leaves it vertically, so
        // the two approach points align on neither axis
        graph.add_edge(a, m);
        graph.add_edge(m, b);
        pin(&mut graph, m, 50.0, 100.0);
        pin(&mut graph, a, 10.0, 40.0);
        pin(&mut graph, b, 90.0, 170.0);
        let routes = route_edges(&graph);
        assign_rotations(&mut graph, &routes);
        assert_eq!(graph.node(m).rotation_angle, None);
    }
}
