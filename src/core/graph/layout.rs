//! Linear "visual steps" order for top-to-bottom rendering.
//!
//! This is a geometric approximation of topological order, not a traversal of
//! the edges: it assumes the editor lays sequential steps out with increasing
//! Y. Branches that loop back upward will be placed by their coordinates and
//! can appear before the steps that feed them.

use super::{GraphModel, Node};

/// Nodes whose Y differs from the first node of a row by less than this share the row.
pub const ROW_TOLERANCE: f64 = 50.0;

/// Order the non-placeholder nodes by row (Y) and, within a row, by X.
///
/// Nodes without a position keep their declaration order and follow the
/// positioned ones.
pub fn visual_steps(graph: &GraphModel) -> Vec<&Node> {
    let (mut positioned, unpositioned): (Vec<&Node>, Vec<&Node>) = graph
        .nodes()
        .iter()
        .filter(|node| !node.is_placeholder())
        .partition(|node| node.position.is_some());

    positioned.sort_by(|a, b| y_of(a).total_cmp(&y_of(b)));

    let mut ordered = Vec::with_capacity(positioned.len() + unpositioned.len());
    let mut row: Vec<&Node> = Vec::new();
    let mut row_anchor = f64::NEG_INFINITY;
    for node in positioned {
        let y = y_of(node);
        if !row.is_empty() && y - row_anchor >= ROW_TOLERANCE {
            flush_row(&mut row, &mut ordered);
        }
        if row.is_empty() {
            row_anchor = y;
        }
        row.push(node);
    }
    flush_row(&mut row, &mut ordered);

    ordered.extend(unpositioned);
    ordered
}

fn flush_row<'a>(row: &mut Vec<&'a Node>, ordered: &mut Vec<&'a Node>) {
    row.sort_by(|a, b| x_of(a).total_cmp(&x_of(b)));
    ordered.append(row);
}

fn y_of(node: &Node) -> f64 {
    node.position.map(|p| p.y).unwrap_or(f64::MAX)
}

fn x_of(node: &Node) -> f64 {
    node.position.map(|p| p.x).unwrap_or(f64::MAX)
}
