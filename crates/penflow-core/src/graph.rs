//! Connectivity derived from connector anchors.
//!
//! A connector leaves the node bound to its first anchor and enters the
//! node bound to its last anchor. Nothing is stored: every query scans the
//! store.

use crate::pen::PenId;
use crate::store::PenStore;

/// Which connectors of a node to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFilter {
    #[default]
    All,
    In,
    Out,
}

/// Connectors touching `node`, in paint order. Empty for connectors and
/// unknown ids.
pub fn get_lines(store: &PenStore, node: &str, filter: LineFilter) -> Vec<PenId> {
    match store.get(node) {
        Some(pen) if !pen.is_line() => {}
        _ => return Vec::new(),
    }
    store
        .iter()
        .filter(|p| p.is_line())
        .filter(|line| {
            let incoming = line.target() == Some(node);
            let outgoing = line.source() == Some(node);
            match filter {
                LineFilter::All => incoming || outgoing,
                LineFilter::In => incoming,
                LineFilter::Out => outgoing,
            }
        })
        .map(|line| line.id.clone())
        .collect()
}

/// Pens entered next: for a connector the pens bound to its last anchor,
/// for a node the union over its outgoing connectors. Deduplicated.
pub fn next_node(store: &PenStore, id: &str) -> Vec<PenId> {
    neighbours(store, id, Direction::Forward)
}

/// Mirror of [`next_node`].
pub fn previous_node(store: &PenStore, id: &str) -> Vec<PenId> {
    neighbours(store, id, Direction::Backward)
}

/// Every node reachable forward from `id`, excluding `id` itself unless a
/// cycle leads back to it. Terminates on cyclic graphs.
pub fn downstream_nodes(store: &PenStore, id: &str) -> Vec<PenId> {
    reachable(store, id, Direction::Forward)
}

/// Every node reachable backward from `id`.
pub fn upstream_nodes(store: &PenStore, id: &str) -> Vec<PenId> {
    reachable(store, id, Direction::Backward)
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

fn neighbours(store: &PenStore, id: &str, dir: Direction) -> Vec<PenId> {
    let Some(pen) = store.get(id) else {
        return Vec::new();
    };
    let lines = if pen.is_line() {
        vec![pen.id.clone()]
    } else {
        let filter = match dir {
            Direction::Forward => LineFilter::Out,
            Direction::Backward => LineFilter::In,
        };
        get_lines(store, id, filter)
    };

    let mut out: Vec<PenId> = Vec::new();
    for line in lines.iter().filter_map(|l| store.get(l)) {
        let end = match dir {
            Direction::Forward => line.target(),
            Direction::Backward => line.source(),
        };
        let Some(end) = end else {
            continue;
        };
        for found in store.find(end) {
            if !out.contains(&found) {
                out.push(found);
            }
        }
    }
    out
}

fn reachable(store: &PenStore, start: &str, dir: Direction) -> Vec<PenId> {
    let mut visited: Vec<PenId> = Vec::new();
    let mut queue: Vec<PenId> = neighbours(store, start, dir);
    queue.reverse();
    while let Some(node) = queue.pop() {
        if visited.contains(&node) {
            continue;
        }
        let mut next = neighbours(store, &node, dir);
        next.reverse();
        queue.extend(next.into_iter().filter(|n| !visited.contains(n)));
        visited.push(node);
    }
    log::debug!("Traversal from {} reached {} node(s)", start, visited.len());
    visited
}
