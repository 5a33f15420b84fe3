//! Bounded A* search over the occupancy grid.
//!
//! 8-connected, Manhattan heuristic, Euclidean step cost. Neighbours
//! expand in a fixed order (E, N, W, S, NE, NW, SW, SE) and f-cost ties
//! break by insertion sequence, so identical inputs always produce the
//! identical path. The expansion count is hard-capped: hitting the cap is
//! a search failure, never a blown tick budget.

use crate::grid::GridMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use types::Point;

/// Fixed neighbour order: cardinals first, then diagonals.
const NEIGHBOURS: [(i64, i64); 8] = [
    (1, 0),
    (0, 1),
    (-1, 0),
    (0, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
    (1, -1),
];

struct HeapEntry {
    f_cost: f64,
    seq: u64,
    cell: (usize, usize),
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_cost == other.f_cost && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lowest f wins, then earliest insertion
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a path from `start` to `goal`. Returns the world-coordinate
/// waypoints including both endpoints, or None when no route exists,
/// either endpoint is blocked, or the node limit is reached.
pub fn find_path(
    grid: &GridMap,
    start: &Point,
    goal: &Point,
    max_nodes: usize,
) -> Option<Vec<Point>> {
    let start_cell = grid.world_to_cell(start)?;
    let goal_cell = grid.world_to_cell(goal)?;
    if !grid.is_free_cell(start_cell.0, start_cell.1)
        || !grid.is_free_cell(goal_cell.0, goal_cell.1)
    {
        return None;
    }

    let width = grid.width();
    let height = grid.height();
    let res = grid.resolution();
    let index = |c: (usize, usize)| c.1 * width + c.0;

    let manhattan = |c: (usize, usize)| -> f64 {
        let dx = (c.0 as i64 - goal_cell.0 as i64).abs() as f64;
        let dy = (c.1 as i64 - goal_cell.1 as i64).abs() as f64;
        (dx + dy) * res
    };

    let mut g_cost = vec![f64::INFINITY; width * height];
    let mut parent: Vec<Option<(usize, usize)>> = vec![None; width * height];
    let mut closed = vec![false; width * height];

    let mut open = BinaryHeap::new();
    let mut seq: u64 = 0;

    g_cost[index(start_cell)] = 0.0;
    open.push(HeapEntry {
        f_cost: manhattan(start_cell),
        seq,
        cell: start_cell,
    });

    let mut expanded = 0usize;

    while let Some(HeapEntry { cell, .. }) = open.pop() {
        if closed[index(cell)] {
            continue;
        }
        closed[index(cell)] = true;

        expanded += 1;
        if expanded > max_nodes {
            return None;
        }

        if cell == goal_cell {
            // Reconstruct
            let mut path = Vec::new();
            let mut current = Some(cell);
            while let Some(c) = current {
                path.push(grid.cell_to_world(c.0, c.1));
                current = parent[index(c)];
            }
            path.reverse();
            // Pin the endpoints to the requested coordinates
            if let Some(first) = path.first_mut() {
                *first = *start;
            }
            if let Some(last) = path.last_mut() {
                *last = *goal;
            }
            return Some(path);
        }

        for &(dx, dy) in &NEIGHBOURS {
            let nx = cell.0 as i64 + dx;
            let ny = cell.1 as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let next = (nx as usize, ny as usize);
            if !grid.is_free_cell(next.0, next.1) || closed[index(next)] {
                continue;
            }

            let step = ((dx * dx + dy * dy) as f64).sqrt() * res;
            let tentative = g_cost[index(cell)] + step;
            if tentative < g_cost[index(next)] {
                g_cost[index(next)] = tentative;
                parent[index(next)] = Some(cell);
                seq += 1;
                open.push(HeapEntry {
                    f_cost: tentative + manhattan(next),
                    seq,
                    cell: next,
                });
            }
        }
    }

    None
}
