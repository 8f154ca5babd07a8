use std::cmp::Ordering;
use std::rc::Rc;

use tracing::{debug, instrument, trace, warn};

use super::dcm::DynamicConstraintManager;
use crate::cat::ConflictAvoidanceTable;
use crate::common::{LpaNode, NodeId, OpenList, Path, StateTable, GOAL_SENTINEL_TIMESTEP};
use crate::map::Map;

/// Incremental single-agent shortest-path search over the time-expanded grid,
/// a Lifelong Planning A* variant.
///
/// The planner keeps every generated `(loc, t)` state, the OPEN set of
/// locally inconsistent states, and a multiset of dynamic edge constraints.
/// The enclosing solver adds and lifts constraints between `find_path` calls;
/// repairs flow through OPEN instead of restarting the search.
pub struct LpaStar {
    map: Rc<Map>,
    heuristic: Rc<Vec<f64>>,
    agent_id: usize,
    start_location: usize,
    goal_location: usize,

    table: StateTable,
    open_list: OpenList,
    dcm: DynamicConstraintManager,

    start_n: NodeId,
    goal_n: NodeId,
    /// Goal candidates at the goal cell, ascending by timestep; the sentinel
    /// at `t = usize::MAX` is always present and last.
    possible_goals: Vec<NodeId>,
    /// Lower bound on acceptable goal arrival times, raised by goal-cell
    /// vertex constraints and lowered again when they are popped.
    min_goal_timestep: usize,

    search_iterations: usize,
    num_expanded: Vec<usize>,
    expanded_heat_map: Vec<Vec<usize>>,
    paths: Vec<Path>,
    paths_costs: Vec<f64>,
}

impl LpaStar {
    pub fn new(
        start_location: usize,
        goal_location: usize,
        heuristic: Rc<Vec<f64>>,
        map: Rc<Map>,
        agent_id: usize,
    ) -> Self {
        let mut table = StateTable::new(map.map_size());
        let mut open_list = OpenList::new();

        // The start is trivially inconsistent (g=0, v undefined) and seeds
        // OPEN; find_path is incremental from the first call.
        let mut start = LpaNode::new(
            start_location,
            0,
            0.0,
            f64::INFINITY,
            heuristic[start_location],
        );
        start.in_open = true;
        let start_key = start.key();
        let start_n = table.insert(start);
        open_list.push(start_n, start_key);

        // Sentinel goal: never enters OPEN, loses to any concrete candidate.
        let goal = LpaNode::new(
            goal_location,
            GOAL_SENTINEL_TIMESTEP,
            f64::INFINITY,
            f64::INFINITY,
            heuristic[goal_location],
        );
        let sentinel = table.insert(goal);

        // When the agent starts on its goal cell, arriving at t=0 is itself a
        // candidate; updateState never touches the start, so seed it here.
        let possible_goals = if start_location == goal_location {
            vec![start_n, sentinel]
        } else {
            vec![sentinel]
        };

        LpaStar {
            map,
            heuristic,
            agent_id,
            start_location,
            goal_location,
            table,
            open_list,
            dcm: DynamicConstraintManager::default(),
            start_n,
            goal_n: sentinel,
            possible_goals,
            min_goal_timestep: 0,
            search_iterations: 0,
            num_expanded: vec![0],
            expanded_heat_map: vec![Vec::new()],
            paths: vec![Vec::new()],
            paths_costs: vec![0.0],
        }
    }

    /// Runs one incremental search iteration. `f_lower_bound` is the
    /// enclosing solver's bound on the achievable cost (diagnostic only).
    /// `last_goal_constraint_timestep` is the latest timestep among the
    /// outstanding goal-cell vertex constraints, or 0 when there are none.
    #[instrument(skip_all, name = "lpa_find_path", fields(agent = self.agent_id), level = "debug")]
    pub fn find_path(
        &mut self,
        cat: &ConflictAvoidanceTable,
        f_lower_bound: f64,
        last_goal_constraint_timestep: usize,
    ) -> bool {
        self.search_iterations += 1;
        self.num_expanded.push(0);
        self.expanded_heat_map.push(Vec::new());
        self.paths.push(Vec::new());
        self.paths_costs.push(0.0);

        self.compute_shortest_path(cat, last_goal_constraint_timestep);

        let goal_cost = self.table.node(self.goal_n).g_cost;
        if goal_cost.is_infinite() {
            debug!("no path under the current constraints");
            return false;
        }
        if !self.update_path(self.goal_n) {
            return false;
        }
        if goal_cost + 1e-9 < f_lower_bound {
            warn!(goal_cost, f_lower_bound, "path cost below the caller's lower bound");
        }
        debug!(
            cost = goal_cost,
            expanded = self.num_expanded[self.search_iterations],
            "found path"
        );
        true
    }

    /// The main LPA* loop: pops inconsistent states until the best OPEN key
    /// can no longer improve on the tracked goal and the goal itself is not
    /// underconsistent.
    fn compute_shortest_path(
        &mut self,
        cat: &ConflictAvoidanceTable,
        last_goal_constraint_timestep: usize,
    ) {
        self.min_goal_timestep = self
            .min_goal_timestep
            .min(last_goal_constraint_timestep + 1);
        self.update_goal();

        loop {
            let Some((top_key, _)) = self.open_list.top() else {
                break;
            };
            let (goal_key, goal_underconsistent) = {
                let goal = self.table.node(self.goal_n);
                (goal.key(), goal.v_cost < goal.g_cost)
            };
            if !(top_key < goal_key || goal_underconsistent) {
                break;
            }

            trace!("OPEN: {:?}", self.open_list.ordered_ids());
            let (_, curr) = self.open_list.pop().unwrap();
            self.table.node_mut(curr).in_open = false;
            let (loc, timestep, g_cost, v_cost) = {
                let node = self.table.node(curr);
                (node.loc_id, node.timestep, node.g_cost, node.v_cost)
            };
            self.num_expanded[self.search_iterations] += 1;
            self.expanded_heat_map[self.search_iterations].push(loc);
            trace!(loc, timestep, g_cost, v_cost, open = self.open_list.len(), "expand");

            if v_cost > g_cost {
                // Overconsistent: commit g and relax the successors.
                self.table.node_mut(curr).v_cost = g_cost;
                for direction in 0..5 {
                    let Some(succ_loc) = self.successor_cell(loc, direction) else {
                        continue;
                    };
                    if self.dcm.is_blocked(loc, succ_loc, timestep + 1) {
                        continue;
                    }
                    let succ = self.retrieve_node(succ_loc, timestep + 1);
                    if self.table.node(succ).g_cost > g_cost + 1.0 {
                        self.table.node_mut(succ).backpointer = Some(curr);
                        self.update_state(succ, cat, true);
                    }
                }
            } else {
                // Underconsistent (or the degenerate v == g): retract the
                // committed cost, then repair this node and its successors.
                self.table.node_mut(curr).v_cost = f64::INFINITY;
                self.update_state(curr, cat, false);
                for direction in 0..5 {
                    let Some(succ_loc) = self.successor_cell(loc, direction) else {
                        continue;
                    };
                    if self.dcm.is_blocked(loc, succ_loc, timestep + 1) {
                        continue;
                    }
                    let succ = self.retrieve_node(succ_loc, timestep + 1);
                    self.update_state(succ, cat, false);
                }
            }

            self.update_goal();
        }
    }

    /// The central repair primitive. Recomputes `bp` (unless the caller just
    /// set it to the correct minimum predecessor), re-derives `g` and the
    /// conflict count, and restores the OPEN membership invariant.
    fn update_state(&mut self, id: NodeId, cat: &ConflictAvoidanceTable, bp_already_set: bool) {
        if id == self.start_n {
            return;
        }
        if !bp_already_set {
            let backpointer = self.retrieve_min_pred(id);
            self.table.node_mut(id).backpointer = backpointer;
        }

        let (loc, timestep, backpointer) = {
            let node = self.table.node(id);
            (node.loc_id, node.timestep, node.backpointer)
        };
        match backpointer {
            Some(bp) => {
                let (bp_loc, bp_v, bp_conflicts) = {
                    let pred = self.table.node(bp);
                    (pred.loc_id, pred.v_cost, pred.conflicts)
                };
                let step_conflicts = cat.num_conflicts_for_step(bp_loc, loc, timestep);
                let node = self.table.node_mut(id);
                node.g_cost = bp_v + 1.0;
                node.conflicts = bp_conflicts + step_conflicts;
            }
            None => {
                // Dead end: every predecessor is blocked or off the map.
                let node = self.table.node_mut(id);
                node.g_cost = f64::INFINITY;
                node.conflicts = 0;
            }
        }

        let (key, consistent, in_open) = {
            let node = self.table.node(id);
            (node.key(), node.is_consistent(), node.in_open)
        };
        if !consistent {
            if in_open {
                self.open_list.update(id, key);
            } else {
                self.open_list.push(id, key);
                self.table.node_mut(id).in_open = true;
            }
        } else if in_open {
            self.open_list.remove(id);
            self.table.node_mut(id).in_open = false;
        }
        trace!(loc, timestep, in_open = self.table.node(id).in_open, "update state");

        // A cheaper way to reach the goal cell surfaced: record the candidate
        // and re-derive the tracked goal (a recent constraint lift may have
        // revealed an even earlier reachable one).
        if loc == self.goal_location && timestep >= self.min_goal_timestep && id != self.goal_n {
            let goal_key = self.table.node(self.goal_n).key();
            if key < goal_key {
                self.insert_possible_goal(id, timestep);
                self.update_goal();
            }
        }
    }

    /// Best admissible predecessor by `(v + 1, conflicts)`; `None` when the
    /// node has no admissible predecessor under the current constraints.
    fn retrieve_min_pred(&mut self, id: NodeId) -> Option<NodeId> {
        let (loc, timestep) = {
            let node = self.table.node(id);
            (node.loc_id, node.timestep)
        };
        if timestep == 0 {
            return None;
        }
        let mut best: Option<NodeId> = None;
        let mut best_v = f64::INFINITY;
        let mut best_conflicts = usize::MAX;
        for direction in 0..5 {
            let Some(pred_loc) = self.predecessor_cell(loc, direction) else {
                continue;
            };
            if self.dcm.is_blocked(pred_loc, loc, timestep) {
                continue;
            }
            let pred = self.retrieve_node(pred_loc, timestep - 1);
            let (v_cost, conflicts) = {
                let node = self.table.node(pred);
                (node.v_cost, node.conflicts)
            };
            let better = match v_cost.total_cmp(&best_v) {
                Ordering::Less => true,
                Ordering::Equal => conflicts < best_conflicts,
                Ordering::Greater => false,
            };
            if better {
                best = Some(pred);
                best_v = v_cost;
                best_conflicts = conflicts;
            }
        }
        best
    }

    /// Walks the goal candidates in ascending arrival time and retargets
    /// `goal_n` at the first one that is acceptable under the current bound
    /// and cannot be beaten by anything still in OPEN.
    fn update_goal(&mut self) {
        let Some((top_key, _)) = self.open_list.top() else {
            return;
        };
        for i in 0..self.possible_goals.len() {
            let pg = self.possible_goals[i];
            let (timestep, key, settled) = {
                let node = self.table.node(pg);
                (
                    node.timestep,
                    node.key(),
                    node.v_cost >= node.g_cost,
                )
            };
            if timestep < self.min_goal_timestep {
                continue;
            }
            // Either the candidate's cost is final and at least as good as the
            // best OPEN key, or with unit edges nothing in OPEN can still
            // arrive before it.
            if (key <= top_key && settled) || (timestep as f64 >= top_key.f_cost) {
                self.goal_n = pg;
                return;
            }
        }
    }

    fn insert_possible_goal(&mut self, id: NodeId, timestep: usize) {
        let position = self
            .possible_goals
            .binary_search_by(|pg| self.table.node(*pg).timestep.cmp(&timestep));
        if let Err(position) = position {
            self.possible_goals.insert(position, id);
        }
    }

    /// Forbids occupying `loc_id` at `timestep` by blocking, in both
    /// directions, every edge into and out of the vertex, and repairs the
    /// affected states.
    pub fn add_vertex_constraint(
        &mut self,
        loc_id: usize,
        timestep: usize,
        cat: &ConflictAvoidanceTable,
    ) {
        if loc_id >= self.map.map_size() {
            warn!(loc_id, "vertex constraint outside the map");
            return;
        }
        if timestep == 0 {
            warn!(loc_id, "vertex constraints cannot be placed at timestep 0");
        }
        debug!(agent = self.agent_id, loc_id, timestep, "add vertex constraint");

        let n = self.retrieve_node(loc_id, timestep);
        self.table.node_mut(n).invalidate();
        if self.table.node(n).in_open {
            self.open_list.remove(n);
            self.table.node_mut(n).in_open = false;
        }

        if loc_id == self.goal_location {
            self.min_goal_timestep = self.min_goal_timestep.max(timestep + 1);
            let next = self
                .possible_goals
                .iter()
                .copied()
                .find(|&pg| self.table.node(pg).timestep >= self.min_goal_timestep);
            if let Some(pg) = next {
                self.goal_n = pg;
            }
        }

        for direction in 0..5 {
            let Some(succ_loc) = self.successor_cell(loc_id, direction) else {
                continue;
            };
            self.dcm.add_edge(loc_id, succ_loc, timestep + 1);
            self.dcm.add_edge(succ_loc, loc_id, timestep);
        }
        for direction in 0..5 {
            let Some(succ_loc) = self.successor_cell(loc_id, direction) else {
                continue;
            };
            let succ = self.retrieve_node(succ_loc, timestep + 1);
            self.update_state(succ, cat, false);
        }
    }

    /// Lifts a vertex constraint added earlier (LIFO against the edge
    /// multiset) and repairs the affected states.
    pub fn pop_vertex_constraint(
        &mut self,
        loc_id: usize,
        timestep: usize,
        cat: &ConflictAvoidanceTable,
    ) {
        if loc_id >= self.map.map_size() {
            warn!(loc_id, "vertex constraint outside the map");
            return;
        }
        debug!(agent = self.agent_id, loc_id, timestep, "pop vertex constraint");

        for direction in (0..5).rev() {
            let Some(succ_loc) = self.successor_cell(loc_id, direction) else {
                continue;
            };
            self.dcm.pop_edge(succ_loc, loc_id, timestep);
            self.dcm.pop_edge(loc_id, succ_loc, timestep + 1);
        }

        if loc_id == self.goal_location && self.min_goal_timestep == timestep + 1 {
            // Walk back to the latest timestep at which the goal cell is
            // still fully cut off; the arrival bound drops to just after it.
            let earliest = self.heuristic[self.start_location] as usize;
            let mut new_bound = 0;
            for j in (earliest..timestep).rev() {
                if self.cell_unreachable_at(loc_id, j) {
                    new_bound = j + 1;
                    break;
                }
            }
            self.min_goal_timestep = new_bound;
        }

        let n = self.retrieve_node(loc_id, timestep);
        self.update_state(n, cat, false);
        for direction in 0..5 {
            let Some(succ_loc) = self.successor_cell(loc_id, direction) else {
                continue;
            };
            let succ = self.retrieve_node(succ_loc, timestep + 1);
            self.update_state(succ, cat, false);
        }
    }

    /// Blocks the directed edge `from -> to` arriving at `to_timestep` and
    /// repairs the target state. Edge constraints never move the goal bound;
    /// goal-stay constraints are always vertex constraints.
    pub fn add_edge_constraint(
        &mut self,
        from_id: usize,
        to_id: usize,
        to_timestep: usize,
        cat: &ConflictAvoidanceTable,
    ) {
        if from_id >= self.map.map_size() || to_id >= self.map.map_size() {
            warn!(from_id, to_id, "edge constraint outside the map");
            return;
        }
        debug!(agent = self.agent_id, from_id, to_id, to_timestep, "add edge constraint");
        self.dcm.add_edge(from_id, to_id, to_timestep);
        let n = self.retrieve_node(to_id, to_timestep);
        self.update_state(n, cat, false);
    }

    pub fn pop_edge_constraint(
        &mut self,
        from_id: usize,
        to_id: usize,
        to_timestep: usize,
        cat: &ConflictAvoidanceTable,
    ) {
        if from_id >= self.map.map_size() || to_id >= self.map.map_size() {
            warn!(from_id, to_id, "edge constraint outside the map");
            return;
        }
        debug!(agent = self.agent_id, from_id, to_id, to_timestep, "pop edge constraint");
        self.dcm.pop_edge(from_id, to_id, to_timestep);
        let n = self.retrieve_node(to_id, to_timestep);
        self.update_state(n, cat, false);
    }

    /// Rebuilds `paths[iter]` by walking backpointers from `goal` to the
    /// start. Returns false on a broken chain; the enclosing solver may then
    /// discard the iteration.
    fn update_path(&mut self, goal: NodeId) -> bool {
        let iteration = self.search_iterations;
        let mut locations = Vec::new();
        let mut curr = goal;
        while curr != self.start_n {
            let node = self.table.node(curr);
            locations.push(node.loc_id);
            match node.backpointer {
                Some(bp) => curr = bp,
                None => {
                    warn!(
                        loc = node.loc_id,
                        timestep = node.timestep,
                        "broken backpointer chain"
                    );
                    return false;
                }
            }
            if locations.len() > self.table.len() {
                warn!("backpointer chain does not terminate");
                return false;
            }
        }
        locations.push(self.start_location);
        locations.reverse();
        self.paths_costs[iteration] = self.table.node(goal).g_cost;
        self.paths[iteration] = locations;
        true
    }

    fn retrieve_node(&mut self, loc_id: usize, timestep: usize) -> NodeId {
        if let Some(id) = self.table.get(loc_id, timestep) {
            return id;
        }
        self.table.insert(LpaNode::new(
            loc_id,
            timestep,
            f64::INFINITY,
            f64::INFINITY,
            self.heuristic[loc_id],
        ))
    }

    /// Move target for `direction` out of `loc`, when the move stays on the
    /// grid, lands on a free cell, and that cell can still reach the goal.
    fn successor_cell(&self, loc: usize, direction: usize) -> Option<usize> {
        let to = loc as isize + self.map.moves_offset[direction];
        if !self.map.valid_move(loc as isize, to) {
            return None;
        }
        let to = to as usize;
        if self.heuristic[to].is_infinite() {
            return None;
        }
        Some(to)
    }

    fn predecessor_cell(&self, loc: usize, direction: usize) -> Option<usize> {
        let from = loc as isize - self.map.moves_offset[direction];
        if !self.map.valid_move(from, loc as isize) {
            return None;
        }
        let from = from as usize;
        if self.heuristic[from].is_infinite() {
            return None;
        }
        Some(from)
    }

    fn cell_unreachable_at(&self, loc: usize, timestep: usize) -> bool {
        for direction in 0..5 {
            if let Some(pred_loc) = self.predecessor_cell(loc, direction) {
                if !self.dcm.is_blocked(pred_loc, loc, timestep) {
                    return false;
                }
            }
        }
        true
    }

    pub fn search_iterations(&self) -> usize {
        self.search_iterations
    }

    pub fn path(&self, iteration: usize) -> Option<&Path> {
        self.paths.get(iteration)
    }

    pub fn path_cost(&self, iteration: usize) -> Option<f64> {
        self.paths_costs.get(iteration).copied()
    }

    pub fn num_expanded(&self, iteration: usize) -> Option<usize> {
        self.num_expanded.get(iteration).copied()
    }

    pub fn expanded_heat_map(&self, iteration: usize) -> Option<&[usize]> {
        self.expanded_heat_map.get(iteration).map(Vec::as_slice)
    }

    pub fn min_goal_timestep(&self) -> usize {
        self.min_goal_timestep
    }

    pub fn dcm(&self) -> &DynamicConstraintManager {
        &self.dcm
    }
}

impl Clone for LpaStar {
    /// Snapshot for a branching high-level solver. Nodes are addressed by
    /// dense `NodeId`, so cloning the arena keeps every backpointer and OPEN
    /// entry valid without a fixup pass; the per-iteration bookkeeping starts
    /// fresh so each branch counts its own work.
    fn clone(&self) -> Self {
        LpaStar {
            map: Rc::clone(&self.map),
            heuristic: Rc::clone(&self.heuristic),
            agent_id: self.agent_id,
            start_location: self.start_location,
            goal_location: self.goal_location,
            table: self.table.clone(),
            open_list: self.open_list.clone(),
            dcm: self.dcm.clone(),
            start_n: self.start_n,
            goal_n: self.goal_n,
            possible_goals: self.possible_goals.clone(),
            min_goal_timestep: self.min_goal_timestep,
            search_iterations: 0,
            num_expanded: vec![0],
            expanded_heat_map: vec![Vec::new()],
            paths: vec![Vec::new()],
            paths_costs: vec![0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    }

    fn planner(map: &Rc<Map>, start: (usize, usize), goal: (usize, usize)) -> LpaStar {
        let start_loc = map.loc(start.0, start.1);
        let goal_loc = map.loc(goal.0, goal.1);
        let heuristic = Rc::new(map.compute_heuristic(goal_loc));
        LpaStar::new(start_loc, goal_loc, heuristic, Rc::clone(map), 0)
    }

    fn corridor() -> Rc<Map> {
        Rc::new(Map::from_ascii("..."))
    }

    fn open_grid() -> Rc<Map> {
        Rc::new(Map::from_ascii(
            "...
             ...
             ...",
        ))
    }

    /// Structural invariants that must hold after every public operation.
    fn check_invariants(p: &LpaStar) {
        for raw in 0..p.table.len() {
            let id = NodeId::new(raw);
            let node = p.table.node(id);
            assert_eq!(
                node.in_open,
                p.open_list.contains(id),
                "membership flag out of sync at ({}, {})",
                node.loc_id,
                node.timestep
            );
            assert_eq!(
                node.in_open,
                !node.is_consistent(),
                "OPEN must contain exactly the inconsistent nodes, ({}, {})",
                node.loc_id,
                node.timestep
            );
            match node.backpointer {
                Some(bp) => {
                    let pred = p.table.node(bp);
                    assert_eq!(
                        node.g_cost.total_cmp(&(pred.v_cost + 1.0)),
                        std::cmp::Ordering::Equal,
                        "g must follow the backpointer at ({}, {})",
                        node.loc_id,
                        node.timestep
                    );
                    assert!(p.map.valid_move(pred.loc_id as isize, node.loc_id as isize));
                    assert!(!p.dcm.is_blocked(pred.loc_id, node.loc_id, node.timestep));
                }
                None => assert!(id == p.start_n || node.g_cost.is_infinite()),
            }
        }
        if let Some((top_key, _)) = p.open_list.top() {
            for (key, _) in p.open_list.iter() {
                assert!(top_key <= key);
            }
        }
        assert!(p.possible_goals.contains(&p.goal_n));
    }

    #[test]
    fn test_corridor_shortest_path() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path(1).unwrap(), &vec![0, 1, 2]);
        assert_eq!(p.path_cost(1), Some(2.0));
        let expanded = p.num_expanded(1).unwrap();
        assert!((2..=3).contains(&expanded), "expanded {expanded} nodes");
        assert_eq!(p.expanded_heat_map(1).unwrap().len(), expanded);
        check_invariants(&p);
    }

    #[test]
    fn test_corridor_edge_constraint_forces_wait() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        p.add_edge_constraint(1, 2, 2, &cat);
        check_invariants(&p);

        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path(1).unwrap(), &vec![0, 1, 1, 2]);
        assert_eq!(p.path_cost(1), Some(3.0));
        check_invariants(&p);
    }

    #[test]
    fn test_corridor_vertex_constraint_delays_goal() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        p.add_vertex_constraint(2, 2, &cat);
        check_invariants(&p);
        assert_eq!(p.min_goal_timestep(), 3);

        assert!(p.find_path(&cat, 0.0, 2));
        assert_eq!(p.path_cost(1), Some(3.0));
        let path = p.path(1).unwrap().clone();
        assert!(
            path == vec![0, 1, 1, 2] || path == vec![0, 0, 1, 2],
            "unexpected path {path:?}"
        );
        assert_eq!(p.min_goal_timestep(), 3);
        check_invariants(&p);
    }

    #[test]
    fn test_open_grid_add_then_pop_round_trip() {
        init_tracing();
        let map = open_grid();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (2, 2));
        let center = map.loc(1, 1);

        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(1), Some(4.0));
        check_invariants(&p);

        // Blocking the centre at t=2 still leaves a detour of the same cost.
        p.add_vertex_constraint(center, 2, &cat);
        check_invariants(&p);
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(2), Some(4.0));
        assert_ne!(p.path(2).unwrap().get(2), Some(&center));
        check_invariants(&p);

        // Lifting it restores the unconstrained problem exactly.
        p.pop_vertex_constraint(center, 2, &cat);
        check_invariants(&p);
        assert!(p.dcm().is_empty());
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(3), Some(4.0));
        check_invariants(&p);
    }

    #[test]
    fn test_clone_is_independent() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p1 = planner(&map, (0, 0), (0, 2));

        assert!(p1.find_path(&cat, 0.0, 0));
        assert_eq!(p1.path_cost(1), Some(2.0));

        let mut p2 = p1.clone();
        p2.add_vertex_constraint(2, 2, &cat);
        assert!(p2.find_path(&cat, 0.0, 2));
        assert_eq!(p2.path_cost(1), Some(3.0));
        assert_eq!(p2.min_goal_timestep(), 3);
        check_invariants(&p2);

        // The source planner must be untouched by the branch's mutations.
        assert!(p1.dcm().is_empty());
        assert_eq!(p1.min_goal_timestep(), 0);
        assert!(p1.find_path(&cat, 0.0, 0));
        assert_eq!(p1.path(2).unwrap(), &vec![0, 1, 2]);
        assert_eq!(p1.path_cost(2), Some(2.0));
        check_invariants(&p1);
    }

    #[test]
    fn test_double_add_pop_edge_constraint() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        p.add_edge_constraint(1, 2, 2, &cat);
        p.add_edge_constraint(1, 2, 2, &cat);
        p.pop_edge_constraint(1, 2, 2, &cat);

        // One addition still outstanding: the edge stays blocked.
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(1), Some(3.0));
        check_invariants(&p);

        p.pop_edge_constraint(1, 2, 2, &cat);
        assert!(p.dcm().is_empty());
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(2), Some(2.0));
        assert_eq!(p.path(2).unwrap(), &vec![0, 1, 2]);
        check_invariants(&p);
    }

    #[test]
    fn test_start_equals_goal() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 1), (0, 1));

        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path(1).unwrap(), &vec![1]);
        assert_eq!(p.path_cost(1), Some(0.0));
        assert_eq!(p.num_expanded(1), Some(0));
        check_invariants(&p);
    }

    #[test]
    fn test_goal_unreachable() {
        init_tracing();
        let map = Rc::new(Map::from_ascii(".@."));
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        assert!(!p.find_path(&cat, 0.0, 0));
        assert!(p.path(1).unwrap().is_empty());
        assert!(p.table.node(p.goal_n).g_cost.is_infinite());
        assert_eq!(p.num_expanded(1), Some(1));
        check_invariants(&p);
    }

    #[test]
    fn test_goal_constraint_pops_restore_goal_bound() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        p.add_vertex_constraint(2, 2, &cat);
        p.add_vertex_constraint(2, 3, &cat);
        assert_eq!(p.min_goal_timestep(), 4);
        assert!(p.find_path(&cat, 0.0, 3));
        assert_eq!(p.path_cost(1), Some(4.0));
        check_invariants(&p);

        // Lifting the later constraint scans back to the earlier one.
        p.pop_vertex_constraint(2, 3, &cat);
        assert_eq!(p.min_goal_timestep(), 3);
        assert!(p.find_path(&cat, 0.0, 2));
        assert_eq!(p.path_cost(2), Some(3.0));
        check_invariants(&p);

        // Lifting the last goal constraint clears the bound entirely.
        p.pop_vertex_constraint(2, 2, &cat);
        assert_eq!(p.min_goal_timestep(), 0);
        assert!(p.dcm().is_empty());
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(3), Some(2.0));
        assert_eq!(p.path(3).unwrap(), &vec![0, 1, 2]);
        check_invariants(&p);
    }

    #[test]
    fn test_repeated_find_path_is_stable() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        assert!(p.find_path(&cat, 0.0, 0));
        let first = p.path(1).unwrap().clone();

        // Nothing changed between iterations: no work, same answer.
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path(2).unwrap(), &first);
        assert_eq!(p.path_cost(2), Some(2.0));
        assert_eq!(p.num_expanded(2), Some(0));
        assert_eq!(p.search_iterations(), 2);
        check_invariants(&p);
    }

    #[test]
    fn test_constraint_order_does_not_change_cost() {
        init_tracing();
        let map = open_grid();
        let cat = ConflictAvoidanceTable::default();
        let first = map.loc(0, 1);
        let second = map.loc(1, 0);

        let mut a = planner(&map, (0, 0), (2, 2));
        a.add_edge_constraint(map.loc(0, 0), first, 1, &cat);
        a.add_edge_constraint(map.loc(0, 0), second, 1, &cat);
        assert!(a.find_path(&cat, 0.0, 0));

        let mut b = planner(&map, (0, 0), (2, 2));
        b.add_edge_constraint(map.loc(0, 0), second, 1, &cat);
        b.add_edge_constraint(map.loc(0, 0), first, 1, &cat);
        assert!(b.find_path(&cat, 0.0, 0));

        assert_eq!(a.dcm(), b.dcm());
        assert_eq!(a.path_cost(1), b.path_cost(1));
        check_invariants(&a);
        check_invariants(&b);
    }

    #[test]
    fn test_cat_tie_breaking_prefers_fewer_conflicts() {
        init_tracing();
        let map = open_grid();
        // Another agent parks on (1, 2) for the whole horizon; the two
        // arrival corridors into the goal tie on cost and differ on
        // conflicts only.
        let parked = map.loc(1, 2);
        let cat = ConflictAvoidanceTable::from_paths(&[vec![parked; 5]], None);
        let mut p = planner(&map, (0, 0), (2, 2));

        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(1), Some(4.0));

        // Force one repair of the goal state: the predecessor scan ties on
        // v and must pick the conflict-free corridor through (2, 1).
        let goal = map.loc(2, 2);
        p.add_edge_constraint(parked, goal, 4, &cat);
        p.pop_edge_constraint(parked, goal, 4, &cat);
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(2), Some(4.0));
        assert_eq!(p.path(2).unwrap()[3], map.loc(2, 1));
        assert_eq!(p.table.node(p.goal_n).conflicts, 0);
        check_invariants(&p);
    }

    #[test]
    fn test_unconstrained_cost_returns_after_vertex_round_trip() {
        init_tracing();
        let map = corridor();
        let cat = ConflictAvoidanceTable::default();
        let mut p = planner(&map, (0, 0), (0, 2));

        assert!(p.find_path(&cat, 0.0, 0));
        let baseline = p.path_cost(1);

        p.add_vertex_constraint(1, 1, &cat);
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(2), Some(3.0)); // wait out the blocked cell

        p.pop_vertex_constraint(1, 1, &cat);
        assert!(p.dcm().is_empty());
        assert!(p.find_path(&cat, 0.0, 0));
        assert_eq!(p.path_cost(3), baseline);
        check_invariants(&p);
    }
}
