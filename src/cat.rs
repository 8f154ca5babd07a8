use std::collections::HashMap;

use crate::common::Path;

/// Occupancy of one cell at one timestep: one entry per agent sitting there,
/// recording where that agent came from (its own cell for a wait).
#[derive(Debug, Clone, Default)]
pub struct AvoidanceState {
    pub came_from: Vec<usize>,
}

/// Conflict-avoidance table: per-timestep occupancy built from the other
/// agents' committed paths.
///
/// The planner consults it only to count soft conflicts per transition; the
/// counts break ties and never enter the OPEN key. Agents park on their final
/// cell forever, so queries past the horizon still see vertex occupancy.
#[derive(Debug, Clone, Default)]
pub struct ConflictAvoidanceTable {
    steps: Vec<HashMap<usize, AvoidanceState>>,
}

impl ConflictAvoidanceTable {
    /// Builds the table from committed paths, optionally skipping the agent
    /// being planned (its own path must not count against itself).
    pub fn from_paths(paths: &[Path], skip_agent: Option<usize>) -> Self {
        let horizon = paths
            .iter()
            .enumerate()
            .filter(|(id, path)| Some(*id) != skip_agent && !path.is_empty())
            .map(|(_, path)| path.len())
            .max()
            .unwrap_or(0);

        let mut steps = Vec::with_capacity(horizon);
        for timestep in 0..horizon {
            let mut cells: HashMap<usize, AvoidanceState> = HashMap::new();
            for (id, path) in paths.iter().enumerate() {
                if Some(id) == skip_agent || path.is_empty() {
                    continue;
                }
                let position = *path.get(timestep).unwrap_or_else(|| path.last().unwrap());
                let previous = if timestep == 0 {
                    position
                } else {
                    *path.get(timestep - 1).unwrap_or_else(|| path.last().unwrap())
                };
                cells.entry(position).or_default().came_from.push(previous);
            }
            steps.push(cells);
        }

        ConflictAvoidanceTable { steps }
    }

    /// Number of conflicts incurred by moving `from -> to` arriving at
    /// `to_timestep`: vertex conflicts with agents occupying `to`, plus swap
    /// conflicts with agents crossing `to -> from` over the same step.
    pub fn num_conflicts_for_step(&self, from: usize, to: usize, to_timestep: usize) -> usize {
        if self.steps.is_empty() {
            return 0;
        }
        if to_timestep >= self.steps.len() {
            // Past the horizon every agent waits on its final cell; only
            // vertex conflicts remain possible.
            let last = self.steps.last().unwrap();
            return last.get(&to).map_or(0, |state| state.came_from.len());
        }
        let step = &self.steps[to_timestep];
        let vertex = step.get(&to).map_or(0, |state| state.came_from.len());
        let swap = step.get(&from).map_or(0, |state| {
            state
                .came_from
                .iter()
                .filter(|&&previous| previous == to)
                .count()
        });
        vertex + swap
    }
}
