mod node;
mod open;
mod table;

pub(crate) use node::{LpaNode, NodeId, GOAL_SENTINEL_TIMESTEP};
pub(crate) use open::OpenList;
pub(crate) use table::StateTable;

use serde::{Deserialize, Serialize};

use crate::map::Map;

/// One planning task: an agent with grid-coordinate start and goal cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    pub id: usize,
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

impl Agent {
    pub fn verify(&self, map: &Map) -> bool {
        self.start.0 < map.rows
            && self.start.1 < map.cols
            && self.goal.0 < map.rows
            && self.goal.1 < map.cols
            && !map.is_obstacle(map.loc(self.start.0, self.start.1))
            && !map.is_obstacle(map.loc(self.goal.0, self.goal.1))
    }
}

/// A planned trajectory as row-major location ids, one entry per timestep.
pub type Path = Vec<usize>;
