use anyhow::{Context, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::info;

use crate::common::Agent;
use crate::map::Map;

/// One start/goal pair from a MovingAI scenario file, in (row, col) order.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub start_row: usize,
    pub start_col: usize,
    pub goal_row: usize,
    pub goal_col: usize,
}

#[derive(Debug)]
pub struct Scenario {
    pub map: String,
    pub map_width: usize,
    pub map_height: usize,
    pub routes: Vec<Route>,
}

impl Scenario {
    /// Parses a MovingAI `.scen` file. Column comes before row in the file;
    /// routes are flattened across buckets.
    pub fn load_from_scen(path: &str) -> Result<Scenario> {
        let file = File::open(path).with_context(|| format!("opening scenario {path}"))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        // First line is "version x.x".
        let _version = lines.next().context("empty scenario file")??;

        let mut scenario = Scenario {
            map: String::new(),
            map_width: 0,
            map_height: 0,
            routes: Vec::new(),
        };

        for line in lines {
            let line = line?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 9 {
                continue;
            }

            if scenario.map.is_empty() {
                scenario.map = parts[1].to_string();
                scenario.map_width = parts[2].parse()?;
                scenario.map_height = parts[3].parse()?;
            }

            scenario.routes.push(Route {
                start_row: parts[5].parse()?,
                start_col: parts[4].parse()?,
                goal_row: parts[7].parse()?,
                goal_col: parts[6].parse()?,
            });
        }

        Ok(scenario)
    }

    /// Draws `num_agents` distinct routes at random.
    pub fn generate_agents_randomly<R: Rng + ?Sized>(
        &self,
        num_agents: usize,
        rng: &mut R,
    ) -> Result<Vec<Agent>> {
        if self.routes.len() < num_agents {
            anyhow::bail!(
                "scenario has {} routes, {} agents requested",
                self.routes.len(),
                num_agents
            );
        }

        let mut available = self.routes.clone();
        available.shuffle(rng);

        let agents: Vec<Agent> = available
            .into_iter()
            .take(num_agents)
            .enumerate()
            .map(|(id, route)| Agent {
                id,
                start: (route.start_row, route.start_col),
                goal: (route.goal_row, route.goal_col),
            })
            .collect();

        info!("sampled agents: {agents:?}");
        Ok(agents)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentYaml {
    pub name: String,
    #[serde(rename = "potentialGoals")]
    pub potential_goals: Vec<[usize; 2]>,
    pub start: [usize; 2],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentsFile {
    pub agent: Vec<AgentYaml>,
    pub map: String,
}

impl AgentsFile {
    pub fn from_yaml(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening agents file {path}"))?;
        let reader = BufReader::new(file);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn to_agents(&self, map: &Map) -> Result<Vec<Agent>> {
        let mut agents = Vec::new();
        for (id, entry) in self.agent.iter().enumerate() {
            let goal = entry.potential_goals.first().context("agent without goals")?;
            let agent = Agent {
                id,
                start: (entry.start[0], entry.start[1]),
                goal: (goal[0], goal[1]),
            };
            if !agent.verify(map) {
                anyhow::bail!("agent {} start or goal is not traversable", entry.name);
            }
            agents.push(agent);
        }
        Ok(agents)
    }
}
