use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lpa_mapf::cat::ConflictAvoidanceTable;
use lpa_mapf::config::{Cli, Config};
use lpa_mapf::map::Map;
use lpa_mapf::planner::LpaStar;
use lpa_mapf::scenario::{AgentsFile, Scenario};
use lpa_mapf::stat::Stats;
use lpa_mapf::Path;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_yaml_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    let config = config.override_from_command_line(&cli)?;

    let map = Rc::new(Map::from_file(&config.map_path)?);
    let agents = match &config.scen_path {
        Some(scen_path) => {
            let scenario = Scenario::load_from_scen(scen_path)?;
            let mut rng = StdRng::seed_from_u64(config.seed);
            scenario.generate_agents_randomly(config.num_agents, &mut rng)?
        }
        None => AgentsFile::from_yaml(&config.agent_yaml_path)?.to_agents(&map)?,
    };

    // Plan the agents one after another; earlier paths feed the conflict
    // avoidance table so later agents tie-break away from them.
    let mut stats = Stats::default();
    let mut committed: Vec<Path> = Vec::new();
    let solve_start_time = Instant::now();

    for agent in &agents {
        if !agent.verify(&map) {
            warn!(agent = agent.id, "start or goal is not traversable, skipped");
            stats.agents_failed += 1;
            continue;
        }
        let start_loc = map.loc(agent.start.0, agent.start.1);
        let goal_loc = map.loc(agent.goal.0, agent.goal.1);
        let heuristic = Rc::new(map.compute_heuristic(goal_loc));
        let mut planner = LpaStar::new(start_loc, goal_loc, heuristic, Rc::clone(&map), agent.id);
        let cat = ConflictAvoidanceTable::from_paths(&committed, None);

        if planner.find_path(&cat, 0.0, 0) {
            let iteration = planner.search_iterations();
            let path = planner.path(iteration).unwrap().clone();
            info!(
                agent = agent.id,
                cost = planner.path_cost(iteration).unwrap(),
                expanded = planner.num_expanded(iteration).unwrap(),
                "planned {path:?}"
            );
            stats.total_cost += planner.path_cost(iteration).unwrap();
            stats.low_level_expand_nodes += planner.num_expanded(iteration).unwrap();
            stats.agents_planned += 1;
            committed.push(path);
        } else {
            info!(agent = agent.id, "no path");
            stats.agents_failed += 1;
        }
    }

    stats.time_us = solve_start_time.elapsed().as_micros() as usize;
    stats.print();
    Ok(())
}
