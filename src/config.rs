use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "LPA* MAPF",
    about = "Incremental LPA* low-level planner for MAPF, implemented in Rust.",
    version = "0.1"
)]
pub struct Cli {
    #[arg(long, short, help = "Path to the YAML config file")]
    pub config: Option<String>,
}

#[derive(Serialize, Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub map_path: String,
    pub agent_yaml_path: String,
    /// When set, agents are sampled from this MovingAI scenario file instead
    /// of `agent_yaml_path`.
    pub scen_path: Option<String>,
    pub num_agents: usize,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map_path: "map_file/test/test.map".to_string(),
            agent_yaml_path: "map_file/test/test.yaml".to_string(),
            scen_path: None,
            num_agents: 4,
            seed: 0,
        }
    }
}

impl Config {
    pub fn from_yaml_str(config_str: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(config_str)?;
        config.validate()
    }

    pub fn override_from_command_line(self, _cli: &Cli) -> anyhow::Result<Self> {
        self.validate()
    }

    pub fn validate(self) -> anyhow::Result<Self> {
        if self.scen_path.is_some() && self.num_agents == 0 {
            anyhow::bail!("num_agents must be positive when sampling a scenario");
        }
        Ok(self)
    }
}
