use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total_cost: f64,
    pub time_us: usize,
    pub low_level_expand_nodes: usize,
    pub agents_planned: usize,
    pub agents_failed: usize,
}

impl Stats {
    pub fn print(&self) {
        info!(
            "Cost {:?} Time(microseconds) {:?} Planned {:?} Failed {:?} Low level expand nodes number {:?}",
            self.total_cost,
            self.time_us,
            self.agents_planned,
            self.agents_failed,
            self.low_level_expand_nodes
        );
    }
}
