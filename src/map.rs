use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// Static obstacle grid in row-major order: `loc = row * cols + col`.
///
/// `moves_offset` is the fixed move table shared by successor and predecessor
/// iteration (predecessors subtract). Index 4 is the wait move.
#[derive(Debug, Clone)]
pub struct Map {
    pub rows: usize,
    pub cols: usize,
    pub obstacles: Vec<bool>,
    pub moves_offset: [isize; 5],
}

impl Map {
    fn moves_for(cols: usize) -> [isize; 5] {
        // Up, down, left, right, wait.
        [-(cols as isize), cols as isize, -1, 1, 0]
    }

    /// Loads a map in the MovingAI benchmark format.
    pub fn from_file(path: &str) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let _type = lines.next().unwrap()?;
        let rows = lines
            .next()
            .unwrap()?
            .split_whitespace()
            .last()
            .unwrap()
            .parse::<usize>()
            .unwrap();
        let cols = lines
            .next()
            .unwrap()?
            .split_whitespace()
            .last()
            .unwrap()
            .parse::<usize>()
            .unwrap();
        let _map = lines.next().unwrap()?;

        let mut obstacles = Vec::with_capacity(rows * cols);
        for line in lines.take(rows) {
            let row: Vec<char> = line?.chars().collect();
            obstacles.extend(row.into_iter().take(cols).map(|ch| ch != '.'));
        }

        Ok(Map {
            rows,
            cols,
            obstacles,
            moves_offset: Self::moves_for(cols),
        })
    }

    /// Builds a map from an inline drawing: `.` free, anything else blocked.
    /// Handy for tests and small demos.
    pub fn from_ascii(text: &str) -> Self {
        let grid: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let rows = grid.len();
        let cols = grid.first().map_or(0, |l| l.chars().count());
        let mut obstacles = Vec::with_capacity(rows * cols);
        for line in &grid {
            obstacles.extend(line.chars().map(|ch| ch != '.'));
        }
        Map {
            rows,
            cols,
            obstacles,
            moves_offset: Self::moves_for(cols),
        }
    }

    pub fn map_size(&self) -> usize {
        self.rows * self.cols
    }

    pub fn loc(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn is_obstacle(&self, loc: usize) -> bool {
        self.obstacles[loc]
    }

    /// Whether `from -> to` is a legal single-step move: both endpoints on the
    /// grid and free, and the cells adjacent under 4-connectivity (or equal,
    /// for a wait). Comparing row/col coordinates rejects the horizontal
    /// wrap-around that raw offset arithmetic would accept in row-major ids.
    pub fn valid_move(&self, from: isize, to: isize) -> bool {
        let size = self.map_size() as isize;
        if from < 0 || from >= size || to < 0 || to >= size {
            return false;
        }
        let (from, to) = (from as usize, to as usize);
        let dr = (from / self.cols).abs_diff(to / self.cols);
        let dc = (from % self.cols).abs_diff(to % self.cols);
        if dr + dc > 1 {
            return false;
        }
        !self.obstacles[from] && !self.obstacles[to]
    }

    /// True-distance heuristic towards `goal`: a BFS over the four cardinal
    /// moves (unit edge costs). Cells that cannot reach the goal get infinity.
    pub fn compute_heuristic(&self, goal: usize) -> Vec<f64> {
        let mut dist = vec![f64::INFINITY; self.map_size()];
        if goal >= self.map_size() || self.obstacles[goal] {
            return dist;
        }
        let mut queue = VecDeque::new();
        dist[goal] = 0.0;
        queue.push_back(goal);
        while let Some(loc) = queue.pop_front() {
            for direction in 0..4 {
                let next = loc as isize + self.moves_offset[direction];
                if !self.valid_move(loc as isize, next) {
                    continue;
                }
                let next = next as usize;
                if dist[next].is_finite() {
                    continue;
                }
                dist[next] = dist[loc] + 1.0;
                queue.push_back(next);
            }
        }
        dist
    }
}
