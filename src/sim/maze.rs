//! Procedural maze engine
//!
//! The maze is carved by a depth-first backtracker driven by the shared LCG,
//! so the backend regenerates the identical layout from the level number.
//! Only moves that change the player's cell are recorded.

use std::collections::VecDeque;

use glam::IVec2;
use serde::{Deserialize, Serialize};

use super::{Direction, Game, Lcg, Transition};
use crate::error::{ConfigError, ReplayError};
use crate::{scale_tenths_ceil, seed_for_level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelConfig {
    pub name: &'static str,
    /// Odd side length
    pub size: i32,
    /// Move budget multiplier in tenths of the shortest path
    pub moves_tenths: u32,
    pub view_radius: i32,
}

pub static LEVELS: [LevelConfig; 5] = [
    LevelConfig {
        name: "The Passage",
        size: 17,
        moves_tenths: 25,
        view_radius: 8,
    },
    LevelConfig {
        name: "Twisted Paths",
        size: 21,
        moves_tenths: 22,
        view_radius: 6,
    },
    LevelConfig {
        name: "Dead End Alley",
        size: 25,
        moves_tenths: 20,
        view_radius: 5,
    },
    LevelConfig {
        name: "The Labyrinth",
        size: 31,
        moves_tenths: 19,
        view_radius: 4,
    },
    LevelConfig {
        name: "The Abyss",
        size: 39,
        moves_tenths: 18,
        view_radius: 3,
    },
];

/// Carving steps between odd cells, in backend order.
const CARVE_STEPS: [IVec2; 4] = [
    IVec2::new(0, -2),
    IVec2::new(2, 0),
    IVec2::new(0, 2),
    IVec2::new(-2, 0),
];

/// Backend abort codes for refused moves.
pub mod abort {
    use crate::error::ReplayError;

    pub const NOT_ACTIVE: ReplayError = ReplayError::rejected(101, "game is not active");
    pub const WALL_COLLISION: ReplayError = ReplayError::rejected(107, "wall collision");
    pub const OUT_OF_MOVES: ReplayError = ReplayError::rejected(108, "out of moves");
}

pub fn level_config(level: u8) -> Result<&'static LevelConfig, ConfigError> {
    level
        .checked_sub(1)
        .and_then(|i| LEVELS.get(i as usize))
        .ok_or(ConfigError::InvalidLevel {
            level,
            max: LEVELS.len() as u8,
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeLevel {
    pub level: u8,
}

/// Generated layout plus the values derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maze {
    pub size: i32,
    /// Row-major, `true` = wall
    walls: Vec<bool>,
    pub start: IVec2,
    pub exit: IVec2,
    pub shortest_path: u32,
    pub max_moves: u32,
    pub view_radius: i32,
}

impl Maze {
    /// Carve the maze for `level` and compute its move budget.
    pub fn generate(level: u8) -> Result<Self, ConfigError> {
        let config = level_config(level)?;
        let size = config.size;
        let mut maze = Self {
            size,
            walls: vec![true; (size * size) as usize],
            start: IVec2::new(1, 1),
            exit: IVec2::new(size - 2, size - 2),
            shortest_path: 0,
            max_moves: 0,
            view_radius: config.view_radius,
        };

        let mut rng = Lcg::new(seed_for_level(level));
        let mut visited = vec![false; maze.walls.len()];
        let start = maze.start;
        maze.open(start);
        visited[maze.index(start)] = true;
        let mut stack = vec![start];

        while let Some(&cell) = stack.last() {
            let neighbors: Vec<IVec2> = CARVE_STEPS
                .iter()
                .map(|&step| cell + step)
                .filter(|&n| n.x > 0 && n.x < size - 1 && n.y > 0 && n.y < size - 1)
                .filter(|&n| !visited[maze.index(n)])
                .collect();

            if neighbors.is_empty() {
                stack.pop();
                continue;
            }

            let next = neighbors[rng.pick(neighbors.len())];
            maze.open(next);
            maze.open(cell + (next - cell) / 2);
            visited[maze.index(next)] = true;
            stack.push(next);
        }

        let exit = maze.exit;
        maze.open(exit);

        maze.shortest_path = maze
            .distance(maze.start, maze.exit)
            .ok_or(ConfigError::UnreachableExit { level })?;
        maze.max_moves = scale_tenths_ceil(maze.shortest_path, config.moves_tenths);

        log::info!(
            "generated maze level {} ({}x{}): shortest path {}, budget {}",
            level,
            size,
            size,
            maze.shortest_path,
            maze.max_moves
        );
        Ok(maze)
    }

    fn index(&self, pos: IVec2) -> usize {
        (pos.y * self.size + pos.x) as usize
    }

    fn open(&mut self, pos: IVec2) {
        let i = self.index(pos);
        self.walls[i] = false;
    }

    pub fn in_bounds(&self, pos: IVec2) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.size && pos.y < self.size
    }

    /// Out-of-bounds cells count as walls.
    pub fn is_wall(&self, pos: IVec2) -> bool {
        !self.in_bounds(pos) || self.walls[self.index(pos)]
    }

    /// BFS over open cells; directions expand in wire-code order.
    fn bfs(&self, from: IVec2, to: IVec2) -> Option<Vec<Option<(IVec2, Direction)>>> {
        let mut came_from: Vec<Option<(IVec2, Direction)>> = vec![None; self.walls.len()];
        let mut seen = vec![false; self.walls.len()];
        let mut queue = VecDeque::from([from]);
        seen[self.index(from)] = true;

        while let Some(pos) = queue.pop_front() {
            if pos == to {
                return Some(came_from);
            }
            for dir in Direction::ALL {
                let next = pos + dir.delta();
                if self.is_wall(next) || seen[self.index(next)] {
                    continue;
                }
                seen[self.index(next)] = true;
                came_from[self.index(next)] = Some((pos, dir));
                queue.push_back(next);
            }
        }
        None
    }

    pub fn distance(&self, from: IVec2, to: IVec2) -> Option<u32> {
        self.path(from, to).map(|p| p.len() as u32)
    }

    /// Shortest sequence of moves from `from` to `to`.
    pub fn path(&self, from: IVec2, to: IVec2) -> Option<Vec<Direction>> {
        if self.is_wall(from) || self.is_wall(to) {
            return None;
        }
        let came_from = self.bfs(from, to)?;
        let mut steps = Vec::new();
        let mut pos = to;
        while let Some((prev, dir)) = came_from[self.index(pos)] {
            steps.push(dir);
            pos = prev;
        }
        steps.reverse();
        Some(steps)
    }

    /// Chebyshev fog-of-war test
    pub fn visible_from(&self, viewer: IVec2, pos: IVec2) -> bool {
        let d = (pos - viewer).abs();
        d.x.max(d.y) <= self.view_radius
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeSummary {
    pub level: u8,
    pub moves: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeState {
    pub level: u8,
    pub maze: Maze,
    pub player: IVec2,
    pub facing: Direction,
    pub moves: u32,
}

impl MazeState {
    pub fn at_exit(&self) -> bool {
        self.player == self.maze.exit
    }

    pub fn moves_left(&self) -> u32 {
        self.maze.max_moves.saturating_sub(self.moves)
    }

    fn step(&mut self, dir: Direction) -> Result<(), ReplayError> {
        if self.at_exit() {
            return Err(abort::NOT_ACTIVE);
        }
        if self.moves >= self.maze.max_moves {
            return Err(abort::OUT_OF_MOVES);
        }
        let target = self.player + dir.delta();
        if self.maze.is_wall(target) {
            return Err(abort::WALL_COLLISION);
        }
        self.player = target;
        self.facing = dir;
        self.moves += 1;
        Ok(())
    }
}

impl Game for MazeState {
    type Level = MazeLevel;
    type Intent = Direction;
    type Action = Direction;
    type Summary = MazeSummary;

    const NAME: &'static str = "maze";
    const FINISHED: ReplayError = abort::NOT_ACTIVE;

    fn start(level: &MazeLevel) -> Result<Self, ConfigError> {
        let maze = Maze::generate(level.level)?;
        Ok(Self {
            level: level.level,
            player: maze.start,
            facing: Direction::Right,
            moves: 0,
            maze,
        })
    }

    fn handle(&mut self, dir: Direction) -> Transition<Direction> {
        match self.step(dir) {
            Ok(()) => Transition::Committed(dir),
            Err(err) => {
                log::trace!("maze move {:?} rejected: {}", dir, err);
                Transition::Rejected
            }
        }
    }

    fn replay(&mut self, dir: &Direction) -> Result<(), ReplayError> {
        self.step(*dir)
    }

    fn is_terminal(&self) -> bool {
        self.at_exit() || self.moves >= self.maze.max_moves
    }

    fn summary(&self) -> MazeSummary {
        MazeSummary {
            level: self.level,
            moves: self.moves,
        }
    }
}
