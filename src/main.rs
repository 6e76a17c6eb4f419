//! batchplay entry point
//!
//! Runs a seeded autoplayer against an in-process replay authority:
//! local play, threshold pauses, batched flushes (with optional injected
//! failures) and the final save commit.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use batchplay::persistence::save_to_path;
use batchplay::platform::{FixedStep, drive};
use batchplay::seed_for_level;
use batchplay::sim::flood::FloodState;
use batchplay::sim::maze::{MazeLevel, MazeState};
use batchplay::sim::sokoban::SokobanState;
use batchplay::sim::tetris::{Intent, TetrisLevel, TetrisState};
use batchplay::sim::{Direction, Game};
use batchplay::sync::{Fault, ReplayAuthority};
use batchplay::{Session, Settings};

/// Simulated frame length fed to the scheduler
const FRAME_MS: u32 = 16;
/// Save attempts before giving up on the final commit
const SAVE_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GameKind {
    Tetris,
    Maze,
    Flood,
    Sokoban,
}

#[derive(Parser, Debug)]
#[command(name = "batchplay")]
#[command(version)]
#[command(about = "Deterministic local play with batched replay against an authority", long_about = None)]
struct Cli {
    #[arg(short, long, value_enum, default_value = "tetris")]
    game: GameKind,

    /// Level number (maze, flood, sokoban)
    #[arg(short, long, default_value = "1")]
    level: u8,

    /// Autoplayer seed; also the bag seed for tetris
    #[arg(short, long)]
    seed: Option<u64>,

    /// Autoplayer steps before saving
    #[arg(long, default_value = "2000")]
    steps: u32,

    /// Inject a failure into every Nth flush (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: u32,

    /// Settings JSON (defaults when missing)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the session envelope here before the final commit
    #[arg(long)]
    save: Option<PathBuf>,
}

struct Run<'a> {
    cli: &'a Cli,
    settings: Settings,
    rng: Pcg32,
}

impl Run<'_> {
    fn play<G, F>(&mut self, level: G::Level, mut pick: F) -> Result<(), Box<dyn Error>>
    where
        G: Game,
        F: FnMut(&G, &mut Pcg32) -> G::Intent,
    {
        let mut session: Session<G> = Session::start(level.clone(), &self.settings)?;
        let mut authority = ReplayAuthority::<G>::new(&level)?;
        let mut clock = FixedStep::new();
        let mut flushes = 0u32;

        for _ in 0..self.cli.steps {
            if session.state().is_terminal() {
                break;
            }
            if session.is_paused() {
                flushes += 1;
                if self.cli.fail_every > 0 && flushes % self.cli.fail_every == 0 {
                    authority.inject(if flushes % 2 == 0 {
                        Fault::Transport
                    } else {
                        Fault::Reject
                    });
                }
                if let Err(err) = session.flush(&mut authority) {
                    log::warn!("flush failed, will retry: {}", err);
                }
                continue;
            }

            drive(&mut session, &mut clock, FRAME_MS)?;
            if session.is_paused() || session.state().is_terminal() {
                continue;
            }
            let intent = pick(session.state(), &mut self.rng);
            session.intent(intent)?;
        }

        if let Some(path) = &self.cli.save {
            save_to_path(&session.snapshot(), path)?;
        }

        let mut attempt = 0;
        loop {
            match session.save(&mut authority) {
                Ok(_) => break,
                Err(err) if attempt < SAVE_RETRIES => {
                    log::warn!("save failed, retrying: {}", err);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let window = session.window();
        log::info!(
            "{} finished: {} actions synced in {} submissions",
            G::NAME,
            window.synced,
            authority.submissions()
        );
        println!("{}", serde_json::to_string_pretty(&session.state().summary())?);
        Ok(())
    }
}

fn random_direction(rng: &mut Pcg32) -> Direction {
    Direction::ALL[rng.random_range(0..Direction::ALL.len())]
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log_level.as_str())).init();
    settings.validate()?;
    log::info!("batchplay starting: {:?} level {}", cli.game, cli.level);

    let mut run = Run {
        cli: &cli,
        settings,
        rng: Pcg32::seed_from_u64(cli.seed.unwrap_or(0)),
    };

    match cli.game {
        GameKind::Tetris => {
            let seed = cli.seed.unwrap_or_else(|| seed_for_level(cli.level));
            run.play::<TetrisState, _>(TetrisLevel { seed }, |_, rng| match rng.random_range(0..10) {
                0..=2 => Intent::Left,
                3..=5 => Intent::Right,
                6 => Intent::Rotate,
                7 => Intent::SoftDrop,
                8 => Intent::Hold,
                _ => Intent::HardDrop,
            })
        }
        GameKind::Maze => run.play::<MazeState, _>(MazeLevel { level: cli.level }, |state, rng| {
            // Mostly follow the shortest path, sometimes wander
            let next = state.maze.path(state.player, state.maze.exit).and_then(|p| p.first().copied());
            match next {
                Some(dir) if rng.random_range(0..10) < 7 => dir,
                _ => random_direction(rng),
            }
        }),
        GameKind::Flood => run.play::<FloodState, _>(cli.level, |state, rng| rng.random_range(0..state.colors)),
        GameKind::Sokoban => run.play::<SokobanState, _>(cli.level, |_, rng| random_direction(rng)),
    }
}
