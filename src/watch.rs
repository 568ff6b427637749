//! Watch loop.
//! One detection cycle per tick: frame → calibration → snapshot → differencer. A detected
//! move is sent to the engine as a background task; detection stays paused until the
//! engine's answer has been played on screen and the board has settled, then resumes on
//! a fresh baseline so the engine's own move is never read back as the opponent's.
//!
//! All state lives on the loop. Background tasks only report back through the event
//! channel, tagged with the generation they were started under; anything from an older
//! generation is dropped. The detection cycle itself runs on a blocking thread: the
//! `Detector` is moved there and handed back with the result, so cycles never overlap.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::calibrate::{Calibration, CalibrationController};
use crate::capture::FrameSource;
use crate::config::{CalibrationStore, DiffConfig, WatchConfig};
use crate::diff::{BoardSnapshot, DetectedMove, FrameDifferencer};
use crate::engine::{EngineReply, GameOutcome, MoveEngine};
use crate::execute::MoveExecutor;
use crate::locate::Locate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Watching,
    /// Detection paused while the engine thinks.
    AwaitingEngine { generation: u64 },
    /// Detection paused while the engine's move is played and the screen settles.
    ExecutingOwnMove { generation: u64 },
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Watching => write!(f, "watching"),
            LoopState::AwaitingEngine { generation } => write!(f, "awaiting engine (#{})", generation),
            LoopState::ExecutingOwnMove { generation } => write!(f, "executing own move (#{})", generation),
            LoopState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Completion of a background task.
#[derive(Debug)]
pub enum WatchEvent {
    EngineReplied {
        generation: u64,
        result: Result<EngineReply>,
    },
    MoveExecuted {
        generation: u64,
        result: Result<()>,
    },
}

/// Capture, calibration and differencing for one cycle.
pub struct Detector<F, S, L> {
    source: F,
    controller: CalibrationController<S, L>,
    differ: FrameDifferencer,
    // calibration the current baseline was taken under
    calibration: Option<Calibration>,
}

impl<F, S, L> Detector<F, S, L>
where
    F: FrameSource,
    S: CalibrationStore,
    L: Locate,
{
    fn detect(&mut self) -> Result<Vec<DetectedMove>> {
        let frame = self.source.next_frame().context("Failed to capture frame")?;
        let Some(calibration) = self.controller.ensure_calibrated(&frame.image) else {
            debug!("No usable calibration yet");
            return Ok(Vec::new());
        };
        if self.calibration != Some(calibration) {
            if self.calibration.is_some() {
                info!("Calibration changed; starting a new baseline");
            }
            self.differ.reset_baseline();
            self.calibration = Some(calibration);
        }

        let snapshot = BoardSnapshot::capture(
            &frame.image,
            calibration.region,
            calibration.orientation,
            self.differ.config(),
        )
        .context("Failed to snapshot the board")?;
        trace!("Board:\n{}", snapshot.ascii());

        let moves = self.differ.observe(snapshot);
        trace!("Cycle finished {:?} after capture", frame.age());
        Ok(moves)
    }
}

pub type CycleTask<F, S, L> = JoinHandle<(Detector<F, S, L>, Result<Vec<DetectedMove>>)>;

pub struct Watcher<F, S, L, E, X> {
    // None while a cycle runs on the blocking pool
    detector: Option<Detector<F, S, L>>,
    reset_pending: bool,
    last_calibration: Calibration,
    // None: dry run, moves are only printed
    engine: Option<Arc<E>>,
    executor: Arc<X>,
    config: WatchConfig,
    state: LoopState,
    generation: u64,
    // game result announced together with the engine's last move
    pending_outcome: Option<GameOutcome>,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    events_rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl<F, S, L, E, X> Watcher<F, S, L, E, X>
where
    F: FrameSource,
    S: CalibrationStore,
    L: Locate,
    E: MoveEngine,
    X: MoveExecutor,
{
    pub fn new(
        source: F,
        controller: CalibrationController<S, L>,
        diff_config: DiffConfig,
        engine: Option<Arc<E>>,
        executor: Arc<X>,
        config: WatchConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let last_calibration = controller.current();
        Self {
            detector: Some(Detector {
                source,
                controller,
                differ: FrameDifferencer::new(diff_config),
                calibration: None,
            }),
            reset_pending: false,
            last_calibration,
            engine,
            executor,
            config,
            state: LoopState::Watching,
            generation: 0,
            pending_outcome: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// `None` while a detection cycle is running.
    pub fn differencer(&self) -> Option<&FrameDifferencer> {
        self.detector.as_ref().map(|d| &d.differ)
    }

    /// Starts a game on the engine and tells it its colour. As white, the engine's
    /// opening move is played before any detection happens.
    pub fn begin(&mut self) {
        let Some(engine) = self.engine.clone() else {
            info!("Dry run: detected moves are printed, no engine is contacted");
            return;
        };
        let engine_side = self.config.engine_color;
        let generation = self.next_generation();
        self.state = LoopState::AwaitingEngine { generation };
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = open_game(engine.as_ref(), engine_side).await;
            let _ = events.send(WatchEvent::EngineReplied { generation, result });
        });
    }

    /// One detection cycle on the calling thread. Returns the moves detected, if any;
    /// does nothing while paused.
    pub fn run_cycle(&mut self) -> Result<Vec<DetectedMove>> {
        if self.state != LoopState::Watching {
            trace!("Detection paused: {}", self.state);
            return Ok(Vec::new());
        }
        let detector = self
            .detector
            .as_mut()
            .context("A detection cycle is already running")?;
        let result = detector.detect();
        self.finish_cycle(result)
    }

    /// Takes back the detector from a finished background cycle and acts on its result.
    pub fn complete_cycle(
        &mut self,
        mut detector: Detector<F, S, L>,
        result: Result<Vec<DetectedMove>>,
    ) -> Result<Vec<DetectedMove>> {
        if std::mem::take(&mut self.reset_pending) {
            detector.differ.reset_baseline();
        }
        self.detector = Some(detector);
        self.finish_cycle(result)
    }

    fn finish_cycle(&mut self, result: Result<Vec<DetectedMove>>) -> Result<Vec<DetectedMove>> {
        if let Some(detector) = &self.detector {
            self.last_calibration = detector.controller.current();
        }
        let moves = result?;
        for mv in &moves {
            println!("Detected move: {}", mv);
        }
        if self.state != LoopState::Watching {
            debug!("Loop is {}; not dispatching", self.state);
            return Ok(moves);
        }
        if let Some(&first) = moves.first() {
            if moves.len() > 1 {
                debug!("{} moves in one cycle; sending only {}", moves.len(), first);
            }
            self.send_to_engine(first);
        }
        Ok(moves)
    }

    /// Waits for the next background completion.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events_rx.recv().await
    }

    pub fn handle_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::EngineReplied { generation, result } => {
                if self.state != (LoopState::AwaitingEngine { generation }) {
                    debug!("Discarding stale engine reply #{} ({})", generation, self.state);
                    return;
                }
                self.on_engine_reply(generation, result);
            }
            WatchEvent::MoveExecuted { generation, result } => {
                if self.state != (LoopState::ExecutingOwnMove { generation }) {
                    debug!("Discarding stale move completion #{} ({})", generation, self.state);
                    return;
                }
                if let Err(e) = result {
                    error!("Failed to play the engine's move: {:#}", e);
                }
                match self.pending_outcome.take() {
                    Some(outcome) => {
                        println!("Game over: {}", outcome);
                        self.stop();
                    }
                    None => self.resume(),
                }
            }
        }
    }

    /// Stops the loop; results of in-flight tasks are dropped when they arrive.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.state = LoopState::Stopped;
    }

    fn on_engine_reply(&mut self, generation: u64, result: Result<EngineReply>) {
        match result {
            Ok(EngineReply::Move { mv, outcome }) => {
                println!("Engine plays: {}", mv);
                self.pending_outcome = outcome;
                self.play_own_move(mv, generation);
            }
            Ok(EngineReply::YourMove) => {
                println!("Your move.");
                self.resume();
            }
            Ok(EngineReply::GameOver(outcome)) => {
                println!("Game over: {}", outcome);
                self.stop();
            }
            Ok(EngineReply::Illegal) => {
                warn!("Engine rejected the detected move as illegal");
                self.resume();
            }
            Ok(EngineReply::NoGame) => {
                warn!("Engine has no game in progress; restart the watcher to start one");
                self.resume();
            }
            Ok(EngineReply::EngineError) => {
                warn!("Engine failed to produce a move");
                self.resume();
            }
            Ok(EngineReply::Unrecognized(text)) => {
                warn!("Unrecognized engine reply: {}", text);
                self.resume();
            }
            Err(e) => {
                error!("Engine request failed: {:#}", e);
                self.resume();
            }
        }
    }

    fn send_to_engine(&mut self, mv: DetectedMove) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        let generation = self.next_generation();
        self.state = LoopState::AwaitingEngine { generation };
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = engine.reply_to(mv).await;
            let _ = events.send(WatchEvent::EngineReplied { generation, result });
        });
    }

    fn play_own_move(&mut self, mv: DetectedMove, generation: u64) {
        self.state = LoopState::ExecutingOwnMove { generation };
        let calibration = match &self.detector {
            Some(detector) => detector.controller.current(),
            None => self.last_calibration,
        };
        let executor = Arc::clone(&self.executor);
        let settle = Duration::from_millis(self.config.settle_ms);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = task::spawn_blocking(move || executor.execute(&mv, &calibration))
                .await
                .unwrap_or_else(|e| Err(anyhow!("Executor task failed: {}", e)));
            time::sleep(settle).await;
            let _ = events.send(WatchEvent::MoveExecuted { generation, result });
        });
    }

    fn resume(&mut self) {
        match self.detector.as_mut() {
            Some(detector) => detector.differ.reset_baseline(),
            None => self.reset_pending = true,
        }
        self.state = LoopState::Watching;
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

impl<F, S, L, E, X> Watcher<F, S, L, E, X>
where
    F: FrameSource + Send + 'static,
    S: CalibrationStore + Send + 'static,
    L: Locate + Send + 'static,
    E: MoveEngine,
    X: MoveExecutor,
{
    /// Runs until Ctrl-C or the end of the game.
    pub async fn run(mut self) -> Result<()> {
        self.begin();

        let mut ticker = time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut in_flight: Option<CycleTask<F, S, L>> = None;

        info!(
            "Watching for moves every {} ms. Press Ctrl+C to stop.",
            self.config.poll_interval_ms
        );
        while self.state != LoopState::Stopped {
            tokio::select! {
                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    info!("Stopping");
                    self.stop();
                }
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = ticker.tick(), if in_flight.is_none() && self.state == LoopState::Watching => {
                    in_flight = self.start_cycle();
                }
                joined = async {
                    match in_flight.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                    let (detector, result) = joined.context("Detection task failed")?;
                    if let Err(e) = self.complete_cycle(detector, result) {
                        warn!("Detection cycle skipped: {:#}", e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Moves the detector onto the blocking pool for one cycle. `None` while paused or
    /// while another cycle is still running.
    pub fn start_cycle(&mut self) -> Option<CycleTask<F, S, L>> {
        if self.state != LoopState::Watching {
            trace!("Detection paused: {}", self.state);
            return None;
        }
        let mut detector = self.detector.take()?;
        Some(task::spawn_blocking(move || {
            let result = detector.detect();
            (detector, result)
        }))
    }
}

async fn open_game<E: MoveEngine>(engine: &E, engine_side: crate::PlayerSide) -> Result<EngineReply> {
    let greeting = engine.start_game().await?;
    info!("Engine: {}", greeting);
    engine.choose_color(engine_side).await
}
