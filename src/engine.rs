//! Engine module.
//! Client for the remote move engine, a small HTTP server speaking plain text:
//! - `POST /start` starts a game and asks which colour the engine plays.
//! - `POST /move` with `white`/`black` picks the engine colour. As white it answers
//!   `You are white. First move: e2e4`.
//! - `POST /move` with a UCI move returns the engine's move on the first line, optionally
//!   followed by a result line (`Checkmate, I win!`, `Draw`).
//!
//! Moves are sent and received as UCI text; promotion suffixes are parsed and dropped
//! since the executor only needs the two squares.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::PlayerSide;
use crate::diff::DetectedMove;

const MAX_RETRIES: u32 = 1; // One retry when the engine could not be reached
const RETRY_DELAY: Duration = Duration::from_millis(500);
const FIRST_MOVE_MARKER: &str = "First move:";

/// How a finished game ended, from the engine's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameOutcome {
    EngineWins,
    PlayerWins,
    Draw,
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameOutcome::EngineWins => write!(f, "checkmate, engine wins"),
            GameOutcome::PlayerWins => write!(f, "checkmate, player wins"),
            GameOutcome::Draw => write!(f, "draw"),
        }
    }
}

/// One parsed engine response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineReply {
    /// The engine moved; `outcome` is set when that move ended the game.
    Move {
        mv: DetectedMove,
        outcome: Option<GameOutcome>,
    },
    /// The engine is waiting for the player's move.
    YourMove,
    Illegal,
    GameOver(GameOutcome),
    EngineError,
    NoGame,
    Unrecognized(String),
}

impl EngineReply {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some(outcome) = parse_outcome(text) {
            return EngineReply::GameOver(outcome);
        }
        match text {
            "Illegal move" => return EngineReply::Illegal,
            "Engine error" => return EngineReply::EngineError,
            _ => {}
        }
        if text.starts_with("No game in progress") {
            return EngineReply::NoGame;
        }
        if let Some((_, rest)) = text.split_once(FIRST_MOVE_MARKER) {
            return match rest.trim().parse() {
                Ok(mv) => EngineReply::Move { mv, outcome: None },
                Err(_) => EngineReply::Unrecognized(text.to_string()),
            };
        }
        if text.contains("Make your move") {
            return EngineReply::YourMove;
        }

        let mut lines = text.lines();
        let first = lines.next().unwrap_or_default().trim();
        match first.parse::<DetectedMove>() {
            Ok(mv) => EngineReply::Move {
                mv,
                outcome: lines.find_map(|line| parse_outcome(line.trim())),
            },
            Err(_) => EngineReply::Unrecognized(text.to_string()),
        }
    }
}

fn parse_outcome(line: &str) -> Option<GameOutcome> {
    match line {
        "Checkmate, I win!" => Some(GameOutcome::EngineWins),
        "Checkmate, you win!" => Some(GameOutcome::PlayerWins),
        "Draw" => Some(GameOutcome::Draw),
        _ => None,
    }
}

/// The remote engine as the watch loop sees it.
pub trait MoveEngine: Send + Sync + 'static {
    /// Starts a fresh game; returns the engine's greeting.
    fn start_game(&self) -> impl Future<Output = Result<String>> + Send;

    /// Tells the engine which colour it plays.
    fn choose_color(&self, engine_side: PlayerSide) -> impl Future<Output = Result<EngineReply>> + Send;

    /// Sends the player's move and returns the engine's answer.
    fn reply_to(&self, mv: DetectedMove) -> impl Future<Output = Result<EngineReply>> + Send;
}

/// HTTP client for the engine server.
#[derive(Clone, Debug)]
pub struct RemoteEngine {
    client: Client,
    base_url: String,
}

impl RemoteEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let sent = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "text/plain")
                .body(body.to_string())
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.context("Failed to read engine response")?;
                    if !status.is_success() {
                        anyhow::bail!("Engine HTTP error {}: {}", status, text.trim());
                    }
                    debug!("{} '{}' -> '{}'", path, body, text.trim());
                    return Ok(text);
                }
                // only retry when the request never reached the server
                Err(e) if e.is_connect() && attempt <= MAX_RETRIES => {
                    warn!(
                        "Engine request attempt {}/{} failed: {}",
                        attempt,
                        MAX_RETRIES + 1,
                        e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("Failed to reach engine at {}", url)));
                }
            }
        }
    }
}

impl MoveEngine for RemoteEngine {
    async fn start_game(&self) -> Result<String> {
        let greeting = self.post("/start", "").await?;
        Ok(greeting.trim().to_string())
    }

    async fn choose_color(&self, engine_side: PlayerSide) -> Result<EngineReply> {
        let text = self.post("/move", engine_side.as_str()).await?;
        Ok(EngineReply::parse(&text))
    }

    async fn reply_to(&self, mv: DetectedMove) -> Result<EngineReply> {
        let text = self.post("/move", &mv.to_string()).await?;
        Ok(EngineReply::parse(&text))
    }
}
