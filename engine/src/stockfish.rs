use crate::uci::{parse_uci_message, UciMessage};
use crate::{EngineCommand, EngineEvent};
use chess::format_uci_move;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Stockfish not found")]
    NotFound,
    #[error("Failed to spawn Stockfish: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Engine IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine has no {0}")]
    MissingPipe(&'static str),
    #[error("Timeout waiting for engine to respond")]
    Timeout,
    #[error("Engine closed before {0}")]
    Closed(&'static str),
    #[error("Engine command channel closed")]
    ChannelClosed,
}

pub struct StockfishEngine {
    process: Child,
    command_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

/// Configuration for a Stockfish subprocess.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Explicit binary; when absent common install locations are probed.
    pub path: Option<PathBuf>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    /// Ask the engine for `wdl` statistics on info lines.
    pub show_wdl: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish instance and complete the UCI handshake.
    #[tracing::instrument(level = "info")]
    pub async fn spawn(config: EngineConfig) -> Result<Self, EngineError> {
        let path = find_stockfish_path(config.path.as_deref()).ok_or(EngineError::NotFound)?;
        tracing::info!(path = %path.display(), "Found Stockfish");

        let mut process = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn Stockfish: {}", e);
                EngineError::Spawn(e)
            })?;

        let mut stdin = process.stdin.take().ok_or(EngineError::MissingPipe("stdin"))?;
        let stdout = process.stdout.take().ok_or(EngineError::MissingPipe("stdout"))?;

        tracing::debug!("Sending 'uci' command");
        write_line(&mut stdin, "uci").await?;

        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(32);
        let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(32);

        // Output reader task
        let reader_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("Stockfish stdout EOF - engine closed");
                        let _ = reader_tx
                            .send(EngineEvent::Error("engine closed".to_string()))
                            .await;
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        tracing::trace!("UCI << {}", trimmed);

                        let event = match parse_uci_message(trimmed) {
                            Ok(UciMessage::UciOk) | Ok(UciMessage::ReadyOk) => EngineEvent::Ready,
                            Ok(UciMessage::BestMove { mv, .. }) => {
                                tracing::debug!(?mv, "Received bestmove");
                                EngineEvent::BestMove(mv)
                            }
                            Ok(UciMessage::Info(info)) => EngineEvent::Info(info),
                            Ok(msg) => {
                                tracing::trace!("Ignoring UCI message: {:?}", msg);
                                continue;
                            }
                            Err(e) => {
                                tracing::trace!("Failed to parse UCI message: {}", e);
                                continue;
                            }
                        };

                        if reader_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading from Stockfish stdout: {}", e);
                        let _ = reader_tx.send(EngineEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            tracing::debug!("Output reader task exiting");
        });

        wait_ready(&mut event_rx, "uciok").await?;

        if let Some(threads) = config.threads {
            let threads = threads.clamp(1, 16);
            tracing::debug!(threads, "Setting Threads");
            write_line(&mut stdin, &format!("setoption name Threads value {threads}")).await?;
        }
        if let Some(hash_mb) = config.hash_mb {
            let hash_mb = hash_mb.clamp(1, 2048);
            tracing::debug!(hash_mb, "Setting Hash");
            write_line(&mut stdin, &format!("setoption name Hash value {hash_mb}")).await?;
        }
        if config.show_wdl {
            write_line(&mut stdin, "setoption name UCI_ShowWDL value true").await?;
        }

        write_line(&mut stdin, "isready").await?;
        wait_ready(&mut event_rx, "readyok").await?;

        // Command writer task
        let writer_tx = event_tx;
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                let quit = matches!(cmd, EngineCommand::Quit);
                let line = command_line(&cmd);
                tracing::trace!("UCI >> {}", line);

                if let Err(e) = write_line(&mut stdin, &line).await {
                    tracing::error!("Failed to write to stdin: {}", e);
                    let _ = writer_tx.send(EngineEvent::Error(e.to_string())).await;
                    break;
                }
                if quit {
                    break;
                }
            }
            tracing::debug!("Command writer task exiting");
        });

        tracing::info!("Stockfish engine spawned and initialized successfully");
        Ok(Self {
            process,
            command_tx,
            event_rx,
        })
    }

    /// Send a command to the engine
    pub async fn send_command(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        tracing::trace!("Queueing command: {:?}", cmd);
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Receive an event from the engine
    pub async fn recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    /// Shutdown the engine
    pub async fn shutdown(mut self) {
        let _ = self.send_command(EngineCommand::Quit).await;
        let _ = tokio::time::timeout(Duration::from_secs(1), self.process.wait()).await;
        let _ = self.process.kill().await;
    }
}

fn command_line(cmd: &EngineCommand) -> String {
    match cmd {
        EngineCommand::SetPosition { fen, moves } => {
            let mut line = format!("position fen {fen}");
            if !moves.is_empty() {
                line.push_str(" moves");
                for mv in moves {
                    line.push(' ');
                    line.push_str(&format_uci_move(*mv));
                }
            }
            line
        }
        EngineCommand::SetOption { name, value } => match value {
            Some(val) => format!("setoption name {name} value {val}"),
            None => format!("setoption name {name}"),
        },
        EngineCommand::Go(params) => format!("go depth {}", params.depth),
        EngineCommand::Quit => "quit".to_string(),
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<(), EngineError> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

async fn wait_ready(
    events: &mut mpsc::Receiver<EngineEvent>,
    waiting_for: &'static str,
) -> Result<(), EngineError> {
    let waited = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Ready => return Ok(()),
                EngineEvent::Error(_) => return Err(EngineError::Closed(waiting_for)),
                _ => continue,
            }
        }
        Err(EngineError::Closed(waiting_for))
    })
    .await;

    match waited {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Timeout waiting for {}", waiting_for);
            Err(EngineError::Timeout)
        }
    }
}

/// Find a Stockfish executable, preferring an explicit path.
pub fn find_stockfish_path(preferred: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = preferred {
        return path.exists().then(|| path.to_path_buf());
    }

    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
    ];
    if let Some(found) = paths.iter().map(Path::new).find(|p| p.exists()) {
        return Some(found.to_path_buf());
    }

    // In PATH
    std::process::Command::new("stockfish")
        .arg("--help")
        .stdout(Stdio::null())
        .output()
        .ok()
        .map(|_| PathBuf::from("stockfish"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GoParams;

    #[test]
    fn explicit_missing_path_is_not_found() {
        let missing = Path::new("/definitely/not/here/stockfish");
        assert!(find_stockfish_path(Some(missing)).is_none());
    }

    #[test]
    fn formats_commands() {
        let go = EngineCommand::Go(GoParams { depth: 10 });
        assert_eq!(command_line(&go), "go depth 10");

        let position = EngineCommand::SetPosition {
            fen: "8/8/8/8/8/8/8/K6k w - - 0 1".to_string(),
            moves: vec![],
        };
        assert_eq!(command_line(&position), "position fen 8/8/8/8/8/8/8/K6k w - - 0 1");

        let option = EngineCommand::SetOption {
            name: "UCI_ShowWDL".to_string(),
            value: Some("true".to_string()),
        };
        assert_eq!(command_line(&option), "setoption name UCI_ShowWDL value true");
    }

    #[tokio::test]
    async fn spawn_fails_cleanly_without_binary() {
        let config = EngineConfig {
            path: Some(PathBuf::from("/definitely/not/here/stockfish")),
            ..Default::default()
        };
        assert!(matches!(
            StockfishEngine::spawn(config).await,
            Err(EngineError::NotFound)
        ));
    }
}
