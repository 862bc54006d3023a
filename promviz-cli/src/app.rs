//! Application lifecycle: backend setup, the UI event loop, and shutdown

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event as CEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use promviz_core::backend::{Backend, BackendError};
use promviz_core::config::{ConfigError, PromvizConfig};
use promviz_core::panels::PanelState;
use promviz_core::refresh::{RefreshEvent, RefreshSettings, Refresher, spawn_refresher};

use crate::backends::{FactoryError, create_backend};
use crate::ui::{self, HeaderInfo, Tui, UiAction};

/// Startup connection probe deadline
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the UI loop waits for input before checking for results
const INPUT_POLL: Duration = Duration::from_millis(50);
const EVENT_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

pub struct App {
    config: PromvizConfig,
    backend: Arc<dyn Backend>,
    cancel: CancellationToken,
    closed: bool,
}

impl App {
    /// Build the configured backend. Nothing touches the network yet.
    pub fn new(config: PromvizConfig) -> Result<Self, AppError> {
        let backend = create_backend(&config)?;
        Ok(Self {
            config,
            backend,
            cancel: CancellationToken::new(),
            closed: false,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Probe the backend once; failure here is fatal for startup
    pub async fn connect(&self) -> Result<(), AppError> {
        self.backend.connect(CONNECT_TIMEOUT).await?;
        tracing::info!(backend = self.backend.name(), "backend connected");
        Ok(())
    }

    /// Token shared by the quit key, Ctrl-C, and the refresh loop
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the dashboard until the user quits or the process is interrupted
    pub async fn run(mut self) -> Result<(), AppError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let settings = RefreshSettings {
            interval: self.config.refresh_interval(),
            query_timeout: self.config.query_timeout(),
        };
        let refresher = Refresher::new(
            self.backend.clone(),
            self.config.queries.clone(),
            settings,
            self.cancel.clone(),
            event_tx,
        );
        let refresh = spawn_refresher(refresher);
        spawn_signal_watcher(self.cancel.clone());

        let mut panels = PanelState::new(&self.config.queries);
        let header = HeaderInfo {
            backend: self.backend.name(),
            refresh_interval: settings.interval,
        };

        tracing::info!(
            queries = panels.len(),
            interval_secs = settings.interval.as_secs(),
            "dashboard starting"
        );

        let mut terminal = match ui::setup_terminal() {
            Ok(t) => t,
            Err(e) => {
                self.shutdown(Some(refresh)).await;
                return Err(e.into());
            }
        };

        let result = ui_loop(&mut terminal, &mut panels, event_rx, &header, &self.cancel);
        self.shutdown(Some(refresh)).await;
        ui::restore_terminal(terminal)?;
        result
    }

    /// Cancel in-flight work, wait for the refresh loop, then close the
    /// backend. Safe to call more than once.
    pub async fn shutdown(&mut self, refresh: Option<JoinHandle<()>>) {
        self.cancel.cancel();
        if let Some(handle) = refresh {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "refresh loop ended abnormally");
            }
        }
        if self.closed {
            return;
        }
        self.closed = true;
        match self.backend.close().await {
            Ok(()) => tracing::info!(backend = self.backend.name(), "backend closed"),
            Err(e) => tracing::warn!(error = %e, "failed to close backend"),
        }
    }
}

/// Ctrl-C from outside the terminal (raw mode swallows the key itself)
fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                }
                cancel.cancel();
            }
        }
    });
}

/// Apply every queued refresh result. Returns whether any panel changed.
pub fn apply_pending(rx: &mut mpsc::Receiver<RefreshEvent>, panels: &mut PanelState) -> bool {
    let mut changed = false;
    while let Ok(event) = rx.try_recv() {
        changed |= panels.apply(event);
    }
    changed
}

fn ui_loop(
    terminal: &mut Tui,
    panels: &mut PanelState,
    mut event_rx: mpsc::Receiver<RefreshEvent>,
    header: &HeaderInfo,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let mut dirty = true;

    // event_rx is dropped on return, so tasks still sending results fail fast
    // instead of waiting on a full channel during shutdown
    while !cancel.is_cancelled() {
        dirty |= apply_pending(&mut event_rx, panels);

        if dirty {
            terminal.draw(|f| ui::draw(f, panels, header))?;
            dirty = false;
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        match event::read()? {
            CEvent::Key(key) => match ui::map_key(key) {
                Some(UiAction::Quit) => {
                    tracing::info!("quit requested");
                    cancel.cancel();
                }
                Some(UiAction::FocusNext) => {
                    panels.focus_next();
                    dirty = true;
                }
                Some(UiAction::FocusPrev) => {
                    panels.focus_prev();
                    dirty = true;
                }
                None => {}
            },
            CEvent::Resize(..) => dirty = true,
            _ => {}
        }
    }
    Ok(())
}
