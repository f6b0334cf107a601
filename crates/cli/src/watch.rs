// crates/cli/src/watch.rs
//! `opwatch watch`: follow operations until they all reach a terminal state.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar};
use opwatch_client::TrackerHandle;
use opwatch_types::{ConnectionState, OperationId, OperationSnapshot};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::render::{self, Styles};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Per-operation reconnect delays. Doubles on each consecutive failure and
/// resets once a channel is connected again.
#[derive(Debug, Default)]
struct Backoff {
    delays: HashMap<OperationId, Duration>,
    pending: HashSet<OperationId>,
}

impl Backoff {
    /// Delay before the next reconnect, or `None` if one is already scheduled.
    fn schedule(&mut self, id: &OperationId) -> Option<Duration> {
        if !self.pending.insert(id.clone()) {
            return None;
        }
        let delay = self.delays.get(id).copied().unwrap_or(INITIAL_BACKOFF);
        self.delays.insert(id.clone(), (delay * 2).min(MAX_BACKOFF));
        Some(delay)
    }

    fn fired(&mut self, id: &OperationId) {
        self.pending.remove(id);
    }

    fn reset(&mut self, id: &OperationId) {
        self.delays.remove(id);
    }
}

enum View {
    Json,
    Bars {
        bars: HashMap<OperationId, ProgressBar>,
        styles: Styles,
        // Keeps the draw target alive.
        _multi: MultiProgress,
    },
}

impl View {
    fn new(ids: &[OperationId], json: bool) -> anyhow::Result<Self> {
        if json {
            return Ok(View::Json);
        }
        let styles = Styles::new()?;
        let multi = MultiProgress::new();
        let width = ids.iter().map(|id| id.as_str().len()).max().unwrap_or(0);
        let bars = ids
            .iter()
            .map(|id| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(styles.active.clone());
                bar.set_prefix(format!("{:<width$}", id.as_str()));
                bar.set_message("connecting");
                (id.clone(), bar)
            })
            .collect();
        Ok(View::Bars {
            bars,
            styles,
            _multi: multi,
        })
    }

    fn render(&self, snapshot: &OperationSnapshot) -> anyhow::Result<()> {
        match self {
            View::Json => println!("{}", serde_json::to_string(snapshot)?),
            View::Bars { bars, styles, .. } => {
                let Some(bar) = bars.get(&snapshot.operation_id) else {
                    return Ok(());
                };
                bar.set_position(u64::from(snapshot.progress.progress_percent));
                if snapshot.lifecycle.is_terminal() {
                    bar.set_style(styles.for_terminal(snapshot.lifecycle));
                    bar.finish_with_message(render::summary_line(snapshot));
                } else {
                    bar.set_message(render::status_line(snapshot));
                }
            }
        }
        Ok(())
    }

    fn abandon(&self) {
        if let View::Bars { bars, .. } = self {
            for bar in bars.values().filter(|bar| !bar.is_finished()) {
                bar.abandon_with_message("interrupted");
            }
        }
    }
}

/// Result of a watch session.
pub struct WatchOutcome {
    /// Last snapshot of every operation that reached a terminal state.
    pub finished: HashMap<OperationId, OperationSnapshot>,
    pub interrupted: bool,
}

/// Per-run bookkeeping: which operations are done and which reconnects are
/// scheduled.
struct Session {
    view: View,
    ids: Vec<OperationId>,
    wanted: HashSet<OperationId>,
    finished: HashMap<OperationId, OperationSnapshot>,
    backoff: Backoff,
    retry_tx: mpsc::UnboundedSender<OperationId>,
}

impl Session {
    fn new(ids: Vec<OperationId>, view: View, retry_tx: mpsc::UnboundedSender<OperationId>) -> Self {
        Self {
            view,
            wanted: ids.iter().cloned().collect(),
            ids,
            finished: HashMap::new(),
            backoff: Backoff::default(),
            retry_tx,
        }
    }

    fn is_done(&self) -> bool {
        self.finished.len() >= self.wanted.len()
    }

    fn apply(&mut self, snapshot: OperationSnapshot) -> anyhow::Result<()> {
        let id = snapshot.operation_id.clone();
        if !self.wanted.contains(&id) || self.finished.contains_key(&id) {
            return Ok(());
        }
        self.view.render(&snapshot)?;
        if snapshot.lifecycle.is_terminal() {
            self.finished.insert(id, snapshot);
            return Ok(());
        }
        match snapshot.connection {
            ConnectionState::Connected => self.backoff.reset(&id),
            ConnectionState::Error | ConnectionState::Disconnected => {
                if let Some(delay) = self.backoff.schedule(&id) {
                    debug!(operation_id = %id, ?delay, "Scheduling reconnect");
                    let retry = self.retry_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = retry.send(id);
                    });
                }
            }
            ConnectionState::Connecting => {}
        }
        Ok(())
    }

    /// Re-read the current snapshot of every unfinished operation. Needed
    /// after a lag: a terminal snapshot is published once, so a skipped one
    /// would never arrive again.
    async fn resync(&mut self, handle: &TrackerHandle) -> anyhow::Result<()> {
        let unfinished: Vec<OperationId> = self
            .ids
            .iter()
            .filter(|id| !self.finished.contains_key(*id))
            .cloned()
            .collect();
        for id in unfinished {
            if let Some(snapshot) = handle.snapshot(id).await? {
                self.apply(snapshot)?;
            }
        }
        Ok(())
    }
}

/// Subscribe to every id and render updates until all are terminal or the
/// user presses Ctrl-C. Lost channels are re-subscribed with backoff.
pub async fn run(
    handle: &TrackerHandle,
    ids: Vec<OperationId>,
    json: bool,
) -> anyhow::Result<WatchOutcome> {
    let view = View::new(&ids, json)?;
    let mut updates = handle.updates();
    for id in &ids {
        handle.subscribe(id.clone())?;
    }

    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<OperationId>();
    let mut session = Session::new(ids, view, retry_tx);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while !session.is_done() {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => session.apply(snapshot)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Display fell behind tracker updates, resyncing");
                    session.resync(handle).await?;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(id) = retry_rx.recv() => {
                session.backoff.fired(&id);
                if !session.finished.contains_key(&id) {
                    handle.subscribe(id)?;
                }
            }
            _ = &mut ctrl_c => {
                interrupted = true;
                session.view.abandon();
                break;
            }
        }
    }

    for id in &session.ids {
        handle.unsubscribe(id.clone())?;
    }
    Ok(WatchOutcome {
        finished: session.finished,
        interrupted,
    })
}
