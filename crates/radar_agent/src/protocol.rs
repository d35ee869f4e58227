//! Request/reply messaging between presentation code and the agent task.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{ContestRecord, Error};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::ContestBackend;
use crate::orchestrator::{cached_snapshot, RefreshOrchestrator};
use crate::store::CacheStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestSnapshot {
    pub contests: Vec<ContestRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum AgentRequest {
    /// Answer from the local store only.
    GetContests {
        reply: oneshot::Sender<ContestSnapshot>,
    },
    /// Reset the retry counter and run a forced refresh.
    RefreshContests {
        reply: oneshot::Sender<Vec<ContestRecord>>,
    },
}

#[derive(Debug, Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentRequest>,
}

impl AgentHandle {
    pub async fn get_contests(&self) -> Result<ContestSnapshot, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AgentRequest::GetContests { reply })
            .await
            .map_err(|_| Error::AgentStopped)?;
        rx.await.map_err(|_| Error::AgentStopped)
    }

    pub async fn refresh_contests(&self) -> Result<Vec<ContestRecord>, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AgentRequest::RefreshContests { reply })
            .await
            .map_err(|_| Error::AgentStopped)?;
        rx.await.map_err(|_| Error::AgentStopped)
    }
}

pub fn channel(buffer: usize) -> (AgentHandle, mpsc::Receiver<AgentRequest>) {
    let (tx, rx) = mpsc::channel(buffer);
    (AgentHandle { tx }, rx)
}

async fn next_alarm(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// A finished cycle hands the orchestrator back with its result.
struct Finished<B, S> {
    orchestrator: RefreshOrchestrator<B, S>,
    contests: Vec<ContestRecord>,
    reply: Option<oneshot::Sender<Vec<ContestRecord>>>,
}

type Cycle<B, S> = Pin<Box<dyn Future<Output = Finished<B, S>> + Send>>;

fn start_cycle<B, S>(
    mut orchestrator: RefreshOrchestrator<B, S>,
    force: bool,
    reply: Option<oneshot::Sender<Vec<ContestRecord>>>,
) -> Cycle<B, S>
where
    B: ContestBackend + 'static,
    S: CacheStore + 'static,
{
    Box::pin(async move {
        let contests = orchestrator.refresh(force).await;
        Finished {
            orchestrator,
            contests,
            reply,
        }
    })
}

async fn next_finished<B, S>(cycle: &mut Option<Cycle<B, S>>) -> Finished<B, S> {
    match cycle {
        Some(cycle) => cycle.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Serve requests until every handle is dropped.
///
/// Refresh cycles run one at a time: the orchestrator moves into the running
/// cycle and comes back when it finishes. `GetContests` reads the store
/// directly, so it is answered even while a cycle is retrying. Forced
/// refreshes that arrive mid-cycle queue up; alarm ticks mid-cycle are
/// skipped. With `alarm` set, the first tick fires immediately.
pub async fn run_agent<B, S>(
    orchestrator: RefreshOrchestrator<B, S>,
    mut rx: mpsc::Receiver<AgentRequest>,
    alarm: Option<Duration>,
) where
    B: ContestBackend + 'static,
    S: CacheStore + 'static,
{
    let store = orchestrator.shared_store();
    let mut idle = Some(orchestrator);
    let mut running: Option<Cycle<B, S>> = None;
    let mut queued: VecDeque<oneshot::Sender<Vec<ContestRecord>>> = VecDeque::new();

    let mut ticker = alarm.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            finished = next_finished(&mut running) => {
                if let Some(reply) = finished.reply {
                    if reply.send(finished.contests).is_err() {
                        warn!("RefreshContests requester went away");
                    }
                }
                let orchestrator = finished.orchestrator;
                running = match queued.pop_front() {
                    Some(reply) => Some(start_cycle(orchestrator, true, Some(reply))),
                    None => {
                        idle = Some(orchestrator);
                        None
                    }
                };
            }
            _ = next_alarm(&mut ticker) => {
                match idle.take() {
                    Some(orchestrator) => {
                        debug!("Refresh alarm fired");
                        running = Some(start_cycle(orchestrator, false, None));
                    }
                    None => debug!("Refresh alarm skipped, cycle already running"),
                }
            }
            request = rx.recv() => {
                let Some(request) = request else {
                    info!("All agent handles dropped, stopping");
                    break;
                };
                match request {
                    AgentRequest::GetContests { reply } => {
                        let (contests, last_updated) = cached_snapshot(store.as_ref()).await;
                        if reply.send(ContestSnapshot { contests, last_updated }).is_err() {
                            warn!("GetContests requester went away");
                        }
                    }
                    AgentRequest::RefreshContests { reply } => match idle.take() {
                        Some(orchestrator) => {
                            running = Some(start_cycle(orchestrator, true, Some(reply)));
                        }
                        None => queued.push_back(reply),
                    },
                }
            }
        }
    }
}
