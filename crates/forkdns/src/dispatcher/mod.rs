mod policy;
mod signal;
mod timer_pool;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use forkdns_lists::{DomainList, PatternList};
use hickory_proto::op::Message;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;

use policy::{LocalPolicy, Verdict};
use signal::Signal;
pub use timer_pool::{PooledTimer, TimerPool};

use crate::util::{format_queries, get_servfail_message, is_unusual};
use crate::{DispatcherConfig, EcsOption, Upstream};

/// Signals the local task raises for the remote task.
#[derive(Clone)]
struct LocalSignals {
    done: Signal,
    failed: Signal,
}

/// Routes queries to the local and/or remote resolver and races their replies.
pub struct Dispatcher {
    local: Option<Upstream>,
    remote: Option<Upstream>,
    policy: LocalPolicy,
    forced_domains: Option<DomainList>,
    blocked_domains: Option<DomainList>,
    blocked_patterns: Option<PatternList>,
    ecs: Option<EcsOption>,
    remote_delay_start: Duration,
    query_timeout: Duration,
    timer_pool: Arc<TimerPool>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> anyhow::Result<Self> {
        let local = config
            .local_server
            .map(|addr| Upstream::plain(addr, config.local_use_tcp));

        let remote = match (&config.remote_doh_url, config.remote_server) {
            (Some(url), dial_addr) => Some(
                Upstream::doh(url, dial_addr, config.remote_skip_verify)
                    .context("failed to set up the DoH client")?,
            ),
            (None, Some(addr)) => Some(Upstream::plain(addr, config.remote_use_tcp)),
            (None, None) => None,
        };

        if local.is_none() && remote.is_none() {
            anyhow::bail!("both the local server and the remote server are missing");
        }

        let ecs = config
            .remote_ecs_subnet
            .as_deref()
            .map(EcsOption::parse)
            .transpose()?;

        if let Some(local) = &local {
            tracing::info!(%local, "Local server");
        }
        if let Some(remote) = &remote {
            tracing::info!(%remote, delay_start = ?config.remote_delay_start, "Remote server");
        }
        if let Some(ecs) = &ecs {
            tracing::info!(subnet = ?ecs.subnet(), "ECS enabled");
        }

        Ok(Dispatcher {
            local,
            remote,
            policy: LocalPolicy {
                block_unusual_type: config.local_block_unusual_type,
                allowed_ips: config.local_allowed_ips,
                blocked_ips: config.local_blocked_ips,
            },
            forced_domains: config.local_forced_domains,
            blocked_domains: config.local_blocked_domains,
            blocked_patterns: config.local_blocked_patterns,
            ecs,
            remote_delay_start: config.remote_delay_start,
            query_timeout: config.query_timeout,
            timer_pool: Arc::default(),
        })
    }

    /// Replaces the pool the remote-start timers are taken from.
    pub fn with_timer_pool(mut self, timer_pool: Arc<TimerPool>) -> Self {
        self.timer_pool = timer_pool;
        self
    }

    /// Resolves `query`, returning `None` if nothing was decided before the deadline.
    ///
    /// When every queried resolver failed or was filtered out the result is a SERVFAIL.
    pub async fn dispatch(self: &Arc<Self>, query: Message) -> Option<Message> {
        let span = tracing::debug_span!("query", id = query.id(), question = %format_queries(&query));
        self.race(query).instrument(span).await
    }

    async fn race(self: &Arc<Self>, query: Message) -> Option<Message> {
        let forced_local = self
            .forced_domains
            .as_ref()
            .is_some_and(|list| any_query_name(&query, |name| list.has(name)));
        if forced_local {
            tracing::debug!("Domain is forced to the local server");
        }
        let blocked_domain = self
            .blocked_domains
            .as_ref()
            .is_some_and(|list| any_query_name(&query, |name| list.has(name)))
            || self
                .blocked_patterns
                .as_ref()
                .is_some_and(|list| any_query_name(&query, |name| list.is_match(name)));
        if blocked_domain {
            tracing::debug!("Domain is blocked for the local server");
        }
        let unusual = is_unusual(&query);

        let query_local = self.local.is_some()
            && (forced_local || (!blocked_domain && !(unusual && self.policy.block_unusual_type)));
        let query_remote = self.remote.is_some() && !forced_local;

        let deadline = Instant::now() + self.query_timeout;
        let (result_tx, mut result_rx) = mpsc::channel(1);
        let signals = LocalSignals {
            done: Signal::new(),
            failed: Signal::new(),
        };

        let mut tasks = JoinSet::new();
        if query_local {
            tasks.spawn(
                Arc::clone(self)
                    .query_local(query.clone(), forced_local, deadline, result_tx.clone(), signals.clone())
                    .instrument(tracing::debug_span!("local")),
            );
        }
        if query_remote {
            let local_signals = query_local.then(|| signals.clone());
            tasks.spawn(
                Arc::clone(self)
                    .query_remote(query.clone(), deadline, result_tx.clone(), local_signals)
                    .instrument(tracing::debug_span!("remote")),
            );
        }
        drop(result_tx);

        let deadline_elapsed = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline_elapsed);

        let reply = loop {
            tokio::select! {
                biased;
                Some(reply) = result_rx.recv() => break Some(reply),
                joined = tasks.join_next() => match joined {
                    Some(Ok(())) => continue,
                    Some(Err(e)) => {
                        tracing::error!("Upstream task failed to execute: {}", e);
                        continue;
                    }
                    None => {
                        // A reply may have been published right before the last task finished
                        if let Ok(reply) = result_rx.try_recv() {
                            break Some(reply);
                        }
                        tracing::debug!("Every upstream failed, replying with SERVFAIL");
                        break Some(get_servfail_message(&query));
                    }
                },
                _ = &mut deadline_elapsed => {
                    tracing::warn!("No reply before the deadline");
                    break None;
                }
            }
        };

        // Leftover tasks end on their own once their I/O hits the deadline
        tasks.detach_all();

        reply
    }

    async fn query_local(
        self: Arc<Self>,
        query: Message,
        forced: bool,
        deadline: Instant,
        result_tx: mpsc::Sender<Message>,
        signals: LocalSignals,
    ) {
        let Some(local) = &self.local else {
            signals.failed.fire();
            return;
        };

        tracing::debug!("Querying the local server");
        let reply = match local.exchange(&query, deadline).await {
            Ok((reply, rtt)) => {
                tracing::debug!(rtt_ms = rtt.as_millis() as u64, "Got a reply from the local server");
                reply
            }
            Err(e) => {
                tracing::warn!("Local server failed: {:#}", e);
                signals.failed.fire();
                return;
            }
        };

        if !forced {
            if let Verdict::Drop(reason) = self.policy.judge(Some(&reply)) {
                tracing::debug!(reason, "Local reply dropped");
                signals.failed.fire();
                return;
            }
        }

        publish(&result_tx, reply);
        signals.done.fire();
        tracing::debug!("Local reply accepted");
    }

    async fn query_remote(
        self: Arc<Self>,
        mut query: Message,
        deadline: Instant,
        result_tx: mpsc::Sender<Message>,
        local: Option<LocalSignals>,
    ) {
        let Some(remote) = &self.remote else {
            return;
        };

        if let Some(local) = local.filter(|_| !self.remote_delay_start.is_zero()) {
            if local.done.is_fired() {
                tracing::debug!("Local server answered first, skipping the remote server");
                return;
            }
            let delay = self.timer_pool.acquire(self.remote_delay_start);
            tokio::select! {
                biased;
                _ = local.done.fired() => {
                    tracing::debug!("Local server answered first, skipping the remote server");
                    return;
                }
                _ = local.failed.fired() => tracing::debug!("Local server failed, no more delay"),
                _ = delay => tracing::debug!("Remote start delay elapsed"),
            }
        }

        if let Some(ecs) = &self.ecs {
            ecs.inject(&mut query);
        }

        tracing::debug!("Querying the remote server");
        match remote.exchange(&query, deadline).await {
            Ok((reply, rtt)) => {
                tracing::debug!(rtt_ms = rtt.as_millis() as u64, "Got a reply from the remote server");
                publish(&result_tx, reply);
            }
            Err(e) => tracing::warn!("Remote server failed: {:#}", e),
        }
    }
}

fn any_query_name(query: &Message, mut matches: impl FnMut(&str) -> bool) -> bool {
    query
        .queries()
        .iter()
        .any(|q| matches(&q.name().to_ascii()))
}

/// The first published reply wins, later ones are discarded.
fn publish(result_tx: &mpsc::Sender<Message>, reply: Message) {
    if result_tx.try_send(reply).is_err() {
        tracing::trace!("A reply was already published, discarding this one");
    }
}
