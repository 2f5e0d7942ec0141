//! Background auto-login agent
//!
//! A single task owns all retry state. Network events from the wake bus
//! reach it through a channel and only ever shorten a sleep.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::FutureExt;
use rand::Rng;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backend::{CredentialStore, NetworkBackend, lookup_credentials},
    config::{ConfigStore, Settings},
    core::{
        error::{AgentError, AgentResult},
        probe::{ConnectivityProbe, derive_state},
        scheduler::{MIN_SLEEP, RetryDecision, SchedulerState},
        submitter::LoginSubmitter,
        types::{AgentState, ConnectivityState, Credentials},
    },
    events::{Subscription, WakeBus, WakeReason},
};

/// Agent lifecycle state machine
#[derive(Debug)]
struct Lifecycle {
    state: AgentState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: AgentState::NotRunning,
            cancel: None,
            task: None,
        }
    }

    fn begin_start(&mut self) -> AgentResult<()> {
        match self.state {
            AgentState::NotRunning => {
                self.state = AgentState::Running;
                Ok(())
            }
            AgentState::Running | AgentState::Stopping => Err(AgentError::AlreadyRunning),
            AgentState::Stopped => Err(AgentError::Terminated),
        }
    }

    /// Returns the task to join, `None` when there is nothing to stop
    fn begin_stop(&mut self) -> Option<Option<JoinHandle<()>>> {
        if self.state != AgentState::Running {
            return None;
        }

        self.state = AgentState::Stopping;
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        Some(self.task.take())
    }
}

/// Captive portal auto-login agent
///
/// Polls connectivity on the target network and logs in whenever the
/// portal intercepts traffic.
pub struct AutoLoginAgent<B: NetworkBackend, S: CredentialStore> {
    backend: Arc<B>,
    credentials: Arc<S>,
    store: ConfigStore,
    bus: WakeBus,
    lifecycle: Mutex<Lifecycle>,
}

impl<B: NetworkBackend, S: CredentialStore> AutoLoginAgent<B, S> {
    pub fn new(backend: Arc<B>, credentials: Arc<S>, store: ConfigStore, bus: WakeBus) -> Self {
        Self {
            backend,
            credentials,
            store,
            bus,
            lifecycle: Mutex::new(Lifecycle::new()),
        }
    }

    pub async fn state(&self) -> AgentState {
        self.lifecycle.lock().await.state
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == AgentState::Running
    }

    /// Spawn the agent loop
    ///
    /// Fails with [`AgentError::AlreadyRunning`] on a running agent and
    /// with [`AgentError::Terminated`] once the agent has been stopped.
    pub async fn start(&self) -> AgentResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.begin_start()?;

        let cancel = CancellationToken::new();
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let subscription = self.bus.subscribe(move |reason| {
            // a closed channel means the loop already exited
            let _ = wake_tx.send(reason);
        });

        let worker = AgentWorker::new(
            self.backend.clone(),
            self.credentials.clone(),
            self.store.clone(),
            cancel.clone(),
            wake_rx,
            subscription,
        );

        lifecycle.task = Some(tokio::spawn(worker.run()));
        lifecycle.cancel = Some(cancel);
        info!("Auto-login agent started");
        Ok(())
    }

    /// Stop the loop and wait for it to exit
    ///
    /// Idempotent; an in-flight login request is abandoned.
    pub async fn stop(&self) -> AgentResult<()> {
        let Some(task) = self.lifecycle.lock().await.begin_stop() else {
            return Ok(());
        };

        let result = match task {
            Some(task) => task.await.map_err(AgentError::from),
            None => Ok(()),
        };

        self.lifecycle.lock().await.state = AgentState::Stopped;
        info!("Auto-login agent stopped");
        result
    }
}

/// What the loop does after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Run the next iteration right away
    Now,
    /// Sleep for the scheduler's delay first
    Sleep,
}

struct AgentWorker<B: NetworkBackend, S: CredentialStore> {
    probe: ConnectivityProbe<B>,
    submitter: LoginSubmitter<B>,
    credential_store: Arc<S>,
    store: ConfigStore,
    settings: Arc<Settings>,
    config_marker: Option<SystemTime>,
    credentials: Option<Credentials>,
    credentials_warned: bool,
    scheduler: SchedulerState,
    last_state: Option<ConnectivityState>,
    cancel: CancellationToken,
    wake_rx: mpsc::UnboundedReceiver<WakeReason>,
    // dropped with the worker, which releases the bus callback
    _subscription: Subscription,
}

impl<B: NetworkBackend, S: CredentialStore> AgentWorker<B, S> {
    fn new(
        backend: Arc<B>,
        credential_store: Arc<S>,
        store: ConfigStore,
        cancel: CancellationToken,
        wake_rx: mpsc::UnboundedReceiver<WakeReason>,
        subscription: Subscription,
    ) -> Self {
        let probe = ConnectivityProbe::new(backend);
        Self {
            submitter: LoginSubmitter::new(probe.clone()),
            probe,
            credential_store,
            store,
            settings: Arc::new(Settings::default()),
            config_marker: None,
            credentials: None,
            credentials_warned: false,
            scheduler: SchedulerState::new(),
            last_state: None,
            cancel,
            wake_rx,
            _subscription: subscription,
        }
    }

    async fn run(mut self) {
        self.reload_config().await;
        info!(
            ssid = %self.settings.ssid,
            config = %self.store.path().display(),
            "Watching for captive portal"
        );

        while !self.cancel.is_cancelled() {
            let step = match AssertUnwindSafe(self.iterate()).catch_unwind().await {
                Ok(step) => step,
                Err(panic) => {
                    let err = AgentError::Iteration(panic_message(panic.as_ref()));
                    warn!("Worker loop error: {}", err);
                    Step::Sleep
                }
            };

            if step == Step::Sleep {
                let delay = self
                    .scheduler
                    .next_delay(self.settings.base_interval(), jitter());
                debug!("Next check in {:.1}s", delay.as_secs_f64());
                self.sleep_or_wake(delay).await;
            }
        }

        debug!("Agent loop exited");
    }

    async fn iterate(&mut self) -> Step {
        self.refresh_config().await;
        let settings = self.settings.clone();

        if self.scheduler.in_cooldown(Instant::now()) {
            let (online, captive) = self.probe.observe(&settings.gateway_prefix).await;
            self.observe_state(ConnectivityState::derive(online, captive));
            self.sleep_or_wake(settings.cooldown_poll().max(MIN_SLEEP)).await;
            return Step::Now;
        }

        let (online, captive) = self.probe.observe(&settings.gateway_prefix).await;
        let on_target = self
            .probe
            .is_target_network_reachable(&settings.ssid, &settings.gateway_prefix)
            .await;
        self.observe_state(derive_state(online, captive, on_target));

        if online || !captive || !on_target {
            self.scheduler.mark_healthy();
            return Step::Sleep;
        }

        let Some(credentials) = self.current_credentials(&settings).await else {
            if !self.credentials_warned {
                warn!("No credentials configured, set a username and password to log in");
                self.credentials_warned = true;
            }
            self.sleep_or_wake(settings.base_interval().max(MIN_SLEEP)).await;
            return Step::Now;
        };
        self.credentials_warned = false;

        if !self
            .scheduler
            .attempt_allowed(Instant::now(), settings.post_grace())
        {
            return Step::Sleep;
        }

        self.attempt_login(&settings, &credentials).await
    }

    async fn attempt_login(&mut self, settings: &Settings, credentials: &Credentials) -> Step {
        info!("Captive portal on {}, logging in as {}", settings.ssid, credentials.username);
        self.scheduler.mark_attempt(Instant::now());
        let outcome = self.submitter.submit(settings, credentials).await;

        self.sleep_or_wake(settings.post_probe_delay()).await;
        let settled = self
            .submitter
            .wait_until_online(settings.settle_max(), settings.settle_step(), &self.cancel)
            .await;

        if settled {
            info!("Online confirmed after login");
            self.scheduler.record_success(Instant::now());
            return Step::Now;
        }

        info!(
            "Login not established: {} ({})",
            outcome.reason_code, outcome.reason_text
        );
        match self
            .scheduler
            .record_failure(&outcome.reason_code, &settings.retry, Instant::now())
        {
            RetryDecision::Cooldown(pause) if outcome.reason_code.is_fatal() => {
                info!("Fatal portal response, pausing retries for {}s", pause.as_secs())
            }
            RetryDecision::Cooldown(pause) => {
                info!("Too many failed attempts, pausing retries for {}s", pause.as_secs())
            }
            RetryDecision::Backoff(delay) => {
                debug!("Backing off for {}s", delay.as_secs_f64())
            }
        }
        Step::Sleep
    }

    /// Cached credentials, looked up again while missing
    async fn current_credentials(&mut self, settings: &Settings) -> Option<Credentials> {
        if self.credentials.is_none() {
            self.credentials = lookup_credentials(&self.credential_store, &settings.username).await;
        }
        self.credentials.clone()
    }

    async fn reload_config(&mut self) {
        self.config_marker = self.store.modified();
        self.settings = Arc::new(self.store.load());
        self.credentials =
            lookup_credentials(&self.credential_store, &self.settings.username).await;
        if self.credentials.is_some() {
            self.credentials_warned = false;
        }
    }

    async fn refresh_config(&mut self) {
        if self.store.modified() != self.config_marker {
            info!("Config changed, reloading {}", self.store.path().display());
            self.reload_config().await;
        }
    }

    fn observe_state(&mut self, state: ConnectivityState) {
        if self.last_state != Some(state) {
            info!("Connectivity: {}", state);
            self.last_state = Some(state);
        }
    }

    /// Sleep unless stopped or woken by a network event first
    async fn sleep_or_wake(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
            Some(reason) = self.wake_rx.recv() => {
                self.on_network_event(reason);
                while let Ok(reason) = self.wake_rx.try_recv() {
                    self.on_network_event(reason);
                }
            }
        }
    }

    fn on_network_event(&mut self, reason: WakeReason) {
        debug!("Network event: {}", reason);
        self.scheduler.on_network_event();
    }
}

fn jitter() -> f64 {
    rand::rng().random_range(-1.0..=1.0)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
