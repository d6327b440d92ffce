//! The provisioning conversation: collect a VPS, verify it, install Windows
//! and wait until RDP answers.
//!
//! Each step is driven by the update that triggered it, except the remote
//! install and the readiness wait, which run on the workflow's task tracker.
//! Every transition is a compare-and-set on the session's revision, so a step
//! advances at most once however many updates race for it. Background work
//! re-checks that its session is still live before touching it, so cancelling
//! a session turns late completions into no-ops.

pub mod render;

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rb_infra::{CapabilityDetector, RemoteProvisioner, RemoteTarget, Secret};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::ledger::{Deduction, Ledger};
use crate::monitor::{MonitorEvent, ReadinessMonitor};
use crate::probe::PortProbe;
use crate::session::{
    ChatId, InstallKind, MessageRef, Order, ProvisioningSession, Shortfall, Step, UserId,
    VerifiedTarget,
};
use crate::store::SessionStore;
use crate::transport::{ChatTransport, Keyboard};
use crate::validate::{validate_ipv4, validate_password};

use self::render::Report;

/// Installer output lines shown under the progress message.
const LOG_TAIL_LINES: usize = 6;
const LOG_LINE_MAX_CHARS: usize = 160;
const LOG_CHANNEL_CAPACITY: usize = 64;
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Settings {
    pub templated_cost: i64,
    pub dedicated_cost: i64,
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
    pub monitor_deadline: Duration,
    /// Wait before the first readiness probe of a dedicated install, which
    /// reboots into the installer first.
    pub monitor_start_delay: Duration,
    pub progress_interval: Duration,
    pub refund_on_failure: bool,
}

impl Settings {
    pub fn cost(&self, kind: InstallKind) -> i64 {
        match kind {
            InstallKind::Templated => self.templated_cost,
            InstallKind::Dedicated => self.dedicated_cost,
        }
    }
}

pub struct Collaborators {
    pub transport: Arc<dyn ChatTransport>,
    pub ledger: Arc<dyn Ledger>,
    pub detector: Arc<dyn CapabilityDetector>,
    pub provisioner: Arc<dyn RemoteProvisioner>,
    pub probe: Arc<dyn PortProbe>,
}

#[derive(Debug, Clone)]
pub enum Input {
    Text { message: MessageRef, text: String },
    Button(Action),
}

/// Why a step did not advance.
#[derive(Debug)]
pub enum StepFailure {
    /// Bad input; the step is shown again with the reason.
    Validation(String),
    Connectivity { host: Ipv4Addr, detail: String },
    RequirementsNotMet(Vec<Shortfall>),
    Provisioning(String),
    /// Installed, but RDP never answered before the deadline.
    ReadinessTimeout(Order),
    SessionMissing,
}

#[derive(Clone)]
pub struct Workflow {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    ledger: Arc<dyn Ledger>,
    detector: Arc<dyn CapabilityDetector>,
    provisioner: Arc<dyn RemoteProvisioner>,
    monitor: ReadinessMonitor,
    store: SessionStore,
    catalog: Catalog,
    settings: Settings,
    tasks: TaskTracker,
}

impl Workflow {
    pub fn new(collaborators: Collaborators, store: SessionStore, catalog: Catalog, settings: Settings) -> Self {
        let Collaborators {
            transport,
            ledger,
            detector,
            provisioner,
            probe,
        } = collaborators;
        let monitor = ReadinessMonitor::new(probe, settings.poll_interval, settings.probe_timeout);

        Self {
            inner: Arc::new(Inner {
                transport,
                ledger,
                detector,
                provisioner,
                monitor,
                store,
                catalog,
                settings,
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn monitor(&self) -> &ReadinessMonitor {
        &self.inner.monitor
    }

    pub fn has_session(&self, chat: ChatId) -> bool {
        self.inner.store.provisioning.contains(chat)
    }

    /// Background installs still running.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Wait for every background install to finish.
    pub async fn wait_idle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    // ── Entry points ────────────────────────────────────────────────

    /// Charge the install and open a session that asks for the VPS address.
    ///
    /// `prompt` is the message the conversation will be rendered into.
    pub async fn start_workflow(
        &self,
        chat: ChatId,
        user: UserId,
        kind: InstallKind,
        prompt: MessageRef,
    ) -> Result<()> {
        let inner = &self.inner;

        // Claim the chat before charging so a second start cannot pay twice.
        let session = ProvisioningSession::new(user, kind, prompt, 0);
        let id = session.id;
        if !inner.store.provisioning.insert_if_absent(chat, session) {
            let (text, keyboard) = render::already_running();
            return inner.transport.edit_message(prompt, &text, Some(&keyboard)).await;
        }

        let cost = inner.settings.cost(kind);
        let deduction = match inner
            .ledger
            .deduct_if_sufficient(user, cost, &format!("{kind} install"))
            .await
        {
            Ok(deduction) => deduction,
            Err(e) => {
                inner.store.provisioning.clear_if(chat, id);
                return Err(e);
            }
        };
        let charged = match deduction {
            Deduction::Charged { balance } => {
                info!(chat_id = chat, user_id = user, cost, balance, "install charged");
                cost
            }
            Deduction::Exempt => 0,
            Deduction::Insufficient => {
                inner.store.provisioning.clear_if(chat, id);
                let balance = inner.ledger.balance(user).await?;
                info!(chat_id = chat, user_id = user, cost, %balance, "insufficient balance");
                let (text, keyboard) = render::insufficient_balance(kind, cost, balance);
                return inner.transport.edit_message(prompt, &text, Some(&keyboard)).await;
            }
        };

        if !inner.store.provisioning.record_charge(chat, id, charged) {
            // Cancelled while the charge was in flight.
            if charged > 0 {
                self.refund(user, charged, "install cancelled before start").await;
            }
            return Ok(());
        }
        info!(chat_id = chat, session_id = %id, %kind, "provisioning session started");

        let (text, keyboard) = render::ask_host(kind, None);
        if let Err(e) = inner.transport.edit_message(prompt, &text, Some(&keyboard)).await {
            // Nothing was done for the charge yet.
            if inner.store.provisioning.clear_if(chat, id).is_some() && charged > 0 {
                self.refund(user, charged, "install aborted").await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Feed user input to the current step.
    pub async fn handle_step_input(&self, chat: ChatId, input: Input) -> Result<()> {
        let Some(session) = self.inner.store.provisioning.get(chat) else {
            return self.fail(chat, None, StepFailure::SessionMissing).await;
        };

        match (session.step.clone(), input) {
            (_, Input::Button(Action::CancelInstallation)) => self.cancel(chat).await,

            (Step::AwaitingHost, Input::Text { text, .. }) => self.accept_host(chat, &session, &text).await,

            (Step::AwaitingRootCredential { host }, Input::Text { message, text }) => {
                self.accept_credential(chat, &session, host, message, text).await
            }

            (Step::AwaitingCatalogChoice { target }, Input::Button(Action::Catalog(id))) => {
                self.accept_product(chat, &session, target, id).await
            }

            (Step::AwaitingNewPassword { target, .. }, Input::Button(Action::BackToCatalog)) => {
                self.back_to_catalog(chat, &session, target).await
            }

            (Step::AwaitingNewPassword { target, product }, Input::Text { message, text }) => {
                self.accept_password(chat, &session, Order {
                    target,
                    product,
                    password: Secret::new(text.trim()),
                }, message)
                .await
            }

            (step, _) => {
                debug!(chat_id = chat, step = step.name(), "input not expected at this step");
                self.reject(chat, &session, render::use_buttons()).await
            }
        }
    }

    /// Destroy the chat's session. Work already sent to the VPS is not undone.
    pub async fn cancel(&self, chat: ChatId) -> Result<()> {
        let inner = &self.inner;
        match inner.store.provisioning.clear(chat) {
            Some(session) => {
                info!(
                    chat_id = chat,
                    session_id = %session.id,
                    step = session.step.name(),
                    "installation cancelled"
                );
                let (text, keyboard) = render::cancelled();
                inner
                    .transport
                    .edit_message(session.prompt, &text, Some(&keyboard))
                    .await
            }
            None => {
                inner
                    .transport
                    .send_message(chat, render::nothing_to_cancel(), None)
                    .await?;
                Ok(())
            }
        }
    }

    // ── Steps ───────────────────────────────────────────────────────

    async fn accept_host(&self, chat: ChatId, session: &ProvisioningSession, text: &str) -> Result<()> {
        let host = match validate_ipv4(text) {
            Ok(host) => host,
            Err(e) => return self.fail(chat, Some(session), StepFailure::Validation(e.to_string())).await,
        };

        let next = Step::AwaitingRootCredential { host };
        if self.advance(chat, session, session.revision, next).is_none() {
            return self.superseded(chat, session).await;
        }
        let (text, keyboard) = render::ask_credential(host);
        self.edit_prompt(session, &text, &keyboard).await
    }

    async fn accept_credential(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        host: Ipv4Addr,
        message: MessageRef,
        text: String,
    ) -> Result<()> {
        let inner = &self.inner;

        // The credential must not stay in the chat history, valid or not.
        if let Err(e) = inner.transport.delete_message(message).await {
            warn!(chat_id = chat, error = %e, "could not delete credential message");
        }

        let credential = Secret::new(text);
        let next = Step::ProbingCapability {
            host,
            credential: credential.clone(),
        };
        let Some(probing) = self.advance(chat, session, session.revision, next) else {
            return self.superseded(chat, session).await;
        };
        self.edit_prompt(session, &render::probing(host), &render::cancel_keyboard())
            .await?;

        let detected = inner
            .detector
            .detect(&RemoteTarget::root(host.to_string(), credential.clone()))
            .await;

        // Cancelled or replaced while detection ran.
        let Some(current) = inner.store.provisioning.get_if(chat, session.id) else {
            debug!(chat_id = chat, session_id = %session.id, "detection finished for a destroyed session");
            return Ok(());
        };

        let specs = match detected {
            Ok(specs) => specs,
            Err(e) => {
                info!(chat_id = chat, %host, error = %e, "capability detection failed");
                let failure = StepFailure::Connectivity {
                    host,
                    detail: e.to_string(),
                };
                return self.fail(chat, Some(&current), failure).await;
            }
        };

        let shortfalls = session.kind.requirements().shortfalls(&specs);
        if !shortfalls.is_empty() {
            info!(chat_id = chat, %host, missing = shortfalls.len(), "vps below requirements");
            return self
                .fail(chat, Some(&current), StepFailure::RequirementsNotMet(shortfalls))
                .await;
        }

        info!(
            chat_id = chat,
            %host,
            cores = specs.cpu_cores,
            memory_gb = specs.memory_gb,
            disk_gb = specs.disk_gb,
            kvm = specs.kvm_capable,
            "vps verified"
        );
        let target = VerifiedTarget {
            host,
            credential,
            specs,
        };
        self.show_picker(chat, session, probing, target).await
    }

    async fn show_picker(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        revision: u64,
        target: VerifiedTarget,
    ) -> Result<()> {
        let (text, keyboard) = render::picker(session.kind, &target, &self.inner.catalog, None);
        let next = Step::AwaitingCatalogChoice { target };
        if self.advance(chat, session, revision, next).is_none() {
            return self.superseded(chat, session).await;
        }
        self.edit_prompt(session, &text, &keyboard).await
    }

    async fn accept_product(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        target: VerifiedTarget,
        id: u32,
    ) -> Result<()> {
        let Some(product) = self.inner.catalog.find(session.kind, id).cloned() else {
            let failure = StepFailure::Validation("Unknown system, choose one from the list.".into());
            return self.fail(chat, Some(session), failure).await;
        };

        let (text, keyboard) = render::ask_password(session.kind, &target, &product, session.charged, None);
        let next = Step::AwaitingNewPassword { target, product };
        if self.advance(chat, session, session.revision, next).is_none() {
            return self.superseded(chat, session).await;
        }
        self.edit_prompt(session, &text, &keyboard).await
    }

    async fn back_to_catalog(&self, chat: ChatId, session: &ProvisioningSession, target: VerifiedTarget) -> Result<()> {
        self.show_picker(chat, session, session.revision, target).await
    }

    async fn accept_password(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        order: Order,
        message: MessageRef,
    ) -> Result<()> {
        let inner = &self.inner;

        if let Err(e) = inner.transport.delete_message(message).await {
            warn!(chat_id = chat, error = %e, "could not delete password message");
        }

        if let Err(e) = validate_password(order.password.expose()) {
            return self.fail(chat, Some(session), StepFailure::Validation(e.to_string())).await;
        }

        let next = Step::Provisioning {
            order: order.clone(),
        };
        let Some(provisioning) = self.advance(chat, session, session.revision, next) else {
            return self.superseded(chat, session).await;
        };
        info!(
            chat_id = chat,
            session_id = %session.id,
            host = %order.target.host,
            image = %order.product.image,
            "starting install"
        );

        let (text, keyboard) = render::installing(
            session.kind,
            order.target.host,
            &order.product,
            session.started_at.elapsed(),
            &VecDeque::new(),
        );
        self.edit_prompt(session, &text, &keyboard).await?;

        self.spawn_install(chat, session.clone(), provisioning, order);
        Ok(())
    }

    // ── Background install ──────────────────────────────────────────

    fn spawn_install(&self, chat: ChatId, session: ProvisioningSession, revision: u64, order: Order) {
        let workflow = self.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = workflow.run_install(chat, &session, revision, order).await {
                error!(chat_id = chat, session_id = %session.id, error = %e, "install task failed");
                workflow.inner.store.provisioning.clear_if(chat, session.id);
                if let Err(e) = workflow
                    .inner
                    .transport
                    .send_message(chat, render::apology(), None)
                    .await
                {
                    warn!(chat_id = chat, error = %e, "could not send apology");
                }
            }
        });
    }

    async fn run_install(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        revision: u64,
        order: Order,
    ) -> Result<()> {
        let inner = &self.inner;
        let plan = order.plan(session.kind);
        let remote = order.target.remote();

        let (log_tx, log_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (result, ()) = tokio::join!(
            inner.provisioner.provision(&remote, &plan, log_tx),
            self.render_install_log(chat, session, &order, log_rx)
        );

        if inner.store.provisioning.get_if(chat, session.id).is_none() {
            info!(chat_id = chat, session_id = %session.id, "install finished for a destroyed session");
            return Ok(());
        }
        if let Err(e) = result {
            warn!(chat_id = chat, host = %order.target.host, error = %e, "remote install failed");
            return self
                .fail(chat, Some(session), StepFailure::Provisioning(e.to_string()))
                .await;
        }

        let next = Step::MonitoringReadiness {
            order: order.clone(),
        };
        if self.advance(chat, session, revision, next).is_none() {
            return Ok(());
        }

        let host = order.target.host;
        let port = session.kind.rdp_port();
        let (text, keyboard) = render::waiting_for_rdp(host, port, None);
        self.edit_quietly(session.prompt, &text, &keyboard).await;

        let lifetime = session.lifetime.clone();
        if session.kind == InstallKind::Dedicated {
            tokio::select! {
                _ = lifetime.cancelled() => return Ok(()),
                _ = tokio::time::sleep(inner.settings.monitor_start_delay) => {}
            }
        }

        let host_str = host.to_string();
        let (event_tx, event_rx) = mpsc::channel(16);
        let wait = inner
            .monitor
            .wait_until_ready(&host_str, port, inner.settings.monitor_deadline, Some(event_tx));
        let outcome = tokio::select! {
            _ = lifetime.cancelled() => return Ok(()),
            (outcome, ()) = async { tokio::join!(wait, self.render_monitor_events(chat, session, host, port, event_rx)) } => outcome,
        };

        if !outcome.ready {
            return self
                .fail(chat, Some(session), StepFailure::ReadinessTimeout(order))
                .await;
        }
        if inner.store.provisioning.clear_if(chat, session.id).is_none() {
            return Ok(());
        }

        info!(
            chat_id = chat,
            session_id = %session.id,
            %host,
            port,
            attempts = outcome.attempts,
            "rdp ready"
        );
        let report = Report {
            kind: session.kind,
            host,
            product: &order.product,
            password: order.password.expose(),
            elapsed: session.started_at.elapsed(),
        };
        let (text, keyboard) = render::success(&report, &outcome);
        inner
            .transport
            .edit_message(session.prompt, &text, Some(&keyboard))
            .await?;
        inner
            .transport
            .send_message(chat, &render::connection_details(&report), None)
            .await?;
        Ok(())
    }

    /// Show the latest installer lines every progress interval until the
    /// installer closes its log or the session is destroyed.
    async fn render_install_log(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        order: &Order,
        mut lines: mpsc::Receiver<String>,
    ) {
        let inner = &self.inner;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(LOG_TAIL_LINES);
        let mut dirty = false;

        let mut ticker = tokio::time::interval(inner.settings.progress_interval.max(MIN_PROGRESS_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = session.lifetime.cancelled() => break,
                line = lines.recv() => match line {
                    Some(line) => {
                        if tail.len() == LOG_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(clean_log_line(&line, &order.password));
                        dirty = true;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !inner.store.provisioning.touch_if(chat, session.id) {
                        break;
                    }
                    if dirty {
                        dirty = false;
                        let (text, keyboard) = render::installing(
                            session.kind,
                            order.target.host,
                            &order.product,
                            session.started_at.elapsed(),
                            &tail,
                        );
                        self.edit_quietly(session.prompt, &text, &keyboard).await;
                    }
                }
            }
        }
    }

    async fn render_monitor_events(
        &self,
        chat: ChatId,
        session: &ProvisioningSession,
        host: Ipv4Addr,
        port: u16,
        mut events: mpsc::Receiver<MonitorEvent>,
    ) {
        loop {
            let event = tokio::select! {
                _ = session.lifetime.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if !self.inner.store.provisioning.touch_if(chat, session.id) {
                break;
            }
            let (text, keyboard) = render::waiting_for_rdp(host, port, Some(&event));
            self.edit_quietly(session.prompt, &text, &keyboard).await;
        }
    }

    // ── Failures ────────────────────────────────────────────────────

    async fn fail(&self, chat: ChatId, session: Option<&ProvisioningSession>, failure: StepFailure) -> Result<()> {
        let inner = &self.inner;
        let Some(session) = session else {
            let (text, keyboard) = render::session_missing();
            inner.transport.send_message(chat, &text, Some(&keyboard)).await?;
            return Ok(());
        };

        if let StepFailure::Validation(reason) = &failure {
            // A concurrent update already moved the session on.
            match inner.store.provisioning.get_if(chat, session.id) {
                Some(current) if current.revision == session.revision => {}
                _ => return Ok(()),
            }
            let (text, keyboard) = self.render_step(session, Some(reason));
            return self.edit_prompt(session, &text, &keyboard).await;
        }

        if inner.store.provisioning.clear_if(chat, session.id).is_none() {
            return Ok(());
        }
        info!(chat_id = chat, session_id = %session.id, step = session.step.name(), ?failure, "session ended");

        let (text, keyboard) = match failure {
            StepFailure::Connectivity { host, detail } => {
                let refund = self.refund_on_failure(session).await;
                render::connectivity_failure(session.kind, host, &detail, refund)
            }
            StepFailure::RequirementsNotMet(shortfalls) => {
                let refund = self.refund_on_failure(session).await;
                render::requirements_not_met(session.kind, &shortfalls, refund)
            }
            StepFailure::Provisioning(detail) => {
                let refund = self.refund_on_failure(session).await;
                render::provisioning_failure(session.kind, &detail, refund)
            }
            StepFailure::ReadinessTimeout(order) => render::soft_timeout(&Report {
                kind: session.kind,
                host: order.target.host,
                product: &order.product,
                password: order.password.expose(),
                elapsed: session.started_at.elapsed(),
            }),
            StepFailure::Validation(_) | StepFailure::SessionMissing => render::session_missing(),
        };
        self.edit_prompt(session, &text, &keyboard).await
    }

    /// Input that does not fit the step. Running installs keep their progress
    /// message and get a separate notice instead.
    async fn reject(&self, chat: ChatId, session: &ProvisioningSession, reason: &str) -> Result<()> {
        if session.step.is_running() || matches!(session.step, Step::ProbingCapability { .. }) {
            self.inner
                .transport
                .send_message(chat, &render::busy(session.step.name()), None)
                .await?;
            return Ok(());
        }
        self.fail(chat, Some(session), StepFailure::Validation(reason.into()))
            .await
    }

    fn advance(&self, chat: ChatId, session: &ProvisioningSession, revision: u64, next: Step) -> Option<u64> {
        let advanced = self
            .inner
            .store
            .provisioning
            .advance_if(chat, session.id, revision, next);
        if advanced.is_none() {
            debug!(chat_id = chat, session_id = %session.id, revision, "transition lost to a concurrent update");
        }
        advanced
    }

    /// A transition lost its race. The input is answered as busy if the
    /// session is still there; a destroyed session needs no reply.
    async fn superseded(&self, chat: ChatId, session: &ProvisioningSession) -> Result<()> {
        let Some(current) = self.inner.store.provisioning.get_if(chat, session.id) else {
            return Ok(());
        };
        self.inner
            .transport
            .send_message(chat, &render::busy(current.step.name()), None)
            .await?;
        Ok(())
    }

    async fn refund_on_failure(&self, session: &ProvisioningSession) -> Option<i64> {
        if !self.inner.settings.refund_on_failure || session.charged <= 0 {
            return None;
        }
        self.refund(
            session.user_id,
            session.charged,
            &format!("{} install failed", session.kind),
        )
        .await
    }

    async fn refund(&self, user: UserId, amount: i64, note: &str) -> Option<i64> {
        match self.inner.ledger.refund(user, amount, note).await {
            Ok(balance) => {
                info!(user_id = user, amount, balance, "install cost refunded");
                Some(amount)
            }
            Err(e) => {
                error!(user_id = user, amount, error = %e, "refund failed");
                None
            }
        }
    }

    // ── Rendering ───────────────────────────────────────────────────

    fn render_step(&self, session: &ProvisioningSession, error: Option<&str>) -> (String, Keyboard) {
        match &session.step {
            Step::AwaitingHost => render::ask_host(session.kind, error),
            Step::AwaitingRootCredential { host } => render::ask_credential(*host),
            Step::ProbingCapability { host, .. } => (render::probing(*host), render::cancel_keyboard()),
            Step::AwaitingCatalogChoice { target } => {
                render::picker(session.kind, target, &self.inner.catalog, error)
            }
            Step::AwaitingNewPassword { target, product } => {
                render::ask_password(session.kind, target, product, session.charged, error)
            }
            Step::Provisioning { .. } | Step::MonitoringReadiness { .. } => {
                (render::busy(session.step.name()), render::cancel_keyboard())
            }
        }
    }

    async fn edit_prompt(&self, session: &ProvisioningSession, text: &str, keyboard: &Keyboard) -> Result<()> {
        self.inner
            .transport
            .edit_message(session.prompt, text, Some(keyboard))
            .await
    }

    async fn edit_quietly(&self, message: MessageRef, text: &str, keyboard: &Keyboard) {
        if let Err(e) = self.inner.transport.edit_message(message, text, Some(keyboard)).await {
            warn!(chat_id = message.chat_id, error = %e, "progress update failed");
        }
    }
}

/// Trim an installer line for display, masking the RDP password.
fn clean_log_line(line: &str, password: &Secret) -> String {
    let mut line = line.trim().to_string();
    if !password.expose().is_empty() {
        line = line.replace(password.expose(), &password.masked());
    }
    match line.char_indices().nth(LOG_LINE_MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &line[..cut]),
        None => line,
    }
}
