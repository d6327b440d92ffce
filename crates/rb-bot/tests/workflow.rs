//! The provisioning conversation driven end to end against in-memory
//! collaborators, on a paused clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rb_bot::action::Action;
use rb_bot::catalog::Catalog;
use rb_bot::error::Result;
use rb_bot::ledger::{Account, Balance, Deduction, Ledger};
use rb_bot::probe::{PortProbe, ProbeErrorKind, ProbeResult};
use rb_bot::session::{ChatId, InstallKind, MessageRef, UserId};
use rb_bot::store::SessionStore;
use rb_bot::transport::{ChatTransport, Keyboard};
use rb_bot::workflow::{Collaborators, Input, Settings, Workflow};
use rb_infra::{
    Capacity, CapabilityDetector, DetectedSpecs, InstallPlan, LogSink, RemoteProvisioner, RemoteTarget,
    Secret,
};
use uuid::Uuid;

const CHAT: ChatId = 100;
const USER: UserId = 7;

// ── Collaborators ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Message { chat: ChatId, text: String },
    Edit { message: MessageRef, text: String },
    Delete(MessageRef),
}

#[derive(Default)]
struct MockTransport {
    log: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
}

impl MockTransport {
    fn log(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    fn last_edit(&self, message: MessageRef) -> String {
        self.log()
            .into_iter()
            .rev()
            .find_map(|s| match s {
                Sent::Edit { message: m, text } if m == message => Some(text),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn last_message(&self) -> String {
        self.log()
            .into_iter()
            .rev()
            .find_map(|s| match s {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn deleted(&self) -> Vec<i64> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Delete(m) => Some(m.message_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(&self, chat: ChatId, text: &str, _keyboard: Option<&Keyboard>) -> Result<MessageRef> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(Sent::Message {
            chat,
            text: text.to_string(),
        });
        Ok(MessageRef {
            chat_id: chat,
            message_id,
        })
    }

    async fn edit_message(&self, message: MessageRef, text: &str, _keyboard: Option<&Keyboard>) -> Result<()> {
        self.log.lock().unwrap().push(Sent::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        // Let other updates for the chat interleave here, as a real request would.
        tokio::task::yield_now().await;
        self.log.lock().unwrap().push(Sent::Delete(message));
        Ok(())
    }

    async fn answer_button(&self, _callback_id: &str, _text: Option<&str>, _alert: bool) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MockLedger {
    balances: Mutex<HashMap<UserId, i64>>,
    refunds: Mutex<Vec<(UserId, i64)>>,
    latency: Duration,
}

impl MockLedger {
    fn with_balance(user: UserId, amount: i64) -> Self {
        let ledger = Self::default();
        ledger.balances.lock().unwrap().insert(user, amount);
        ledger
    }

    fn amount(&self, user: UserId) -> i64 {
        self.balances.lock().unwrap().get(&user).copied().unwrap_or(0)
    }

    fn refunds(&self) -> Vec<(UserId, i64)> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn deduct_if_sufficient(&self, user: UserId, amount: i64, _note: &str) -> Result<Deduction> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user).or_insert(0);
        if *balance < amount {
            return Ok(Deduction::Insufficient);
        }
        *balance -= amount;
        Ok(Deduction::Charged { balance: *balance })
    }

    async fn refund(&self, user: UserId, amount: i64, _note: &str) -> Result<i64> {
        self.refunds.lock().unwrap().push((user, amount));
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    async fn credit(&self, user: UserId, amount: i64, _note: &str) -> Result<i64> {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    async fn balance(&self, user: UserId) -> Result<Balance> {
        Ok(Balance::Amount(self.amount(user)))
    }

    async fn account(&self, user: UserId) -> Result<Account> {
        Ok(Account {
            balance: Balance::Amount(self.amount(user)),
            joined: chrono::Utc::now(),
            pending_deposit: None,
        })
    }

    async fn request_deposit(&self, _user: UserId, _amount: i64) -> Result<Uuid> {
        Ok(Uuid::new_v4())
    }
}

struct MockDetector {
    specs: Option<DetectedSpecs>,
    credentials: Mutex<Vec<String>>,
    duration: Duration,
}

#[async_trait]
impl CapabilityDetector for MockDetector {
    async fn detect(&self, target: &RemoteTarget) -> rb_infra::Result<DetectedSpecs> {
        self.credentials
            .lock()
            .unwrap()
            .push(target.password.expose().to_string());
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        self.specs
            .clone()
            .ok_or_else(|| rb_infra::Error::Auth(target.host.clone()))
    }
}

struct MockProvisioner {
    plans: Mutex<Vec<InstallPlan>>,
    duration: Duration,
    fail: bool,
}

#[async_trait]
impl RemoteProvisioner for MockProvisioner {
    async fn provision(&self, _target: &RemoteTarget, plan: &InstallPlan, log: LogSink) -> rb_infra::Result<()> {
        self.plans.lock().unwrap().push(plan.clone());
        let _ = log.send("downloading image".into()).await;
        tokio::time::sleep(self.duration).await;
        if self.fail {
            return Err(rb_infra::Error::CommandFailed {
                exit: 1,
                output: "docker: command not found".into(),
            });
        }
        let _ = log.send("done".into()).await;
        Ok(())
    }
}

/// Refuses the first `refusals` probes, then answers in 120 ms.
struct MockProbe {
    refusals: u32,
    calls: AtomicU32,
    ports: Mutex<Vec<u16>>,
}

#[async_trait]
impl PortProbe for MockProbe {
    async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> ProbeResult {
        self.ports.lock().unwrap().push(port);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.refusals {
            ProbeResult::reachable(Duration::from_millis(120))
        } else {
            ProbeResult::failed(ProbeErrorKind::Refused)
        }
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Options {
    balance: i64,
    specs: Option<DetectedSpecs>,
    install_time: Duration,
    install_fails: bool,
    refusals: u32,
    refund_on_failure: bool,
    ledger_latency: Duration,
    detect_time: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            balance: 5000,
            specs: Some(specs(4, 8.0, 80)),
            install_time: Duration::from_secs(300),
            install_fails: false,
            refusals: 3,
            refund_on_failure: false,
            ledger_latency: Duration::ZERO,
            detect_time: Duration::ZERO,
        }
    }
}

struct Harness {
    workflow: Workflow,
    transport: Arc<MockTransport>,
    ledger: Arc<MockLedger>,
    detector: Arc<MockDetector>,
    provisioner: Arc<MockProvisioner>,
    probe: Arc<MockProbe>,
    next_message: i64,
}

fn specs(cores: u32, memory_gb: f64, disk_gb: u32) -> DetectedSpecs {
    DetectedSpecs {
        cpu_cores: cores,
        cpu_model: "AMD EPYC 7B13".into(),
        memory_gb,
        disk_gb,
        hostname: "vps-1".into(),
        os_description: "Debian GNU/Linux 12 (bookworm)".into(),
        kvm_capable: true,
    }
}

fn settings(refund_on_failure: bool) -> Settings {
    Settings {
        templated_cost: 1000,
        dedicated_cost: 3000,
        poll_interval: Duration::from_secs(30),
        probe_timeout: Duration::from_secs(5),
        monitor_deadline: Duration::from_secs(2700),
        monitor_start_delay: Duration::from_secs(120),
        progress_interval: Duration::from_secs(15),
        refund_on_failure,
    }
}

fn harness(options: Options) -> Harness {
    let transport = Arc::new(MockTransport::default());
    let mut ledger = MockLedger::with_balance(USER, options.balance);
    ledger.latency = options.ledger_latency;
    let ledger = Arc::new(ledger);
    let detector = Arc::new(MockDetector {
        specs: options.specs,
        credentials: Mutex::new(Vec::new()),
        duration: options.detect_time,
    });
    let provisioner = Arc::new(MockProvisioner {
        plans: Mutex::new(Vec::new()),
        duration: options.install_time,
        fail: options.install_fails,
    });
    let probe = Arc::new(MockProbe {
        refusals: options.refusals,
        calls: AtomicU32::new(0),
        ports: Mutex::new(Vec::new()),
    });

    let workflow = Workflow::new(
        Collaborators {
            transport: transport.clone(),
            ledger: ledger.clone(),
            detector: detector.clone(),
            provisioner: provisioner.clone(),
            probe: probe.clone(),
        },
        SessionStore::new(Duration::from_secs(30 * 60)),
        Catalog::builtin(),
        settings(options.refund_on_failure),
    );

    Harness {
        workflow,
        transport,
        ledger,
        detector,
        provisioner,
        probe,
        next_message: 1000,
    }
}

impl Harness {
    /// The menu message an install button was pressed on.
    async fn menu(&self) -> MessageRef {
        self.transport.send_message(CHAT, "menu", None).await.unwrap()
    }

    async fn start(&self, kind: InstallKind) -> MessageRef {
        let prompt = self.menu().await;
        self.workflow
            .start_workflow(CHAT, USER, kind, prompt)
            .await
            .unwrap();
        prompt
    }

    /// Send `text` as a user message and return its id.
    async fn say(&mut self, text: &str) -> i64 {
        self.next_message += 1;
        let message = MessageRef {
            chat_id: CHAT,
            message_id: self.next_message,
        };
        self.workflow
            .handle_step_input(CHAT, Input::Text {
                message,
                text: text.to_string(),
            })
            .await
            .unwrap();
        self.next_message
    }

    async fn press(&self, action: Action) {
        self.workflow
            .handle_step_input(CHAT, Input::Button(action))
            .await
            .unwrap();
    }

    fn text(&mut self, text: &str) -> Input {
        self.next_message += 1;
        Input::Text {
            message: MessageRef {
                chat_id: CHAT,
                message_id: self.next_message,
            },
            text: text.to_string(),
        }
    }

    fn step(&self) -> Option<&'static str> {
        self.workflow
            .store()
            .provisioning
            .get(CHAT)
            .map(|s| s.step.name())
    }

    /// Walk from the start to the point where the install is running.
    async fn install(&mut self, kind: InstallKind, product: u32) -> MessageRef {
        let prompt = self.start(kind).await;
        self.say("203.0.113.5").await;
        self.say("root-secret").await;
        self.press(Action::Catalog(product)).await;
        self.say("Passw0rd!").await;
        prompt
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dedicated_install_reaches_rdp() {
    let mut h = harness(Options {
        refusals: 0,
        ..Options::default()
    });

    let prompt = h.start(InstallKind::Dedicated).await;
    assert_eq!(h.ledger.amount(USER), 2000);
    assert_eq!(h.step(), Some("awaiting_host"));

    h.say("203.0.113.5").await;
    assert_eq!(h.step(), Some("awaiting_root_credential"));

    let credential_message = h.say("root-secret").await;
    assert!(h.transport.deleted().contains(&credential_message));
    assert_eq!(h.detector.credentials.lock().unwrap().len(), 1);
    assert_eq!(h.step(), Some("awaiting_catalog_choice"));

    h.press(Action::Catalog(2)).await;
    assert_eq!(h.step(), Some("awaiting_new_password"));

    let password_message = h.say("Passw0rd!").await;
    assert!(h.transport.deleted().contains(&password_message));
    assert_eq!(h.step(), Some("provisioning"));

    h.workflow.wait_idle().await;

    assert!(!h.workflow.has_session(CHAT));
    assert_eq!(
        *h.provisioner.plans.lock().unwrap(),
        [InstallPlan::Dedicated {
            image: "win_22".into(),
            password: Secret::new("Passw0rd!"),
        }]
    );
    assert_eq!(*h.probe.ports.lock().unwrap(), [8765]);

    let report = h.transport.last_edit(prompt);
    assert!(report.contains("RDP is ready"), "{report}");
    assert!(report.contains("203.0.113.5:8765"));
    assert!(report.contains("administrator"));
    assert!(report.contains("Passw0rd!"));
    assert!(report.contains("Windows Server 2022"));
    assert!(report.contains("120 ms"));

    let details = h.transport.last_message();
    assert!(details.contains("Connection details"));
    assert!(details.contains("203.0.113.5:8765"));

    h.say("hello").await;
    assert!(h.transport.last_message().contains("No active session"));
}

#[tokio::test(start_paused = true)]
async fn templated_plan_leaves_headroom_for_the_host() {
    let mut h = harness(Options::default());

    let prompt = h.install(InstallKind::Templated, 1).await;
    assert_eq!(h.ledger.amount(USER), 4000);
    h.workflow.wait_idle().await;

    assert_eq!(
        *h.provisioner.plans.lock().unwrap(),
        [InstallPlan::Templated {
            image: "11".into(),
            capacity: Capacity {
                cpu_cores: 4,
                memory_gb: 6.0,
                disk_gb: 70,
            },
            password: Secret::new("Passw0rd!"),
            kvm: true,
        }]
    );
    assert_eq!(*h.probe.ports.lock().unwrap(), [3389; 4]);
    assert!(h.transport.last_edit(prompt).contains("203.0.113.5:3389"));
}

#[tokio::test(start_paused = true)]
async fn insufficient_balance_starts_nothing() {
    let h = harness(Options {
        balance: 500,
        ..Options::default()
    });

    let prompt = h.start(InstallKind::Templated).await;

    assert!(!h.workflow.has_session(CHAT));
    assert_eq!(h.ledger.amount(USER), 500);
    let text = h.transport.last_edit(prompt);
    assert!(text.contains("Insufficient balance"), "{text}");
    assert!(text.contains("1000"));
}

#[tokio::test(start_paused = true)]
async fn second_start_does_not_charge_again() {
    let h = harness(Options::default());

    h.start(InstallKind::Templated).await;
    let second = h.start(InstallKind::Dedicated).await;

    assert_eq!(h.ledger.amount(USER), 4000);
    assert_eq!(h.step(), Some("awaiting_host"));
    assert!(h.transport.last_edit(second).contains("already have an installation"));
}

#[tokio::test(start_paused = true)]
async fn double_tapped_install_charges_once() {
    let h = harness(Options {
        ledger_latency: Duration::from_millis(10),
        ..Options::default()
    });
    let (first, second) = (h.menu().await, h.menu().await);

    let (a, b) = tokio::join!(
        h.workflow.start_workflow(CHAT, USER, InstallKind::Templated, first),
        h.workflow.start_workflow(CHAT, USER, InstallKind::Templated, second)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.ledger.amount(USER), 4000);
    assert_eq!(h.workflow.store().provisioning.len(), 1);
    assert_eq!(h.step(), Some("awaiting_host"));
    let mut screens = [h.transport.last_edit(first), h.transport.last_edit(second)];
    screens.sort_by_key(|text| text.contains("already have an installation"));
    assert!(screens[0].contains("IP address"), "{}", screens[0]);
    assert!(screens[1].contains("already have an installation"), "{}", screens[1]);
}

#[tokio::test(start_paused = true)]
async fn cancel_while_charging_refunds() {
    let h = harness(Options {
        ledger_latency: Duration::from_millis(10),
        ..Options::default()
    });
    let prompt = h.menu().await;

    let workflow = h.workflow.clone();
    let start = tokio::spawn(async move {
        workflow
            .start_workflow(CHAT, USER, InstallKind::Templated, prompt)
            .await
    });
    tokio::time::sleep(Duration::from_millis(1)).await;
    h.workflow.cancel(CHAT).await.unwrap();
    start.await.unwrap().unwrap();

    assert!(!h.workflow.has_session(CHAT));
    assert_eq!(h.ledger.refunds(), [(USER, 1000)]);
    assert_eq!(h.ledger.amount(USER), 5000);
    assert!(h.transport.last_edit(prompt).contains("Installation cancelled"));
}

#[tokio::test(start_paused = true)]
async fn racing_passwords_start_one_install() {
    let mut h = harness(Options::default());
    h.start(InstallKind::Templated).await;
    h.say("203.0.113.5").await;
    h.say("root-secret").await;
    h.press(Action::Catalog(1)).await;

    let (first, second) = (h.text("Passw0rd!"), h.text("Other0ne!"));
    let (a, b) = tokio::join!(
        h.workflow.handle_step_input(CHAT, first),
        h.workflow.handle_step_input(CHAT, second)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.step(), Some("provisioning"));
    assert!(h.transport.last_message().contains("busy"));
    h.workflow.wait_idle().await;

    let plans = h.provisioner.plans.lock().unwrap().clone();
    assert_eq!(plans.len(), 1);
    match &plans[0] {
        InstallPlan::Templated { password, .. } => {
            assert!(["Passw0rd!", "Other0ne!"].contains(&password.expose()))
        }
        other => panic!("unexpected plan {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn racing_credentials_detect_once() {
    let mut h = harness(Options::default());
    h.start(InstallKind::Templated).await;
    h.say("203.0.113.5").await;

    let (first, second) = (h.text("root-secret"), h.text("other-secret"));
    let (a, b) = tokio::join!(
        h.workflow.handle_step_input(CHAT, first),
        h.workflow.handle_step_input(CHAT, second)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(*h.detector.credentials.lock().unwrap(), ["root-secret"]);
    assert_eq!(h.step(), Some("awaiting_catalog_choice"));
    // Both credential messages are removed from the chat.
    assert_eq!(h.transport.deleted().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_catalog_id_keeps_the_picker() {
    let mut h = harness(Options::default());
    let prompt = h.start(InstallKind::Dedicated).await;
    h.say("203.0.113.5").await;
    h.say("root-secret").await;
    let before = h.workflow.store().provisioning.get(CHAT).unwrap();

    h.press(Action::Catalog(999)).await;

    let after = h.workflow.store().provisioning.get(CHAT).unwrap();
    assert_eq!(after.step.name(), "awaiting_catalog_choice");
    assert_eq!((after.id, after.revision), (before.id, before.revision));
    assert!(h.transport.last_edit(prompt).contains("Unknown system"));

    h.press(Action::Catalog(2)).await;
    assert_eq!(h.step(), Some("awaiting_new_password"));
}

#[tokio::test(start_paused = true)]
async fn invalid_address_stays_on_host_step() {
    let mut h = harness(Options::default());

    let prompt = h.start(InstallKind::Templated).await;
    h.say("999.1.1.1").await;

    assert_eq!(h.step(), Some("awaiting_host"));
    assert!(h.transport.last_edit(prompt).contains("not a valid IPv4 address"));
    assert!(h.detector.credentials.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn weak_password_is_asked_again() {
    let mut h = harness(Options::default());

    let prompt = h.start(InstallKind::Templated).await;
    h.say("203.0.113.5").await;
    h.say("root-secret").await;
    h.press(Action::Catalog(12)).await;
    let message = h.say("short").await;

    assert!(h.transport.deleted().contains(&message));
    assert_eq!(h.step(), Some("awaiting_new_password"));
    assert!(h.transport.last_edit(prompt).contains("at least 8 characters"));
    assert!(h.provisioner.plans.lock().unwrap().is_empty());

    h.press(Action::BackToCatalog).await;
    assert_eq!(h.step(), Some("awaiting_catalog_choice"));
}

#[tokio::test(start_paused = true)]
async fn undersized_vps_ends_the_session() {
    let mut h = harness(Options {
        specs: Some(specs(1, 2.0, 30)),
        ..Options::default()
    });

    let prompt = h.start(InstallKind::Templated).await;
    h.say("203.0.113.5").await;
    h.say("root-secret").await;

    assert!(!h.workflow.has_session(CHAT));
    let text = h.transport.last_edit(prompt);
    assert!(text.contains("too small"), "{text}");
    assert!(text.contains("CPU"));
    assert!(text.contains("RAM"));
    assert!(!text.contains("refunded"));
    assert_eq!(h.ledger.amount(USER), 4000);
}

#[tokio::test(start_paused = true)]
async fn connection_failure_refunds_when_enabled() {
    let mut h = harness(Options {
        specs: None,
        refund_on_failure: true,
        ..Options::default()
    });

    let prompt = h.start(InstallKind::Dedicated).await;
    assert_eq!(h.ledger.amount(USER), 2000);
    h.say("203.0.113.5").await;
    h.say("wrong-password").await;

    assert!(!h.workflow.has_session(CHAT));
    assert_eq!(h.ledger.refunds(), [(USER, 3000)]);
    assert_eq!(h.ledger.amount(USER), 5000);
    let text = h.transport.last_edit(prompt);
    assert!(text.contains("Could not connect"), "{text}");
    assert!(text.contains("3000 has been refunded"));
}

#[tokio::test(start_paused = true)]
async fn failed_install_keeps_the_charge_by_default() {
    let mut h = harness(Options {
        install_fails: true,
        ..Options::default()
    });

    let prompt = h.install(InstallKind::Templated, 1).await;
    h.workflow.wait_idle().await;

    assert!(!h.workflow.has_session(CHAT));
    assert!(h.ledger.refunds().is_empty());
    assert_eq!(h.ledger.amount(USER), 4000);
    let text = h.transport.last_edit(prompt);
    assert!(text.contains("Installation failed"), "{text}");
    assert!(text.contains("docker: command not found"));
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_install_ignores_the_late_result() {
    let mut h = harness(Options {
        install_time: Duration::from_secs(600),
        ..Options::default()
    });

    let prompt = h.install(InstallKind::Dedicated, 2).await;
    assert_eq!(h.step(), Some("provisioning"));

    h.workflow.cancel(CHAT).await.unwrap();
    assert!(!h.workflow.has_session(CHAT));
    assert!(h.transport.last_edit(prompt).contains("Installation cancelled"));

    // A fresh session opened meanwhile must survive the old install finishing.
    h.start(InstallKind::Templated).await;
    h.workflow.wait_idle().await;

    assert_eq!(h.step(), Some("awaiting_host"));
    assert!(h.transport.last_edit(prompt).contains("Installation cancelled"));
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 0);
    assert!(h.ledger.refunds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_detection_drops_the_result() {
    let mut h = harness(Options {
        detect_time: Duration::from_secs(10),
        ..Options::default()
    });
    let prompt = h.start(InstallKind::Templated).await;
    h.say("203.0.113.5").await;

    let credential = h.text("root-secret");
    let workflow = h.workflow.clone();
    let detection = tokio::spawn(async move { workflow.handle_step_input(CHAT, credential).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.step(), Some("probing_capability"));

    h.workflow.cancel(CHAT).await.unwrap();
    detection.await.unwrap().unwrap();

    assert!(!h.workflow.has_session(CHAT));
    assert!(h.transport.last_edit(prompt).contains("Installation cancelled"));
    assert!(!h.transport.log().iter().any(|s| matches!(s, Sent::Edit { text, .. } if text.contains("VPS verified"))));
    assert!(h.ledger.refunds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_readiness_stops_probing() {
    let mut h = harness(Options {
        refusals: u32::MAX,
        ..Options::default()
    });
    let prompt = h.install(InstallKind::Templated, 1).await;

    // Install takes 300 s, then a probe every 30 s.
    tokio::time::sleep(Duration::from_secs(370)).await;
    assert_eq!(h.step(), Some("monitoring_readiness"));
    let probes = h.probe.calls.load(Ordering::SeqCst);
    assert!(probes > 0);

    h.workflow.cancel(CHAT).await.unwrap();
    h.workflow.wait_idle().await;

    assert_eq!(h.probe.calls.load(Ordering::SeqCst), probes);
    assert!(!h.workflow.has_session(CHAT));
    let text = h.transport.last_edit(prompt);
    assert!(text.contains("Installation cancelled"), "{text}");
}

#[tokio::test(start_paused = true)]
async fn rdp_that_never_answers_gets_a_soft_report() {
    let mut h = harness(Options {
        refusals: u32::MAX,
        ..Options::default()
    });

    let prompt = h.install(InstallKind::Templated, 4).await;
    h.workflow.wait_idle().await;

    assert!(!h.workflow.has_session(CHAT));
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 90);
    let text = h.transport.last_edit(prompt);
    assert!(text.contains("RDP not reachable yet"), "{text}");
    assert!(text.contains("Passw0rd!"));
    assert!(h.ledger.refunds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_session_expires() {
    let mut h = harness(Options::default());

    h.start(InstallKind::Templated).await;
    h.say("203.0.113.5").await;

    tokio::time::advance(Duration::from_secs(31 * 60)).await;
    h.workflow.store().sweep_expired();
    assert!(!h.workflow.has_session(CHAT));

    h.say("root-secret").await;
    assert!(h.transport.last_message().contains("No active session"));
    assert!(h.detector.credentials.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_without_session() {
    let h = harness(Options::default());
    h.workflow.cancel(CHAT).await.unwrap();
    assert_eq!(h.transport.last_message(), "There is nothing to cancel.");
}
