//! Message texts and keyboards. All text is Telegram HTML.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use rb_infra::DetectedSpecs;

use crate::action::Action;
use crate::catalog::{Catalog, CatalogEntry};
use crate::ledger::{Account, Balance};
use crate::monitor::{MonitorEvent, MonitorOutcome};
use crate::probe::ProbeResult;
use crate::session::{InstallKind, Shortfall, UserId, VerifiedTarget};
use crate::transport::{Button, Keyboard};

pub const RDP_USERNAME: &str = "administrator";

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn minutes(elapsed: Duration) -> u64 {
    elapsed.as_secs() / 60
}

fn error_line(error: Option<&str>) -> String {
    error.map(|e| format!("❌ {}\n\n", escape(e))).unwrap_or_default()
}

// ── Keyboards ───────────────────────────────────────────────────────

pub fn cancel_keyboard() -> Keyboard {
    vec![vec![Button::new("❌ Cancel", Action::CancelInstallation)]]
}

fn menu_row() -> Vec<Button> {
    vec![Button::new("🏠 Main menu", Action::BackToMenu)]
}

pub fn menu_keyboard() -> Keyboard {
    vec![menu_row()]
}

fn retry_keyboard(kind: InstallKind) -> Keyboard {
    vec![vec![Button::new("🔄 Try again", Action::Install(kind))], menu_row()]
}

pub fn main_menu(balance: Balance) -> (String, Keyboard) {
    let text = format!(
        "🖥 <b>RDP Installer</b>\n\n\
         Turn a Linux VPS into a Windows remote desktop.\n\n\
         💰 Balance: <b>{balance}</b>"
    );
    let keyboard = vec![
        vec![Button::new("🐳 Docker RDP", Action::Install(InstallKind::Templated))],
        vec![Button::new("🖥 Dedicated RDP", Action::Install(InstallKind::Dedicated))],
        vec![Button::new("💳 Deposit", Action::Deposit)],
        vec![
            Button::new("📚 Tutorial", Action::Tutorial),
            Button::new("❓ FAQ", Action::Faq),
        ],
    ];
    (text, keyboard)
}

// ── Conversation steps ──────────────────────────────────────────────

pub fn insufficient_balance(kind: InstallKind, cost: i64, balance: Balance) -> (String, Keyboard) {
    let text = format!(
        "💸 <b>Insufficient balance</b>\n\n\
         {} costs <b>{cost}</b>, your balance is <b>{balance}</b>.\n\
         Top up and try again.",
        kind.label()
    );
    (text, vec![vec![Button::new("💳 Deposit", Action::Deposit)], menu_row()])
}

pub fn already_running() -> (String, Keyboard) {
    (
        "⚠️ You already have an installation in progress. Finish or cancel it first.".into(),
        cancel_keyboard(),
    )
}

pub fn ask_host(kind: InstallKind, error: Option<&str>) -> (String, Keyboard) {
    let requirements = kind.requirements();
    let text = format!(
        "{}🖥 <b>{}</b>\n\n\
         Minimum VPS: {} CPU, {} GB RAM, {} GB disk.\n\n\
         Send the <b>IP address</b> of your VPS:",
        error_line(error),
        kind.label(),
        requirements.min_cores,
        requirements.min_memory_gb,
        requirements.min_disk_gb,
    );
    (text, cancel_keyboard())
}

pub fn ask_credential(host: Ipv4Addr) -> (String, Keyboard) {
    let text = format!(
        "🔑 Send the <b>root password</b> for <code>{host}</code>.\n\n\
         The message is deleted as soon as it arrives."
    );
    (text, cancel_keyboard())
}

pub fn probing(host: Ipv4Addr) -> String {
    format!("🔍 Connecting to <code>{host}</code> and checking its specs...")
}

fn specs_block(specs: &DetectedSpecs) -> String {
    format!(
        "🏷 Hostname: <code>{}</code>\n\
         🧠 CPU: {} cores ({})\n\
         💾 RAM: {} GB\n\
         💿 Disk: {} GB\n\
         🐧 OS: {}",
        escape(&specs.hostname),
        specs.cpu_cores,
        escape(&specs.cpu_model),
        specs.memory_gb,
        specs.disk_gb,
        escape(&specs.os_description),
    )
}

pub fn picker(
    kind: InstallKind,
    target: &VerifiedTarget,
    catalog: &Catalog,
    error: Option<&str>,
) -> (String, Keyboard) {
    let mut text = format!(
        "{}✅ <b>VPS verified</b>\n\n{}\n\n",
        error_line(error),
        specs_block(&target.specs)
    );
    if kind == InstallKind::Templated && !target.specs.kvm_capable {
        text.push_str("⚠️ KVM is not available on this VPS. Windows will run without acceleration and may be slow.\n\n");
    }
    text.push_str("Choose the Windows version:");

    let mut keyboard: Keyboard = Vec::new();
    for (_, entries) in catalog.tiers(kind) {
        for pair in entries.chunks(2) {
            keyboard.push(
                pair.iter()
                    .map(|e| Button::new(format!("{} ({})", e.name, e.tier), Action::Catalog(e.id)))
                    .collect(),
            );
        }
    }
    keyboard.extend(cancel_keyboard());
    (text, keyboard)
}

pub fn ask_password(
    kind: InstallKind,
    target: &VerifiedTarget,
    product: &CatalogEntry,
    charged: i64,
    error: Option<&str>,
) -> (String, Keyboard) {
    let capacity = kind.capacity(&target.specs);
    let charged = if charged > 0 {
        format!("💰 Paid: {charged}\n")
    } else {
        String::new()
    };
    let text = format!(
        "{}📋 <b>Configuration</b>\n\n\
         🌐 Host: <code>{}</code>\n\
         🪟 System: {} ({})\n\
         🧠 CPU: {} cores\n\
         💾 RAM: {} GB\n\
         💿 Disk: {} GB\n\
         {charged}\n\
         Send the <b>RDP password</b> to set: at least 8 characters with letters and digits. \
         Allowed symbols: <code>@#$%^&amp;+=!*?._-</code>",
        error_line(error),
        target.host,
        escape(&product.name),
        product.tier,
        capacity.cpu_cores,
        capacity.memory_gb,
        capacity.disk_gb,
    );
    let keyboard = vec![
        vec![Button::new("⬅️ Back", Action::BackToCatalog)],
        vec![Button::new("❌ Cancel", Action::CancelInstallation)],
    ];
    (text, keyboard)
}

pub fn busy(step: &str) -> String {
    format!("⏳ Please wait, the installer is busy ({step}).")
}

pub fn use_buttons() -> &'static str {
    "Please choose one of the buttons."
}

pub fn installing(
    kind: InstallKind,
    host: Ipv4Addr,
    product: &CatalogEntry,
    elapsed: Duration,
    tail: &VecDeque<String>,
) -> (String, Keyboard) {
    let mut text = format!(
        "⚙️ <b>Installing {}</b>\n\n\
         🌐 Host: <code>{host}</code>\n\
         🪟 System: {}\n\
         ⏱ Elapsed: {} min",
        kind.label(),
        escape(&product.name),
        minutes(elapsed),
    );
    if !tail.is_empty() {
        let lines: Vec<String> = tail.iter().map(|l| escape(l)).collect();
        text.push_str(&format!("\n\n<pre>{}</pre>", lines.join("\n")));
    }
    (text, cancel_keyboard())
}

pub fn waiting_for_rdp(host: Ipv4Addr, port: u16, event: Option<&MonitorEvent>) -> (String, Keyboard) {
    let mut text = format!(
        "🪟 <b>Windows is being set up</b>\n\n\
         Waiting for RDP on <code>{host}:{port}</code>. This usually takes 5 to 15 minutes."
    );
    if let Some(event) = event {
        let status = event
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "probe failed".into());
        text.push_str(&format!(
            "\n\n🔁 Check {}/{}: {status}\n⏱ {} min elapsed, {} min left",
            event.attempt,
            event.max_attempts,
            minutes(event.elapsed),
            minutes(event.remaining),
        ));
    }
    (text, cancel_keyboard())
}

// ── Outcomes ────────────────────────────────────────────────────────

pub struct Report<'a> {
    pub kind: InstallKind,
    pub host: Ipv4Addr,
    pub product: &'a CatalogEntry,
    pub password: &'a str,
    pub elapsed: Duration,
}

impl Report<'_> {
    fn port(&self) -> u16 {
        self.kind.rdp_port()
    }

    fn test_button(&self) -> Button {
        Button::new(
            "🔌 Test RDP",
            Action::TestRdp {
                host: self.host,
                port: self.port(),
            },
        )
    }
}

pub fn success(report: &Report<'_>, outcome: &MonitorOutcome) -> (String, Keyboard) {
    let latency = outcome
        .latency
        .map(|l| format!("{} ms", l.as_millis()))
        .unwrap_or_else(|| "n/a".into());
    let text = format!(
        "🎉 <b>RDP is ready!</b>\n\n\
         🖥 Address: <code>{}:{}</code>\n\
         👤 Username: <code>{RDP_USERNAME}</code>\n\
         🔑 Password: <code>{}</code>\n\
         🪟 System: {}\n\
         ⏱ Install time: {} min\n\
         📶 Latency: {latency}",
        report.host,
        report.port(),
        escape(report.password),
        escape(&report.product.name),
        minutes(report.elapsed),
    );
    let keyboard = vec![
        vec![report.test_button()],
        vec![Button::new("📖 How to connect", Action::ConnectionGuide)],
        menu_row(),
    ];
    (text, keyboard)
}

/// Standalone message that stays in the chat after the prompt moves on.
pub fn connection_details(report: &Report<'_>) -> String {
    format!(
        "📌 <b>Connection details</b>\n\n\
         <code>{}:{}</code>\n\
         <code>{RDP_USERNAME}</code>\n\
         <code>{}</code>",
        report.host,
        report.port(),
        escape(report.password),
    )
}

pub fn soft_timeout(report: &Report<'_>) -> (String, Keyboard) {
    let text = format!(
        "⌛ <b>Installation finished, RDP not reachable yet</b>\n\n\
         Windows may still be completing setup. Try connecting in a few minutes.\n\n\
         🖥 Address: <code>{}:{}</code>\n\
         👤 Username: <code>{RDP_USERNAME}</code>\n\
         🔑 Password: <code>{}</code>",
        report.host,
        report.port(),
        escape(report.password),
    );
    let check = Button::new(
        "🔁 Check again",
        Action::CheckRdp {
            host: report.host,
            port: report.port(),
        },
    );
    (text, vec![vec![check], menu_row()])
}

pub fn connectivity_failure(kind: InstallKind, host: Ipv4Addr, detail: &str, refund: Option<i64>) -> (String, Keyboard) {
    let text = format!(
        "🔌 <b>Could not connect to <code>{host}</code></b>\n\n\
         Check that the IP and root password are correct and that SSH is open on port 22.\n\n\
         <i>{}</i>{}",
        escape(detail),
        refund_line(refund),
    );
    (text, retry_keyboard(kind))
}

pub fn requirements_not_met(kind: InstallKind, shortfalls: &[Shortfall], refund: Option<i64>) -> (String, Keyboard) {
    let mut text = format!("📉 <b>This VPS is too small for {}</b>\n\n", kind.label());
    for s in shortfalls {
        text.push_str(&format!(
            "• {}: {} (needs {})\n",
            s.resource, s.actual, s.required
        ));
    }
    text.push_str(&refund_line(refund));
    (text, menu_keyboard())
}

pub fn provisioning_failure(kind: InstallKind, detail: &str, refund: Option<i64>) -> (String, Keyboard) {
    let text = format!(
        "💥 <b>Installation failed</b>\n\n\
         The VPS may need a fresh OS before retrying. Make sure it runs a supported \
         Debian or Ubuntu release with outbound internet access.\n\n\
         <i>{}</i>{}",
        escape(detail),
        refund_line(refund),
    );
    (text, retry_keyboard(kind))
}

fn refund_line(refund: Option<i64>) -> String {
    refund
        .map(|amount| format!("\n\n💰 {amount} has been refunded to your balance."))
        .unwrap_or_default()
}

pub fn cancelled() -> (String, Keyboard) {
    ("🚫 Installation cancelled.".into(), menu_keyboard())
}

/// An admin credit or deposit prompt was abandoned.
pub fn cancelled_input() -> (String, Keyboard) {
    ("🚫 Cancelled.".into(), menu_keyboard())
}

pub fn nothing_to_cancel() -> &'static str {
    "There is nothing to cancel."
}

pub fn session_missing() -> (String, Keyboard) {
    (
        "⌛ No active session. It may have expired; use /start to begin again.".into(),
        menu_keyboard(),
    )
}

// ── Info screens ────────────────────────────────────────────────────

/// `1d 4h 12m`, leaving out zero days and hours.
pub fn uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, hours, mins) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    out.push_str(&format!("{mins}m"));
    out
}

pub fn account_status(user: UserId, account: &Account, bot_uptime: Duration) -> (String, Keyboard) {
    let pending = match account.pending_deposit {
        Some(amount) => format!("🟡 {amount} awaiting confirmation"),
        None => "🟢 none".into(),
    };
    let text = format!(
        "📊 <b>Account status</b>\n\n\
         👤 User ID: <code>{user}</code>\n\
         💰 Balance: <b>{}</b>\n\
         📅 Joined: {}\n\
         📋 Pending top-up: {pending}\n\n\
         ⏰ Bot uptime: {}",
        account.balance,
        account.joined.format("%Y-%m-%d"),
        uptime(bot_uptime),
    );
    (text, menu_keyboard())
}

pub fn faq() -> (String, Keyboard) {
    let text = "❓ <b>FAQ</b>\n\n\
        <b>My RDP account got locked out.</b>\n\
        Open <code>secpol.msc</code>, go to Account Policies → Account Lockout Policy \
        and set the lockout threshold to 0.\n\n\
        <b>Bots keep guessing my password on 3389.</b>\n\
        Move RDP to another port: in <code>regedit</code> open \
        <code>HKLM\\System\\CurrentControlSet\\Control\\Terminal Server\\WinStations\\RDP-Tcp</code> \
        and change <code>PortNumber</code>.\n\n\
        <b>The new port does not answer.</b>\n\
        Add inbound and outbound rules for it in <code>wf.msc</code>, then restart the server.";
    (text.into(), menu_keyboard())
}

pub fn tutorial(templated_cost: i64, dedicated_cost: i64) -> (String, Keyboard) {
    let text = format!(
        "📚 <b>How it works</b>\n\n\
         1. Rent a Linux VPS with root SSH access (Ubuntu or Debian).\n\
         2. Top up your balance with 💳 Deposit.\n\
         3. Pick an install type:\n\
         • 🐳 Docker RDP ({templated_cost}): Windows runs in a container next to Linux. \
         Needs 2 CPU, 4 GB RAM, 40 GB disk.\n\
         • 🖥 Dedicated RDP ({dedicated_cost}): Windows replaces Linux. \
         Needs 1 CPU, 1 GB RAM, 20 GB disk.\n\
         4. Send the VPS IP and root password. The password message is deleted at once.\n\
         5. Choose a Windows version and the RDP password to set.\n\
         6. Wait for the install; you get the connection details when RDP answers."
    );
    (text, menu_keyboard())
}

/// Fits the 200 character limit of a callback alert.
pub fn connection_guide() -> &'static str {
    "How to connect:\n\n\
     1. Open Remote Desktop Connection\n\
     2. Enter IP:port (e.g. 1.2.3.4:8765)\n\
     3. Username: administrator\n\
     4. Password: the one you set\n\
     5. Connect"
}

pub fn checking_rdp(host: Ipv4Addr, port: u16) -> String {
    format!("🔍 Checking RDP on <code>{host}:{port}</code>...")
}

pub fn rdp_status(host: Ipv4Addr, port: u16, result: &ProbeResult) -> (String, Keyboard) {
    let text = if result.reachable {
        format!(
            "✅ <b>RDP is up</b>\n\n\
             🖥 <code>{host}:{port}</code> accepts connections. You can connect now."
        )
    } else {
        let reason = result
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "not reachable".into());
        format!(
            "⚠️ <b>RDP not ready yet</b>\n\n\
             🖥 <code>{host}:{port}</code>: {reason}\n\n\
             Windows may still be booting. Wait 5 to 10 minutes and check again."
        )
    };
    let keyboard = vec![
        vec![Button::new("🔁 Check again", Action::CheckRdp { host, port })],
        menu_row(),
    ];
    (text, keyboard)
}

pub fn apology() -> &'static str {
    "⚠️ Something went wrong on our side. Your session was reset; please start again with /start."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Tier;

    #[test]
    fn escapes_html() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn success_report_has_connection_details() {
        let product = CatalogEntry {
            id: 2,
            name: "Windows Server 2022".into(),
            image: "win_22".into(),
            tier: Tier::Standard,
        };
        let report = Report {
            kind: InstallKind::Dedicated,
            host: Ipv4Addr::new(203, 0, 113, 5),
            product: &product,
            password: "Passw0rd!",
            elapsed: Duration::from_secs(7 * 60),
        };
        let outcome = MonitorOutcome {
            ready: true,
            attempts: 1,
            elapsed: Duration::ZERO,
            latency: Some(Duration::from_millis(120)),
        };
        let (text, keyboard) = success(&report, &outcome);
        assert!(text.contains("203.0.113.5:8765"));
        assert!(text.contains("administrator"));
        assert!(text.contains("Passw0rd!"));
        assert!(text.contains("120 ms"));
        assert!(text.contains("7 min"));
        assert_eq!(keyboard[0][0].action.to_string(), "test_rdp:203.0.113.5:8765");
        assert_eq!(keyboard[1][0].action, Action::ConnectionGuide);
    }

    #[test]
    fn password_prompt_shows_what_was_paid() {
        let target = VerifiedTarget {
            host: Ipv4Addr::new(203, 0, 113, 5),
            credential: rb_infra::Secret::new("root-pass"),
            specs: DetectedSpecs {
                cpu_cores: 2,
                cpu_model: "Test CPU".into(),
                memory_gb: 4.0,
                disk_gb: 40,
                hostname: "box".into(),
                os_description: "Debian 12".into(),
                kvm_capable: true,
            },
        };
        let product = CatalogEntry {
            id: 11,
            name: "Windows Server 2022 Lite".into(),
            image: "win_2022_lite".into(),
            tier: Tier::Lite,
        };
        let (text, _) = ask_password(InstallKind::Dedicated, &target, &product, 3000, None);
        assert!(text.contains("Paid: 3000"));

        let (text, _) = ask_password(InstallKind::Dedicated, &target, &product, 0, None);
        assert!(!text.contains("Paid"));
    }

    #[test]
    fn uptime_drops_empty_units() {
        assert_eq!(uptime(Duration::from_secs(59)), "0m");
        assert_eq!(uptime(Duration::from_secs(3 * 3600 + 5 * 60)), "3h 5m");
        assert_eq!(uptime(Duration::from_secs(86_400 + 42 * 60)), "1d 42m");
    }

    #[test]
    fn connection_guide_fits_an_alert() {
        assert!(connection_guide().chars().count() <= 200);
    }

    #[test]
    fn rdp_recheck_offers_another_check() {
        let host = Ipv4Addr::new(203, 0, 113, 5);
        let (text, keyboard) = rdp_status(host, 3389, &ProbeResult::failed(crate::probe::ProbeErrorKind::Timeout));
        assert!(text.contains("not ready yet"));
        assert_eq!(keyboard[0][0].action, Action::CheckRdp { host, port: 3389 });

        let (text, _) = rdp_status(host, 3389, &ProbeResult::reachable(Duration::from_millis(40)));
        assert!(text.contains("RDP is up"));
    }

    #[test]
    fn status_reports_pending_top_up() {
        let account = Account {
            balance: Balance::Amount(2500),
            joined: chrono::DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            pending_deposit: Some(10_000),
        };
        let (text, _) = account_status(7, &account, Duration::from_secs(90 * 60));
        assert!(text.contains("<code>7</code>"));
        assert!(text.contains("2026-03-01"));
        assert!(text.contains("10000 awaiting confirmation"));
        assert!(text.contains("1h 30m"));
    }

    #[test]
    fn failure_reports_mention_refund_only_when_given() {
        let shortfalls = [Shortfall {
            resource: "RAM",
            required: "4 GB".into(),
            actual: "2 GB".into(),
        }];
        let (text, _) = requirements_not_met(InstallKind::Templated, &shortfalls, None);
        assert!(text.contains("RAM: 2 GB (needs 4 GB)"));
        assert!(!text.contains("refunded"));

        let (text, keyboard) = provisioning_failure(InstallKind::Dedicated, "exit <1>", Some(3000));
        assert!(text.contains("exit &lt;1&gt;"));
        assert!(text.contains("3000 has been refunded"));
        assert_eq!(keyboard[0][0].action, Action::Install(InstallKind::Dedicated));
    }
}
