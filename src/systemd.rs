//! Thin wrapper around systemd sd_notify integration.
//!
//! Every method is a no-op when disabled or off Linux, so the scheduler needs
//! no `#[cfg]` of its own.

#[derive(Debug, Clone, Copy)]
pub(crate) struct SystemdNotifier {
    enabled: bool,
}

/// States the scheduler reports.
#[derive(Debug, Clone, Copy)]
enum State<'a> {
    Ready,
    Stopping,
    Status(&'a str),
    Watchdog,
}

impl SystemdNotifier {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `READY=1`: the first cycle is about to start.
    pub(crate) fn notify_ready(&self) {
        self.send(State::Ready);
    }

    pub(crate) fn notify_stopping(&self) {
        self.send(State::Stopping);
    }

    /// `STATUS=<msg>`, shown by `systemctl status`.
    pub(crate) fn notify_status(&self, msg: &str) {
        self.send(State::Status(msg));
    }

    pub(crate) fn notify_watchdog(&self) {
        self.send(State::Watchdog);
    }

    fn send(&self, state: State<'_>) {
        if !self.enabled {
            return;
        }
        send_state(state);
    }
}

#[cfg(target_os = "linux")]
fn send_state(state: State<'_>) {
    use sd_notify::NotifyState;

    let notify_state = match state {
        State::Ready => NotifyState::Ready,
        State::Stopping => NotifyState::Stopping,
        State::Status(msg) => NotifyState::Status(msg),
        State::Watchdog => NotifyState::Watchdog,
    };
    if let Err(e) = sd_notify::notify(false, &[notify_state]) {
        tracing::debug!(error = %e, state = ?state, "sd_notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn send_state(_state: State<'_>) {}
