//! Long-running loop around [`BatchScan::run_once`].
//!
//! Faults inside a cycle are reported and the loop keeps going. A fault that
//! escapes the cycle (an error or a panic) is fatal: the operator gets a
//! critical notification and the error is returned to `main`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::notify::{messages, notify_best_effort, Notifier};
use crate::sync::{panic_message, BatchScan};
use crate::systemd::SystemdNotifier;

pub(crate) struct Scheduler {
    scan: BatchScan,
    notifier: Arc<dyn Notifier>,
    systemd: SystemdNotifier,
    /// `None` runs a single cycle.
    interval: Option<Duration>,
}

impl Scheduler {
    pub(crate) fn new(
        scan: BatchScan,
        notifier: Arc<dyn Notifier>,
        systemd: SystemdNotifier,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            scan,
            notifier,
            systemd,
            interval,
        }
    }

    pub(crate) async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let started = messages::started(
            &self.scan.config().album,
            &self.scan.source_description(),
            &self.scan.store_description(),
            self.interval,
        );
        tracing::info!("{}", started);
        notify_best_effort(self.notifier.as_ref(), &started).await;
        self.systemd.notify_ready();

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, exiting...");
                break;
            }

            self.systemd.notify_status("Checking album for new photos");
            let cycle = AssertUnwindSafe(self.scan.run_once(&shutdown))
                .catch_unwind()
                .await;
            let summary = match cycle {
                Ok(Ok(summary)) => summary,
                Ok(Err(e)) => return self.fail(e).await,
                Err(panic) => {
                    let e = anyhow::anyhow!(
                        "sync cycle panicked: {}",
                        panic_message(panic.as_ref())
                    );
                    return self.fail(e).await;
                }
            };

            for text in messages::cycle_messages(&summary) {
                notify_best_effort(self.notifier.as_ref(), &text).await;
            }
            self.systemd.notify_status(&summary.status_line());
            self.systemd.notify_watchdog();

            let Some(interval) = self.interval else {
                break;
            };
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, exiting...");
                break;
            }
            tracing::info!("Waiting {} seconds until the next check...", interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown during wait, exiting...");
                    break;
                }
            }
        }

        self.systemd.notify_stopping();
        notify_best_effort(self.notifier.as_ref(), &messages::stopped()).await;
        Ok(())
    }

    async fn fail(&self, error: anyhow::Error) -> anyhow::Result<()> {
        tracing::error!(error = %format!("{error:#}"), "Sync loop terminated");
        notify_best_effort(self.notifier.as_ref(), &messages::fatal(&error)).await;
        self.systemd.notify_stopping();
        Err(error)
    }
}
