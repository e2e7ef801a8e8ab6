//! Host wiring
//!
//! [`Autocall`] owns one redial orchestrator and one call-UI watcher and
//! connects both to the same phone host. The two components share the
//! host but not each other; the watcher only sees the orchestrator's status
//! channel when `active_run_only` is configured.

use std::sync::Arc;

use autocall_call_ui_watcher::{CallUiWatcher, UiAutomation, WindowStateEvent};
use autocall_redial_core::{
    Capability, Dialer, RedialError, RedialEvent, RedialOrchestrator, RetryConfig, RunId, RunOutcome,
    TelephonyHost, TimerService, TokioTimerService,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AutocallConfig;
use crate::error::AutocallResult;
use crate::simulation::{PhoneScript, SimulatedPhone};

/// Result of one completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub dials_placed: u32,
}

/// Builder for [`Autocall`]
pub struct AutocallBuilder {
    config: AutocallConfig,
    timers: Option<Arc<dyn TimerService>>,
}

impl AutocallBuilder {
    /// Timer service shared by orchestrator and watcher (defaults to Tokio timers)
    pub fn timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Wire against a host that provides every capability
    ///
    /// `windows` carries the host's window-state notifications to the watcher.
    pub fn build<H>(self, host: Arc<H>, windows: mpsc::Receiver<WindowStateEvent>) -> AutocallResult<Autocall>
    where
        H: Dialer + TelephonyHost + UiAutomation + 'static,
    {
        self.config.validate()?;
        let timers: Arc<dyn TimerService> = match self.timers {
            Some(timers) => timers,
            None => Arc::new(TokioTimerService::from_current()?),
        };

        let orchestrator = RedialOrchestrator::builder(host.clone(), host.clone())
            .timers(timers.clone())
            .spawn()?;

        let mut watcher = CallUiWatcher::builder(self.config.watcher.clone(), host).timers(timers);
        if self.config.watcher.active_run_only {
            watcher = watcher.run_status(orchestrator.status_watch());
        }
        let watcher = watcher.build()?;
        if self.config.watcher.enabled {
            watcher.on_service_connected();
        } else {
            warn!(
                "{}; the call screen is not watched",
                RedialError::capability_missing(Capability::AccessibilityAutomation)
            );
        }
        let watcher_task = watcher.spawn(windows);

        Ok(Autocall {
            config: self.config,
            orchestrator,
            watcher,
            watcher_task,
        })
    }

    /// Wire against a fresh [`SimulatedPhone`]
    pub fn build_simulated(self, script: PhoneScript) -> AutocallResult<(Autocall, SimulatedPhone)> {
        let (phone, windows) = SimulatedPhone::new(script);
        let app = self.build(Arc::new(phone.clone()), windows)?;
        Ok((app, phone))
    }
}

/// A redial orchestrator and call-UI watcher attached to one host
pub struct Autocall {
    config: AutocallConfig,
    orchestrator: RedialOrchestrator,
    watcher: CallUiWatcher,
    watcher_task: JoinHandle<()>,
}

impl Autocall {
    pub fn builder(config: AutocallConfig) -> AutocallBuilder {
        AutocallBuilder {
            config,
            timers: None,
        }
    }

    pub fn config(&self) -> &AutocallConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &RedialOrchestrator {
        &self.orchestrator
    }

    pub fn watcher(&self) -> &CallUiWatcher {
        &self.watcher
    }

    /// Host capability whose absence leaves a component inert
    ///
    /// Reports [`Capability::AccessibilityAutomation`] while the watcher is
    /// disabled or its automation service is disconnected.
    pub fn missing_capability(&self) -> Option<Capability> {
        if self.watcher.is_active() {
            None
        } else {
            Some(Capability::AccessibilityAutomation)
        }
    }

    /// Start a run and wait for it to finish
    pub async fn run(&self, retry: RetryConfig) -> AutocallResult<RunReport> {
        let mut events = self.orchestrator.event_receiver();
        let run_id = self.orchestrator.start(retry).await?;
        info!("Run {} started", run_id);

        loop {
            match events.recv().await {
                Ok(RedialEvent::RunFinished {
                    run_id: finished,
                    outcome,
                    dials_placed,
                }) if finished == run_id => {
                    info!("Run {} finished: {:?} after {} dials", run_id, outcome, dials_placed);
                    return Ok(RunReport {
                        run_id,
                        outcome,
                        dials_placed,
                    });
                }
                Ok(event) => debug!("Event: {:?}", event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} orchestrator events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(RedialError::NotRunning.into()),
            }
        }
    }

    /// Cancel the active run
    pub async fn stop(&self) -> AutocallResult<()> {
        self.orchestrator.stop().await?;
        Ok(())
    }

    /// Stop everything and wait for the control task to end
    pub async fn shutdown(self) -> AutocallResult<()> {
        self.watcher.on_service_disconnected();
        self.watcher_task.abort();
        self.orchestrator.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_disabled_watcher_reports_missing_automation() {
        let mut config = AutocallConfig::new();
        config.watcher.enabled = false;
        let (app, _phone) = Autocall::builder(config)
            .build_simulated(PhoneScript::default())
            .unwrap();

        assert_eq!(app.missing_capability(), Some(Capability::AccessibilityAutomation));
        assert!(logs_contain("Missing capability: accessibility automation"));
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnected_service_reports_missing_automation() {
        let (app, _phone) = Autocall::builder(AutocallConfig::new())
            .build_simulated(PhoneScript::default())
            .unwrap();
        assert_eq!(app.missing_capability(), None);

        app.watcher().on_service_disconnected();
        assert_eq!(app.missing_capability(), Some(Capability::AccessibilityAutomation));
        app.shutdown().await.unwrap();
    }
}
