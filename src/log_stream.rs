//! `/logs` channel: raw agent log lines into a shared [`LogManager`].

use std::sync::Arc;

use crate::channel::ChannelCore;
use crate::connection::{Action, ConnectionMachine, ConnectionState, ReconnectPolicy};
use crate::logging::LogManager;

pub struct LogsChannel {
    machine: ConnectionMachine,
    log_manager: Arc<LogManager>,
}

impl LogsChannel {
    pub fn new(policy: ReconnectPolicy, log_manager: Arc<LogManager>) -> Self {
        Self {
            machine: ConnectionMachine::new(policy),
            log_manager,
        }
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }
}

impl ChannelCore for LogsChannel {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    fn start(&mut self) -> Action {
        self.machine.start()
    }

    fn handle_open(&mut self) -> Vec<String> {
        self.machine.opened();
        Vec::new()
    }

    fn handle_text(&mut self, text: &str) {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            self.log_manager.push_line(line);
        }
    }

    fn handle_closed(&mut self) -> Action {
        self.machine.closed()
    }

    fn handle_retry_due(&mut self) -> Action {
        self.machine.retry_due()
    }

    fn force_reconnect(&mut self) -> Action {
        self.machine.force_reconnect()
    }

    fn close(&mut self) {
        self.machine.close();
    }
}
