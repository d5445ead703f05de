use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::messages::{InboundMessage, OutboundMessage};
use super::types::{TaskState, TaskStatus};
use crate::channel::ChannelCore;
use crate::connection::{Action, ConnectionMachine, ConnectionState, ReconnectPolicy};

/// Live tasks keyed by UUID.
pub type TaskRegistry = BTreeMap<String, TaskState>;

/// Everything an observer sees after a mutation.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSnapshot<'a> {
    pub sync_tasks: &'a TaskRegistry,
    pub connected: bool,
    pub connecting: bool,
    pub max_attempts_reached: bool,
}

type SnapshotObserver = Box<dyn FnMut(&ChannelSnapshot<'_>) + Send>;
type RegistryObserver = Box<dyn FnMut(&TaskRegistry) + Send>;

/// Mirror of the agent's task registry plus the `/status` connection state.
///
/// The registry is only written from [`StatusChannel::handle_message`].
pub struct StatusChannel {
    machine: ConnectionMachine,
    tasks: TaskRegistry,
    observers: Vec<SnapshotObserver>,
    task_observers: Vec<RegistryObserver>,
}

impl StatusChannel {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            machine: ConnectionMachine::new(policy),
            tasks: TaskRegistry::new(),
            observers: Vec::new(),
            task_observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&ChannelSnapshot<'_>) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn subscribe_tasks(&mut self, observer: impl FnMut(&TaskRegistry) + Send + 'static) {
        self.task_observers.push(Box::new(observer));
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn task(&self, uuid: &str) -> Option<&TaskState> {
        self.tasks.get(uuid)
    }

    pub fn snapshot(&self) -> ChannelSnapshot<'_> {
        ChannelSnapshot {
            sync_tasks: &self.tasks,
            connected: self.machine.connected(),
            connecting: self.machine.connecting(),
            max_attempts_reached: self.machine.max_attempts_reached(),
        }
    }

    /// Applies one inbound frame. Returns the decoded message for callers
    /// that want to react to types the registry ignores.
    pub fn handle_message(&mut self, raw: &str) -> InboundMessage {
        let message = InboundMessage::decode(raw);
        match &message {
            InboundMessage::State(state) => self.apply_state(state.as_ref().clone()),
            InboundMessage::Pong => debug!("status channel: pong"),
            InboundMessage::Error(reason) => warn!("status channel: {reason}"),
            InboundMessage::Other { kind, .. } => debug!("status channel: ignoring {kind} message"),
        }
        message
    }

    fn apply_state(&mut self, state: TaskState) {
        if state.status == TaskStatus::Removed {
            info!("task {} removed", state.uuid);
            self.tasks.remove(&state.uuid);
        } else {
            self.tasks.insert(state.uuid.clone(), state);
        }
        self.notify_tasks();
        self.notify();
    }

    fn notify(&mut self) {
        let snapshot = ChannelSnapshot {
            sync_tasks: &self.tasks,
            connected: self.machine.connected(),
            connecting: self.machine.connecting(),
            max_attempts_reached: self.machine.max_attempts_reached(),
        };
        for observer in &mut self.observers {
            observer(&snapshot);
        }
    }

    fn notify_tasks(&mut self) {
        for observer in &mut self.task_observers {
            observer(&self.tasks);
        }
    }
}

impl ChannelCore for StatusChannel {
    fn name(&self) -> &'static str {
        "status"
    }

    fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    fn start(&mut self) -> Action {
        let action = self.machine.start();
        self.notify();
        action
    }

    fn handle_open(&mut self) -> Vec<String> {
        self.machine.opened();
        self.notify();
        match OutboundMessage::Ping.encode() {
            Ok(ping) => vec![ping],
            Err(e) => {
                warn!("status channel: cannot encode ping: {e}");
                Vec::new()
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        self.handle_message(text);
    }

    fn handle_closed(&mut self) -> Action {
        let action = self.machine.closed();
        self.notify();
        action
    }

    fn handle_retry_due(&mut self) -> Action {
        let action = self.machine.retry_due();
        self.notify();
        action
    }

    fn force_reconnect(&mut self) -> Action {
        let action = self.machine.force_reconnect();
        self.notify();
        action
    }

    fn close(&mut self) {
        self.machine.close();
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn state_frame(uuid: &str, status: u8, label: &str) -> String {
        format!(
            r#"{{"Type":"STATE","Content":{{"UUID":"{uuid}","Status":{status},"Config":{{"Uuid":"{uuid}","Label":"{label}"}}}}}}"#
        )
    }

    #[test]
    fn test_removed_task_leaves_registry() {
        let mut channel = StatusChannel::new(ReconnectPolicy::default());
        channel.handle_message(&state_frame("a", 3, "Docs"));
        assert!(channel.task("a").is_some());

        channel.handle_message(&state_frame("a", 7, "Docs"));
        assert!(channel.task("a").is_none());
        assert!(channel.tasks().is_empty());
    }

    #[test]
    fn test_upsert_keeps_latest_content() {
        let mut channel = StatusChannel::new(ReconnectPolicy::default());
        channel.handle_message(&state_frame("b", 0, "first"));
        channel.handle_message(&state_frame("b", 0, "second"));

        assert_eq!(channel.tasks().len(), 1);
        assert_eq!(channel.task("b").unwrap().config.label, "second");
    }

    #[test]
    fn test_pong_and_garbage_do_not_notify() {
        let mut channel = StatusChannel::new(ReconnectPolicy::default());
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        channel.subscribe(move |_| *counter.lock().unwrap() += 1);

        channel.handle_message(r#"{"Type":"PONG"}"#);
        let decoded = channel.handle_message("{broken");
        assert_eq!(decoded, InboundMessage::Error("Cannot decode {broken".to_string()));
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(channel.tasks().is_empty());
    }

    #[test]
    fn test_observers_see_full_snapshot() {
        let mut channel = StatusChannel::new(ReconnectPolicy::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.subscribe(move |snapshot| {
            sink.lock().unwrap().push((
                snapshot.sync_tasks.len(),
                snapshot.connected,
                snapshot.connecting,
            ));
        });

        channel.start();
        let frames = channel.handle_open();
        assert_eq!(frames, vec![r#"{"Type":"PING"}"#.to_string()]);
        channel.handle_message(&state_frame("a", 0, "Docs"));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(0, false, true), (0, true, false), (1, true, false)]);
    }

    #[test]
    fn test_task_observers_only_on_registry_change() {
        let mut channel = StatusChannel::new(ReconnectPolicy::default());
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        channel.subscribe_tasks(move |tasks| sink.lock().unwrap().push(tasks.len()));

        channel.start();
        channel.handle_open();
        channel.handle_message(&state_frame("a", 0, "A"));
        channel.handle_message(&state_frame("b", 0, "B"));
        channel.handle_closed();

        assert_eq!(*sizes.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_max_attempts_flag_visible_to_observers() {
        let policy = ReconnectPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        let mut channel = StatusChannel::new(policy);
        let flags = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&flags);
        channel.subscribe(move |s| sink.lock().unwrap().push(s.max_attempts_reached));

        channel.start();
        assert_eq!(channel.handle_closed(), Action::Wait);
        assert_eq!(channel.state(), ConnectionState::MaxAttemptsReached);
        assert_eq!(channel.force_reconnect(), Action::Connect);
        channel.handle_open();

        assert_eq!(*flags.lock().unwrap(), vec![false, true, true, false]);
    }
}
