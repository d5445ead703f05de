//! Editable copy of a task configuration.
//!
//! Setters write through to the wrapped [`TaskConfig`], remember which
//! fields changed and tell listeners about it. Writing the value a field
//! already holds is not a change.

use std::collections::BTreeSet;

use anyhow::{bail, Result};

use crate::error::ClientError;
use crate::input_validation::{validate_endpoint_uri, validate_selective_roots, validate_task_label};
use crate::schedule::{make_iso8601, parse_iso8601, Schedule, ScheduleError};
use crate::status::{ConfigCommand, OutboundMessage, SyncDirection, TaskConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskField {
    Label,
    LeftUri,
    RightUri,
    Direction,
    Realtime,
    LoopInterval,
    HardInterval,
    SelectiveRoots,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftEvent {
    FieldChanged(TaskField),
}

type DraftListener = Box<dyn FnMut(&DraftEvent) + Send>;

pub struct TaskDraft {
    config: TaskConfig,
    is_new: bool,
    changed: BTreeSet<TaskField>,
    listeners: Vec<DraftListener>,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self::create()
    }
}

impl TaskDraft {
    /// Draft for a task that does not exist yet. The agent assigns its UUID.
    pub fn create() -> Self {
        Self {
            config: TaskConfig::default(),
            is_new: true,
            changed: BTreeSet::new(),
            listeners: Vec::new(),
        }
    }

    pub fn edit(config: TaskConfig) -> Self {
        Self {
            config,
            is_new: false,
            changed: BTreeSet::new(),
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn changed_fields(&self) -> impl Iterator<Item = TaskField> + '_ {
        self.changed.iter().copied()
    }

    pub fn on_change(&mut self, listener: impl FnMut(&DraftEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.update(TaskField::Label, label.into(), |c| &mut c.label);
    }

    pub fn set_left_uri(&mut self, uri: impl Into<String>) {
        self.update(TaskField::LeftUri, uri.into(), |c| &mut c.left_uri);
    }

    pub fn set_right_uri(&mut self, uri: impl Into<String>) {
        self.update(TaskField::RightUri, uri.into(), |c| &mut c.right_uri);
    }

    pub fn set_direction(&mut self, direction: SyncDirection) {
        self.update(TaskField::Direction, direction, |c| &mut c.direction);
    }

    pub fn set_realtime(&mut self, realtime: bool) {
        self.update(TaskField::Realtime, realtime, |c| &mut c.realtime);
    }

    pub fn set_hard_interval(&mut self, interval: impl Into<String>) {
        self.update(TaskField::HardInterval, interval.into(), |c| &mut c.hard_interval);
    }

    pub fn set_selective_roots(&mut self, roots: Option<Vec<String>>) {
        self.update(TaskField::SelectiveRoots, roots, |c| &mut c.selective_roots);
    }

    pub fn loop_schedule(&self) -> Result<Schedule, ScheduleError> {
        parse_iso8601(&self.config.loop_interval)
    }

    pub fn set_loop_schedule(&mut self, schedule: &Schedule) -> Result<(), ScheduleError> {
        let encoded = make_iso8601(schedule)?;
        self.update(TaskField::LoopInterval, encoded, |c| &mut c.loop_interval);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_task_label(&self.config.label)?;
        validate_endpoint_uri(&self.config.left_uri)?;
        validate_endpoint_uri(&self.config.right_uri)?;
        if self.config.left_uri == self.config.right_uri {
            bail!("Both endpoints point to '{}'", self.config.left_uri);
        }
        if let Some(roots) = &self.config.selective_roots {
            validate_selective_roots(roots)?;
        }
        parse_iso8601(&self.config.loop_interval)?;
        if !self.config.hard_interval.is_empty() {
            parse_iso8601(&self.config.hard_interval)?;
        }
        Ok(())
    }

    /// `CONFIG create` for a new task, `CONFIG edit` otherwise.
    pub fn into_message(self) -> Result<OutboundMessage, ClientError> {
        self.validate().map_err(ClientError::validation)?;
        let cmd = if self.is_new {
            ConfigCommand::Create
        } else {
            ConfigCommand::Edit
        };
        Ok(OutboundMessage::Config {
            cmd,
            config: Some(self.config),
            authority: None,
        })
    }

    fn update<T: PartialEq>(
        &mut self,
        field: TaskField,
        value: T,
        slot: fn(&mut TaskConfig) -> &mut T,
    ) {
        let target = slot(&mut self.config);
        if *target == value {
            return;
        }
        *target = value;
        self.changed.insert(field);
        let event = DraftEvent::FieldChanged(field);
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}
