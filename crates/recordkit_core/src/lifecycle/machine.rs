//! Finite state machine over caller-defined string states.

use crate::error::{EngineError, EngineResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// One allowed transition: `event` moves any of `sources` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// States the event may fire from.
    pub sources: Vec<String>,
    /// Event name.
    pub event: String,
    /// State after the event.
    pub destination: String,
}

impl Transition {
    /// Declares a transition. States may be any displayable value.
    pub fn new<S: ToString>(
        sources: impl IntoIterator<Item = S>,
        event: impl Into<String>,
        destination: impl ToString,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(|s| s.to_string()).collect(),
            event: event.into(),
            destination: destination.to_string(),
        }
    }
}

/// What a hook sees when an event fires.
#[derive(Debug, Clone, Copy)]
pub struct TransitionEvent<'a> {
    /// Event name.
    pub event: &'a str,
    /// State before the event.
    pub source: &'a str,
    /// State after the event.
    pub destination: &'a str,
    /// Caller arguments.
    pub args: &'a [Value],
}

/// Hook run after every event, typically writing the destination into the
/// entity's status field.
pub type AfterEventHook<T> = Arc<dyn Fn(&mut T, &TransitionEvent<'_>) + Send + Sync>;

/// Wraps a closure as an [`AfterEventHook`].
pub fn after_every_event<T>(
    hook: impl Fn(&mut T, &TransitionEvent<'_>) + Send + Sync + 'static,
) -> AfterEventHook<T> {
    Arc::new(hook)
}

/// Typed hook; an error from a before or leave hook cancels the transition.
pub type Callback<T> = Arc<dyn Fn(&mut T, &TransitionEvent<'_>) -> EngineResult<()> + Send + Sync>;

/// Where a [`Callback`] is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before the named event fires. May veto.
    BeforeEvent(String),
    /// Before leaving the named state. May veto.
    LeaveState(String),
    /// After entering the named state.
    EnterState(String),
    /// After the named event fired.
    AfterEvent(String),
}

/// Typed hooks for [`StateMachine::new`].
pub struct Hooks<T> {
    entries: Vec<(HookPoint, Callback<T>)>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Hooks<T> {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a hook.
    #[must_use]
    pub fn on(
        mut self,
        point: HookPoint,
        hook: impl Fn(&mut T, &TransitionEvent<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.entries.push((point, Arc::new(hook)));
        self
    }

    /// Attaches a before-event hook.
    #[must_use]
    pub fn before_event(
        self,
        event: impl Into<String>,
        hook: impl Fn(&mut T, &TransitionEvent<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(HookPoint::BeforeEvent(event.into()), hook)
    }

    /// Attaches a leave-state hook.
    #[must_use]
    pub fn leave_state(
        self,
        state: impl ToString,
        hook: impl Fn(&mut T, &TransitionEvent<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(HookPoint::LeaveState(state.to_string()), hook)
    }

    /// Attaches an enter-state hook.
    #[must_use]
    pub fn enter_state(
        self,
        state: impl ToString,
        hook: impl Fn(&mut T, &TransitionEvent<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(HookPoint::EnterState(state.to_string()), hook)
    }

    /// Attaches an after-event hook.
    #[must_use]
    pub fn after_event(
        self,
        event: impl Into<String>,
        hook: impl Fn(&mut T, &TransitionEvent<'_>) -> EngineResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(HookPoint::AfterEvent(event.into()), hook)
    }
}

/// Result of [`StateMachine::fire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The state changed.
    Transitioned {
        /// Previous state.
        from: String,
        /// New state.
        to: String,
    },
    /// Source and destination were the same state.
    Unchanged,
}

/// A state machine bound to one entity instance.
pub struct StateMachine<T> {
    table: &'static str,
    current: String,
    /// `(source, event)` to destination.
    transitions: HashMap<(String, String), String>,
    events: BTreeMap<String, Vec<String>>,
    after_any: AfterEventHook<T>,
    hooks: HashMap<HookPoint, Vec<Callback<T>>>,
}

impl<T> StateMachine<T> {
    /// Builds a machine in state `initial`.
    ///
    /// `table` labels errors.
    pub fn new(
        table: &'static str,
        initial: impl ToString,
        transitions: impl IntoIterator<Item = Transition>,
        after_any: AfterEventHook<T>,
        hooks: Hooks<T>,
    ) -> Self {
        let mut table_map = HashMap::new();
        let mut events: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for t in transitions {
            for source in &t.sources {
                table_map.insert((source.clone(), t.event.clone()), t.destination.clone());
                events.entry(source.clone()).or_default().push(t.event.clone());
            }
        }
        for list in events.values_mut() {
            list.sort();
            list.dedup();
        }
        let mut hook_map: HashMap<HookPoint, Vec<Callback<T>>> = HashMap::new();
        for (point, hook) in hooks.entries {
            hook_map.entry(point).or_default().push(hook);
        }
        Self {
            table,
            current: initial.to_string(),
            transitions: table_map,
            events,
            after_any,
            hooks: hook_map,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Forces the current state without running hooks.
    pub fn set_state(&mut self, state: impl ToString) {
        self.current = state.to_string();
    }

    /// Returns true if `event` is legal from the current state.
    #[must_use]
    pub fn can(&self, event: &str) -> bool {
        self.destination(event).is_some()
    }

    /// Returns where `event` would lead from the current state.
    #[must_use]
    pub fn destination(&self, event: &str) -> Option<&str> {
        self.transitions
            .get(&(self.current.clone(), event.to_string()))
            .map(String::as_str)
    }

    /// Returns the events legal from the current state, sorted.
    #[must_use]
    pub fn available_events(&self) -> &[String] {
        self.events.get(&self.current).map_or(&[][..], Vec::as_slice)
    }

    /// Fires `event` against `entity`.
    ///
    /// Hook order: before-event, then (only if the state changes)
    /// leave-state, the state change, enter-state; then after-event and the
    /// after-every-event hook.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalTransition`] if the event is not legal,
    /// [`EngineError::TransitionCanceled`] if a before or leave hook vetoes,
    /// or the error of an enter or after hook.
    pub fn fire(
        &mut self,
        entity: &mut T,
        event: &str,
        args: &[Value],
    ) -> EngineResult<FireOutcome> {
        let source = self.current.clone();
        let destination = self
            .destination(event)
            .ok_or_else(|| EngineError::IllegalTransition {
                table: self.table.to_string(),
                state: source.clone(),
                event: event.to_string(),
            })?
            .to_string();
        let info = TransitionEvent {
            event,
            source: &source,
            destination: &destination,
            args,
        };

        self.run(&HookPoint::BeforeEvent(event.to_string()), entity, &info)
            .map_err(|e| self.canceled(event, &e))?;

        if source == destination {
            self.run(&HookPoint::AfterEvent(event.to_string()), entity, &info)?;
            (self.after_any)(entity, &info);
            tracing::trace!(
                table = self.table,
                event,
                state = %source,
                "event fired without transition"
            );
            return Ok(FireOutcome::Unchanged);
        }

        self.run(&HookPoint::LeaveState(source.clone()), entity, &info)
            .map_err(|e| self.canceled(event, &e))?;
        self.current = destination.clone();
        self.run(&HookPoint::EnterState(destination.clone()), entity, &info)?;
        self.run(&HookPoint::AfterEvent(event.to_string()), entity, &info)?;
        (self.after_any)(entity, &info);
        tracing::trace!(
            table = self.table,
            event,
            from = %source,
            to = %destination,
            "transitioned"
        );

        Ok(FireOutcome::Transitioned {
            from: source,
            to: destination,
        })
    }

    fn run(
        &self,
        point: &HookPoint,
        entity: &mut T,
        info: &TransitionEvent<'_>,
    ) -> EngineResult<()> {
        if let Some(hooks) = self.hooks.get(point) {
            for hook in hooks {
                hook(entity, info)?;
            }
        }
        Ok(())
    }

    fn canceled(&self, event: &str, cause: &EngineError) -> EngineError {
        EngineError::TransitionCanceled {
            table: self.table.to_string(),
            event: event.to_string(),
            reason: cause.to_string(),
        }
    }
}

impl<T> fmt::Debug for StateMachine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("table", &self.table)
            .field("current", &self.current)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
