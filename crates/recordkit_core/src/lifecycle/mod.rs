//! Status lifecycles.
//!
//! A [`StateMachine`] is attached to a [`Model`] with
//! [`Model::init_state_machine`]; [`Model::event_execution`] then fires an
//! event against the registered instance, persists it, and audits it.

mod machine;

pub use machine::{
    after_every_event, AfterEventHook, Callback, FireOutcome, HookPoint, Hooks, StateMachine,
    Transition, TransitionEvent,
};

use crate::entity::Entity;
use crate::error::{EngineError, EngineResult};
use crate::model::Model;
use serde_json::Value;

impl<T: Entity> Model<T> {
    /// Attaches a state machine to this model, replacing any previous one.
    ///
    /// `after_event` runs after every event and usually copies the new state
    /// into the entity's status field.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRegistered`] if the bound entity is gone.
    pub fn init_state_machine(
        &mut self,
        initial: impl ToString,
        transitions: Vec<Transition>,
        after_event: AfterEventHook<T>,
        hooks: Hooks<T>,
    ) -> EngineResult<()> {
        self.entity()?;
        self.machine = Some(StateMachine::new(T::TABLE, initial, transitions, after_event, hooks));
        tracing::trace!(table = T::TABLE, key = %self.key, "state machine attached");
        Ok(())
    }

    /// Returns the attached state machine.
    #[must_use]
    pub fn state_machine(&self) -> Option<&StateMachine<T>> {
        self.machine.as_ref()
    }

    /// Fires `event` from state `current` against the registered instance,
    /// then saves it and records an audit entry of kind `event`.
    ///
    /// Firing an event whose source and destination are the same still
    /// saves. On any failure the registered instance keeps its previous
    /// value.
    ///
    /// The audit before-image is the registered instance as it stands when
    /// the event fires, edits made since the load included.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StateMachineMissing`] before
    /// [`Model::init_state_machine`], [`EngineError::IllegalTransition`] if
    /// `event` is not legal from `current`, a hook's error, or a storage
    /// error.
    pub fn event_execution(
        &mut self,
        current: impl ToString,
        event: &str,
        label: &str,
        args: &[Value],
    ) -> EngineResult<T> {
        let entity = self.entity()?;
        let machine = self
            .machine
            .as_mut()
            .ok_or_else(|| EngineError::StateMachineMissing {
                table: T::TABLE.to_string(),
            })?;
        machine.set_state(current);
        if !machine.can(event) {
            return Err(EngineError::IllegalTransition {
                table: T::TABLE.to_string(),
                state: machine.current().to_string(),
                event: event.to_string(),
            });
        }

        let original = entity.read().clone();
        let mut working = original.clone();
        let outcome = machine.fire(&mut working, event, args)?;
        tracing::debug!(table = T::TABLE, id = original.id(), event, ?outcome, "event fired");

        let saved = self.save_entity(&working, "event_execution")?;
        *entity.write() = saved.clone();
        self.remember(&saved);
        self.scope.record_audit(
            T::TABLE,
            saved.id(),
            event,
            label,
            serde_json::to_value(&original)?,
            serde_json::to_value(&saved)?,
        )?;
        Ok(saved)
    }
}
