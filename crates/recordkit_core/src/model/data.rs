//! Copying request payloads onto the registered instance.

use super::Model;
use crate::entity::Entity;
use crate::error::EngineResult;
use serde::Serialize;
use serde_json::Value;

/// Merges `patch` into `target`.
///
/// Null patch values are skipped, objects merge key by key, and anything
/// else (arrays included) replaces the target value.
fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (_, Value::Null) => {}
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value);
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

impl<T: Entity> Model<T> {
    /// Copies the fields of `data` onto the registered instance.
    ///
    /// Fields are matched by name through their serialized form. Fields
    /// `data` leaves null keep their current value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::Serialization`] if the merged value no
    /// longer deserializes as `T`.
    pub fn set_data<D: Serialize + ?Sized>(&self, data: &D) -> EngineResult<T> {
        let entity = self.entity()?;
        let mut guard = entity.write();
        let mut merged = serde_json::to_value(&*guard)?;
        merge(&mut merged, serde_json::to_value(data)?);
        *guard = serde_json::from_value(merged)?;
        Ok(guard.clone())
    }
}
