use super::TryVisitMut;
use serde_yaml::Value;

/// Recursively visit all tagged nodes of a yaml tree mutably
///
/// The visitor is handed the tagged node itself and may replace it with anything. Whatever it leaves in place is
/// not descended into, so a visitor that wants nested tags resolved has to walk the replacement itself.
///
/// Mapping keys are not visited.
pub trait VisitTaggedMut {
    fn visit_tagged_mut<E>(&mut self, visitor: &mut dyn TryVisitMut<Value, E>) -> Result<(), E>;
}

impl VisitTaggedMut for Value {
    fn visit_tagged_mut<E>(&mut self, visitor: &mut dyn TryVisitMut<Value, E>) -> Result<(), E> {
        match self {
            Value::Tagged(_) => visitor.try_visit_mut(self),
            Value::Sequence(sequence) => {
                for element in sequence {
                    element.visit_tagged_mut(visitor)?;
                }
                Ok(())
            }
            Value::Mapping(mapping) => {
                for (_key, value) in mapping.iter_mut() {
                    value.visit_tagged_mut(visitor)?;
                }
                Ok(())
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        }
    }
}
