//! visitor pattern helpers
mod visit_tagged;
pub use visit_tagged::VisitTaggedMut;

/// Visitor that visits its subjects mutably and may fail
pub trait TryVisitMut<T, E> {
    fn try_visit_mut(&mut self, value: &mut T) -> Result<(), E>;
}

// blanket impl for FnMut
impl<T, E, F> TryVisitMut<T, E> for F
where
    F: FnMut(&mut T) -> Result<(), E>,
{
    fn try_visit_mut(&mut self, value: &mut T) -> Result<(), E> {
        self(value)
    }
}
