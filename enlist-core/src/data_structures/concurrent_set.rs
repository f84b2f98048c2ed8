/// Minimal set interface shared by the set implementations and the generic
/// test bodies in `common_tests`.
///
/// Every operation takes `&self`: implementations are expected to be safe to
/// drive from many threads at once.
///
pub trait ConcurrentSet<T> {
    /// Add `value` if no equal value is present. Returns true if added.
    fn try_add(&self, value: T) -> bool;

    /// Remove a value equal to `value`, returning the stored one.
    fn remove(&self, value: &T) -> Option<T>;

    fn contains(&self, value: &T) -> bool;

    /// Number of present values. Only exact while no operation is in flight.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
