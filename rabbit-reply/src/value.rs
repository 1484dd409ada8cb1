//! The view of a decoded reply shared by both wire formats

use std::ops::ControlFlow;

/// Returned when a value cannot be walked as a key/value collection.
///
/// This is not a failure of the reply as a whole. Flattening uses it
/// to decide that a value is a leaf and moves on to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} value is not a key/value collection")]
pub struct NotKeyValue(pub &'static str);

/// A decoded value from either wire format.
///
/// The normalizing algorithms in this crate are written once against
/// this trait. Each format decides which of its values are numbers,
/// labels, lists and key/value collections.
pub trait ReplyValue: Sized {
    /// Short name of the kind of value, used in log messages
    fn kind(&self) -> &'static str;

    /// Call `visit` for each key/value pair in encounter order until it
    /// returns [`ControlFlow::Break`].
    ///
    /// # Errors
    /// Returns [`NotKeyValue`] without calling `visit` if this value is
    /// not a key/value collection.
    fn visit_pairs<'a, F>(&'a self, visit: F) -> Result<(), NotKeyValue>
    where
        F: FnMut(&str, &'a Self) -> ControlFlow<()>;

    /// The value as a metric, if it is a number or a boolean
    fn as_float(&self) -> Option<f64>;

    /// The value as a label, if it has a textual form
    fn as_label(&self) -> Option<String>;

    /// Number of elements if this value is a list
    fn list_len(&self) -> Option<usize>;

    /// The elements of a list of documents, used for the per-object
    /// endpoints
    fn elements(&self) -> Option<&[Self]>;

    /// Whether [`ReplyValue::visit_pairs`] would succeed
    fn is_key_value(&self) -> bool {
        self.visit_pairs(|_, _| ControlFlow::Break(())).is_ok()
    }
}
