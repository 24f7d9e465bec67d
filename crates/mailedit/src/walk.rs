//! Pre-order traversal of the part tree.

use crate::part::Part;

/// Visits `part` and then each of its descendants, in document order.
///
/// Container parts are visited before their children. The first error
/// returned by `visitor` stops the traversal and is returned as-is.
///
/// # Errors
///
/// Returns the first error produced by `visitor`.
pub fn walk<E, F>(part: &mut Part, visitor: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Part) -> Result<(), E>,
{
    visitor(part)?;
    for child in part.children_mut() {
        walk(child, visitor)?;
    }
    Ok(())
}

/// Immutable pre-order iterator over a part tree.
#[derive(Debug, Clone)]
pub struct Parts<'a> {
    stack: Vec<&'a Part>,
}

impl<'a> Parts<'a> {
    /// Iterates over `part` and its descendants.
    #[must_use]
    pub fn new(part: &'a Part) -> Self {
        Self { stack: vec![part] }
    }

    /// Iterates over the descendants of `part`, excluding `part` itself.
    #[must_use]
    pub fn descendants(part: &'a Part) -> Self {
        Self {
            stack: part.children().iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for Parts<'a> {
    type Item = &'a Part;

    fn next(&mut self) -> Option<Self::Item> {
        let part = self.stack.pop()?;
        self.stack.extend(part.children().iter().rev());
        Some(part)
    }
}
