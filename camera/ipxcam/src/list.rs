/// A snapshot container returned by enumeration calls.
///
/// The contents are fixed when the list is created. Besides normal iteration
/// the list keeps a forward-only cursor for `first`/`next` style traversal.
#[derive(Debug, Clone)]
pub struct SnapshotList<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> SnapshotList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reset the cursor and return the first entry.
    pub fn first(&mut self) -> Option<&T> {
        self.cursor = 0;
        self.next()
    }

    /// Advance the cursor. Returns `None` once the end has been reached.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&T> {
        let item = self.items.get(self.cursor);
        if item.is_some() {
            self.cursor += 1;
        }
        item
    }

    /// Entry at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Consume the list, keeping only the entry at `index`.
    pub fn take(self, index: usize) -> Option<T> {
        self.items.into_iter().nth(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for SnapshotList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a SnapshotList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> FromIterator<T> for SnapshotList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cursor() {
        let mut list: SnapshotList<u8> = vec![1, 2, 3].into_iter().collect();
        assert_eq!(list.count(), 3);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.next(), Some(&2));
        assert_eq!(list.next(), Some(&3));
        assert_eq!(list.next(), None);
        assert_eq!(list.next(), None);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.get(7), None);
        assert_eq!(list.take(2), Some(3));
    }

    #[test]
    fn test_empty_is_valid() {
        let mut list: SnapshotList<String> = SnapshotList::new(vec![]);
        assert_eq!(list.count(), 0);
        assert!(list.first().is_none());
        assert!(list.take(0).is_none());
    }
}
