//! Free-list storage behind the handle types.
//!
//! Removing an item frees its index for the next insert, so handles of
//! released resources get reused and storage stays bounded by the number of
//! live resources.

#[derive(Debug)]
pub(crate) struct Slots<T> {
    items: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Slots<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `item` in the lowest freed index, or a new one.
    pub(crate) fn insert(&mut self, item: T) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.items[index as usize] = Some(item);
                index
            }
            None => {
                self.items.push(Some(item));
                self.items.len() as u32 - 1
            }
        }
    }

    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.items.get_mut(index as usize).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, index: u32) -> Option<T> {
        let item = self.items.get_mut(index as usize)?.take()?;
        self.free.push(index);
        // lowest index first
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        Some(item)
    }

    /// Removes every item matching `reject` and returns their indices.
    pub(crate) fn remove_where(&mut self, mut reject: impl FnMut(&T) -> bool) -> Vec<u32> {
        let rejected: Vec<u32> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.as_ref().is_some_and(&mut reject))
            .map(|(index, _)| index as u32)
            .collect();
        for &index in &rejected {
            self.remove(index);
        }
        rejected
    }

    /// Number of live items.
    pub(crate) fn len(&self) -> usize {
        self.items.len() - self.free.len()
    }

    pub(crate) fn contains(&self, index: u32) -> bool {
        self.get(index).is_some()
    }
}
