/// Sparse table from small integer keys to local variable slots
///
/// Keys are derived from local variable indices, so they are small and grow roughly
/// monotonically. Rather than hashing, the table is a flat vector indexed by key, grown by doubling
/// whenever a key past the end shows up. Entries store the slot plus one so that a zeroed entry
/// means "unassigned".
#[derive(Clone, Default, Debug)]
pub struct SlotTable {
    entries: Vec<u32>,
}

impl SlotTable {
    /// New empty table
    pub fn new() -> SlotTable {
        SlotTable { entries: vec![] }
    }

    /// Look up the slot assigned to a key
    pub fn get(&self, key: usize) -> Option<u16> {
        match self.entries.get(key) {
            None | Some(0) => None,
            Some(slot_plus_one) => Some((slot_plus_one - 1) as u16),
        }
    }

    /// Check if a key has a slot assigned to it
    pub fn contains(&self, key: usize) -> bool {
        self.get(key).is_some()
    }

    /// Assign a slot to a key, replacing whatever was there before
    pub fn insert(&mut self, key: usize, slot: u16) {
        if key >= self.entries.len() {
            let new_len = std::cmp::max(key + 1, self.entries.len() * 2);
            self.entries.resize(new_len, 0);
        }
        self.entries[key] = slot as u32 + 1;
    }

    /// Number of keys that can be stored without growing
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_table_has_no_assignments() {
        let table = SlotTable::new();
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(1000), None);
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn slot_zero_is_distinct_from_unassigned() {
        let mut table = SlotTable::new();
        table.insert(3, 0);
        assert_eq!(table.get(3), Some(0));
        assert!(table.contains(3));
        assert!(!table.contains(2));
    }

    #[test]
    fn grows_past_sparse_keys() {
        let mut table = SlotTable::new();
        table.insert(0, 7);
        table.insert(40, 9);
        table.insert(41, u16::MAX);
        assert!(table.capacity() >= 42);
        assert_eq!(table.get(0), Some(7));
        assert_eq!(table.get(40), Some(9));
        assert_eq!(table.get(41), Some(u16::MAX));
        assert_eq!(table.get(20), None);
    }

    #[test]
    fn growth_doubles() {
        let mut table = SlotTable::new();
        table.insert(9, 1);
        assert_eq!(table.capacity(), 10);
        table.insert(10, 2);
        assert_eq!(table.capacity(), 20);
    }
}
