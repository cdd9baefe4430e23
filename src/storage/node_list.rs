#![forbid(unsafe_code)]
//! Ordered list of node records owned by another record.
//!
//! The owner stores one pointer to the first item. Items form a circular doubly linked
//! list (`first.prev` is the last item) so appending is O(1) and iteration follows
//! insertion order.

use crate::storage::database::{Database, PTR_SIZE};
use crate::types::{PdomError, RecPtr, Result};

const ELEMENT: u64 = 0;
const NEXT: u64 = PTR_SIZE as u64;
const PREV: u64 = 2 * PTR_SIZE as u64;
const ITEM_SIZE: usize = 3 * PTR_SIZE;

/// Handle to a list whose head pointer lives at `head_slot`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeList {
    head_slot: RecPtr,
}

impl NodeList {
    /// List rooted at the pointer stored at `head_slot`.
    pub fn at(head_slot: RecPtr) -> Self {
        Self { head_slot }
    }

    fn first(&self, db: &Database) -> Result<RecPtr> {
        db.get_rec_ptr(self.head_slot)
    }

    /// Appends `element` at the end of the list.
    pub fn add(&self, db: &Database, element: RecPtr) -> Result<()> {
        if element.is_null() {
            return Err(PdomError::Invalid("null element in node list"));
        }
        let item = db.malloc(ITEM_SIZE)?;
        db.put_rec_ptr(item.add(ELEMENT), element)?;
        let first = self.first(db)?;
        if first.is_null() {
            db.put_rec_ptr(item.add(NEXT), item)?;
            db.put_rec_ptr(item.add(PREV), item)?;
            return db.put_rec_ptr(self.head_slot, item);
        }
        let last = db.get_rec_ptr(first.add(PREV))?;
        db.put_rec_ptr(item.add(PREV), last)?;
        db.put_rec_ptr(item.add(NEXT), first)?;
        db.put_rec_ptr(last.add(NEXT), item)?;
        db.put_rec_ptr(first.add(PREV), item)
    }

    /// Iterates the elements in insertion order.
    pub fn iter<'db>(&self, db: &'db Database) -> Result<NodeListIter<'db>> {
        let first = self.first(db)?;
        Ok(NodeListIter {
            db,
            first,
            next: first,
        })
    }

    /// Collects the elements in insertion order.
    pub fn elements(&self, db: &Database) -> Result<Vec<RecPtr>> {
        self.iter(db)?.collect()
    }

    /// Returns true when the list has no element.
    pub fn is_empty(&self, db: &Database) -> Result<bool> {
        Ok(self.first(db)?.is_null())
    }

    /// Unlinks the first item holding `element`. Returns false if there is none.
    pub fn remove(&self, db: &Database, element: RecPtr) -> Result<bool> {
        let first = self.first(db)?;
        if first.is_null() {
            return Ok(false);
        }
        let mut item = first;
        loop {
            if db.get_rec_ptr(item.add(ELEMENT))? == element {
                let next = db.get_rec_ptr(item.add(NEXT))?;
                let prev = db.get_rec_ptr(item.add(PREV))?;
                if next == item {
                    db.put_rec_ptr(self.head_slot, RecPtr::NULL)?;
                } else {
                    db.put_rec_ptr(prev.add(NEXT), next)?;
                    db.put_rec_ptr(next.add(PREV), prev)?;
                    if item == first {
                        db.put_rec_ptr(self.head_slot, next)?;
                    }
                }
                db.free(item)?;
                return Ok(true);
            }
            item = db.get_rec_ptr(item.add(NEXT))?;
            if item == first {
                return Ok(false);
            }
        }
    }

    /// Frees every item of the list. The elements themselves are untouched.
    pub fn delete_items(&self, db: &Database) -> Result<()> {
        let first = self.first(db)?;
        if first.is_null() {
            return Ok(());
        }
        let mut item = first;
        loop {
            let next = db.get_rec_ptr(item.add(NEXT))?;
            db.free(item)?;
            if next == first {
                break;
            }
            item = next;
        }
        db.put_rec_ptr(self.head_slot, RecPtr::NULL)
    }
}

/// Iterator over the elements of a [`NodeList`].
pub struct NodeListIter<'db> {
    db: &'db Database,
    first: RecPtr,
    next: RecPtr,
}

impl Iterator for NodeListIter<'_> {
    type Item = Result<RecPtr>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        let item = self.next;
        let step = || -> Result<(RecPtr, RecPtr)> {
            Ok((
                self.db.get_rec_ptr(item.add(ELEMENT))?,
                self.db.get_rec_ptr(item.add(NEXT))?,
            ))
        };
        match step() {
            Ok((element, next)) => {
                self.next = if next == self.first { RecPtr::NULL } else { next };
                Some(Ok(element))
            }
            Err(err) => {
                self.next = RecPtr::NULL;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::options::DatabaseOptions;

    fn setup() -> (Database, NodeList, Vec<RecPtr>) {
        let db = Database::in_memory(DatabaseOptions::default()).unwrap();
        let owner = db.malloc(PTR_SIZE).unwrap();
        let elements = (0..5).map(|_| db.malloc(8).unwrap()).collect();
        (db, NodeList::at(owner), elements)
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let (db, list, elements) = setup();
        assert!(list.is_empty(&db).unwrap());
        for element in &elements {
            list.add(&db, *element).unwrap();
        }
        assert_eq!(list.elements(&db).unwrap(), elements);
    }

    #[test]
    fn remove_head_middle_and_tail() {
        let (db, list, elements) = setup();
        for element in &elements {
            list.add(&db, *element).unwrap();
        }
        assert!(list.remove(&db, elements[0]).unwrap());
        assert!(list.remove(&db, elements[2]).unwrap());
        assert!(list.remove(&db, elements[4]).unwrap());
        assert!(!list.remove(&db, elements[4]).unwrap());
        assert_eq!(list.elements(&db).unwrap(), vec![elements[1], elements[3]]);
        list.add(&db, elements[0]).unwrap();
        assert_eq!(
            list.elements(&db).unwrap(),
            vec![elements[1], elements[3], elements[0]]
        );
    }

    #[test]
    fn delete_items_frees_the_list() {
        let (db, list, elements) = setup();
        let before = db.stats().bytes_in_use;
        for element in &elements {
            list.add(&db, *element).unwrap();
        }
        list.delete_items(&db).unwrap();
        assert!(list.is_empty(&db).unwrap());
        assert_eq!(db.stats().bytes_in_use, before);
    }
}
