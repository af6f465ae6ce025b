//! Link chains: paths through link and backlink columns, ending in a typed
//! column of the last table reached.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use keel_types::{Key, TableKey};

use crate::data::GroupData;
use crate::error::{TableError, TableResult};
use crate::table::TableRef;
use crate::value::{check_type, decode, ColumnValue};

/// One step: the keys held in column `ndx` of table `from`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Hop {
    from: TableKey,
    ndx: usize,
}

/// A path of link hops starting at one table.
///
/// Forward hops read a link or link-list column; backward hops read the
/// backlink column that mirrors an origin's link column.
pub struct LinkChain {
    origin: TableRef,
    current: TableRef,
    hops: Vec<Hop>,
}

impl LinkChain {
    pub(crate) fn new(origin: TableRef) -> Self {
        Self {
            current: origin.clone(),
            origin,
            hops: Vec::new(),
        }
    }

    /// Follow link column `col` of the current table.
    pub fn link(mut self, col: usize) -> TableResult<Self> {
        let target = self.current.get_link_target(col)?;
        self.hops.push(Hop {
            from: self.current.get_key(),
            ndx: col,
        });
        self.current = target;
        Ok(self)
    }

    /// Walk back from the current table to the objects of `origin` that link
    /// to it through `origin_col`.
    pub fn backlink(mut self, origin: &TableRef, origin_col: usize) -> TableResult<Self> {
        if origin.get_link_target(origin_col)? != self.current {
            return Err(TableError::IllegalCombination(format!(
                "column {origin_col} of {} does not link to {}",
                origin.get_key(),
                self.current.get_key()
            )));
        }
        self.current.attached()?;
        let ndx = self
            .current
            .accessor()
            .find_backlink(origin.get_key(), origin_col)
            .ok_or(TableError::NotALinkColumn(origin_col))?;
        let reached = self.current.backlink_origin(ndx)?;
        self.hops.push(Hop {
            from: self.current.get_key(),
            ndx,
        });
        self.current = reached;
        Ok(self)
    }

    /// End the chain in value column `col` of the current table.
    pub fn column<T: ColumnValue>(self, col: usize) -> TableResult<Column<T>> {
        self.current.attached()?;
        let column = self.current.accessor().column(col)?;
        if column.data_type.is_link() {
            return Err(TableError::IllegalCombination(format!(
                "column {col} is a link column; extend the chain with link()"
            )));
        }
        check_type::<T>(col, column.data_type)?;
        Ok(Column {
            chain: self,
            ndx: col,
            _marker: PhantomData,
        })
    }

    /// The table the chain ends in.
    pub fn target_table(&self) -> &TableRef {
        &self.current
    }

    pub fn origin_table(&self) -> &TableRef {
        &self.origin
    }

    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// Keys of the target table reached from `keys` of the origin table.
    /// Each key appears once, in the order it was first reached.
    pub fn follow(&self, keys: &[Key]) -> TableResult<Vec<Key>> {
        self.origin
            .read_group(|data| walk(data, &self.hops, keys.to_vec()))
    }
}

fn walk(data: &GroupData, hops: &[Hop], mut keys: Vec<Key>) -> TableResult<Vec<Key>> {
    for hop in hops {
        let table = data.table(hop.from)?;
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for key in keys {
            for reached in table.linked_keys(key, hop.ndx)? {
                if seen.insert(reached) {
                    next.push(reached);
                }
            }
        }
        keys = next;
    }
    Ok(keys)
}

impl fmt::Debug for LinkChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkChain")
            .field("origin", &self.origin.get_key())
            .field("target", &self.current.get_key())
            .field("hops", &self.hops)
            .finish()
    }
}

/// A typed column at the end of a [`LinkChain`].
pub struct Column<T> {
    chain: LinkChain,
    ndx: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ColumnValue> Column<T> {
    pub fn chain(&self) -> &LinkChain {
        &self.chain
    }

    /// Value of the column for object `key` of the target table.
    pub fn get(&self, key: Key) -> TableResult<T> {
        let ndx = self.ndx;
        let value = self.chain.current.read(|t| Ok(t.cell(key, ndx)?.clone()))?;
        decode(ndx, &value)
    }

    /// Values reached from `origin_keys`, in the order [`LinkChain::follow`]
    /// returns the target keys.
    pub fn values(&self, origin_keys: &[Key]) -> TableResult<Vec<T>> {
        let target = self.chain.current.get_key();
        let ndx = self.ndx;
        let cells = self.chain.origin.read_group(|data| {
            let reached = walk(data, &self.chain.hops, origin_keys.to_vec())?;
            let table = data.table(target)?;
            reached
                .into_iter()
                .map(|key| Ok(table.cell(key, ndx)?.clone()))
                .collect::<TableResult<Vec<_>>>()
        })?;
        cells.iter().map(|cell| decode(ndx, cell)).collect()
    }

    /// First origin object, in key order, that reaches a target whose cell
    /// equals `value`.
    pub fn find_first(&self, value: T) -> TableResult<Option<Key>> {
        let wanted = value.into_value();
        let origin = self.chain.origin.get_key();
        let target = self.chain.current.get_key();
        let ndx = self.ndx;
        self.chain.origin.read_group(|data| {
            let targets = data.table(target)?;
            for key in data.table(origin)?.store.keys() {
                for reached in walk(data, &self.chain.hops, vec![key])? {
                    if *targets.cell(reached, ndx)? == wanted {
                        return Ok(Some(key));
                    }
                }
            }
            Ok(None)
        })
    }
}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("chain", &self.chain)
            .field("column", &self.ndx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use crate::Group;
    use keel_types::{DataType, LinkType};

    struct Fixture {
        _group: Group,
        person: TableRef,
        dog: TableRef,
        people: Vec<Key>,
        dogs: Vec<Key>,
    }

    /// person(name, pet -> dog, walks -> [dog]); dog(name)
    fn fixture() -> Fixture {
        let group = Group::new(GroupConfig::default());
        let person = group.add_table("person").unwrap();
        let dog = group.add_table("dog").unwrap();
        person.add_column(DataType::String, "name", false).unwrap();
        person
            .add_column_link(DataType::Link, "pet", &dog, LinkType::Weak)
            .unwrap();
        person.add_column_list("walks", &dog, LinkType::Weak).unwrap();
        dog.add_column(DataType::String, "name", false).unwrap();

        let mut dogs = Vec::new();
        for name in ["rex", "fido", "bella"] {
            let d = dog.create_object().unwrap();
            d.set::<String>(0, name.into()).unwrap();
            dogs.push(d.key());
        }
        let mut people = Vec::new();
        for name in ["ann", "bob"] {
            let p = person.create_object().unwrap();
            p.set::<String>(0, name.into()).unwrap();
            people.push(p.key());
        }
        let ann = person.get_object(people[0]).unwrap();
        ann.set_link(1, dogs[1]).unwrap();
        let walks = ann.get_linklist(2).unwrap();
        walks.add(dogs[2]).unwrap();
        walks.add(dogs[1]).unwrap();
        person
            .get_object(people[1])
            .unwrap()
            .set_link(1, dogs[1])
            .unwrap();

        Fixture {
            _group: group,
            person,
            dog,
            people,
            dogs,
        }
    }

    #[test]
    fn forward_link_reaches_target_values() {
        let f = fixture();
        let pets = f.person.link(1).unwrap().column::<String>(0).unwrap();
        assert_eq!(pets.chain().target_table(), &f.dog);
        assert_eq!(pets.values(&f.people).unwrap(), vec!["fido".to_string()]);
        assert_eq!(pets.get(f.dogs[0]).unwrap(), "rex");
    }

    #[test]
    fn list_hop_keeps_first_seen_order() {
        let f = fixture();
        let chain = f.person.link(2).unwrap();
        assert_eq!(chain.follow(&f.people).unwrap(), vec![f.dogs[2], f.dogs[1]]);
        assert_eq!(chain.follow(&f.people[1..]).unwrap(), Vec::<Key>::new());
    }

    #[test]
    fn backlink_walks_to_referrers() {
        let f = fixture();
        let owners = f
            .dog
            .backlink(&f.person, 1)
            .unwrap()
            .column::<String>(0)
            .unwrap();
        assert_eq!(owners.chain().origin_table(), &f.dog);
        assert_eq!(
            owners.values(&[f.dogs[1]]).unwrap(),
            vec!["ann".to_string(), "bob".to_string()]
        );
        assert_eq!(owners.find_first("bob".into()).unwrap(), Some(f.dogs[1]));
        assert_eq!(owners.find_first("cid".into()).unwrap(), None);
    }

    #[test]
    fn round_trip_through_backlink() {
        let f = fixture();
        let chain = f
            .person
            .link(1)
            .unwrap()
            .backlink(&f.person, 1)
            .unwrap();
        assert_eq!(chain.depth(), 2);
        assert_eq!(chain.target_table(), &f.person);
        assert_eq!(chain.follow(&f.people[..1]).unwrap(), f.people);
    }

    #[test]
    fn find_first_through_links() {
        let f = fixture();
        let walked = f.person.link(2).unwrap().column::<String>(0).unwrap();
        assert_eq!(walked.find_first("bella".into()).unwrap(), Some(f.people[0]));
        assert_eq!(walked.find_first("rex".into()).unwrap(), None);
    }

    #[test]
    fn chain_construction_errors() {
        let f = fixture();
        assert!(matches!(
            f.person.link(0),
            Err(TableError::NotALinkColumn(0))
        ));
        assert!(matches!(
            f.person.backlink(&f.person, 1),
            Err(TableError::IllegalCombination(_))
        ));
        assert!(matches!(
            f.person.column::<i64>(0),
            Err(TableError::TypeMismatch {
                ndx: 0,
                expected: DataType::Int,
                actual: DataType::String
            })
        ));
        assert!(matches!(
            f.person.column::<String>(1),
            Err(TableError::IllegalCombination(_))
        ));
    }

    #[test]
    fn backlink_hop_follows_origin_reshape() {
        let f = fixture();
        f.person
            .insert_column(0, DataType::Int, "age", true)
            .unwrap();
        let chain = f.dog.backlink(&f.person, 2).unwrap();
        assert_eq!(chain.target_table(), &f.person);
        assert_eq!(chain.follow(&[f.dogs[1]]).unwrap(), f.people);

        f.person.remove_column(0).unwrap();
        f.dog.get_column_count().unwrap();
        let back = f
            .dog
            .accessor()
            .find_backlink(f.person.get_key(), 1)
            .unwrap();
        let (origin, hint) = f.dog.accessor().backlink_origin(back).unwrap();
        assert_eq!(origin, f.person.get_key());
        assert!(std::sync::Arc::ptr_eq(
            &hint.upgrade().unwrap(),
            f.person.accessor()
        ));

        let owners = f
            .dog
            .backlink(&f.person, 1)
            .unwrap()
            .column::<String>(0)
            .unwrap();
        assert_eq!(
            owners.values(&[f.dogs[1]]).unwrap(),
            vec!["ann".to_string(), "bob".to_string()]
        );
        let view = f.dog.get_backlink_view(f.dogs[1], &f.person, 1).unwrap();
        assert_eq!(view.table(), &f.person);
        assert_eq!(view.keys(), f.people.as_slice());
    }
}
