use std::collections::HashSet;

use indexmap::IndexMap;

use crate::environment::Environment;
use crate::propagate::map_with_env;
use crate::value::Value;

pub type Id = i64;

/// Largest id a list hands out on load. Anything above it does not survive
/// a trip through a JSON number and is reassigned.
pub const MAX_ID: Id = (1 << 53) - 1;

pub fn is_valid_id(id: Id) -> bool {
    (0..=MAX_ID).contains(&id)
}

/// Anything stored in an id-addressed sibling list.
pub trait Identified {
    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);
}

/// `max(ids) + 1`, or `0` for an empty list. Never negative.
pub fn next_free_id<T: Identified>(items: &[T]) -> Id {
    items
        .iter()
        .map(Identified::id)
        .max()
        .map_or(0, |max| max.saturating_add(1).max(0))
}

/// The next id for a list whose persisted high-water mark is `floor`.
pub fn high_water<T: Identified>(floor: Id, items: &[T]) -> Id {
    floor.clamp(0, MAX_ID).max(next_free_id(items))
}

pub fn find_index<T: Identified>(items: &[T], id: Id) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

/// Give every out-of-range or repeated id a fresh one, starting no lower
/// than `floor`. Returns the next id that is still free.
pub fn repair_ids<T: Identified>(items: &mut [T], floor: Id) -> Id {
    let mut taken = HashSet::new();
    let mut fresh = items
        .iter()
        .map(Identified::id)
        .filter(|id| is_valid_id(*id))
        .max()
        .map_or(0, |max| max + 1)
        .max(floor.clamp(0, MAX_ID));
    for item in items.iter_mut() {
        if !is_valid_id(item.id()) || !taken.insert(item.id()) {
            tracing::warn!("invalid or duplicate id {}; reassigning {}", item.id(), fresh);
            item.set_id(fresh);
            taken.insert(fresh);
            fresh = fresh.saturating_add(1);
        }
    }
    fresh
}

/// Build the record a container exposes upward: every child's contribution,
/// threaded left to right, merged into one `name -> value` map.
pub fn result_record<T, F>(items: &[T], env: &Environment, mut contribute: F) -> Value
where
    F: FnMut(&T, &Environment) -> Environment,
{
    let contributions = map_with_env(items, env, |item, local_env| {
        let contribution = contribute(item, local_env);
        (contribution.clone(), contribution)
    });
    let mut fields = IndexMap::new();
    for contribution in contributions {
        fields.extend(contribution.bindings());
    }
    Value::Record(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(Id);

    impl Identified for Item {
        fn id(&self) -> Id {
            self.0
        }

        fn set_id(&mut self, id: Id) {
            self.0 = id;
        }
    }

    #[test]
    fn next_free_id_follows_max() {
        assert_eq!(next_free_id::<Item>(&[]), 0);
        assert_eq!(next_free_id(&[Item(3), Item(1)]), 4);
        assert_eq!(find_index(&[Item(3), Item(1)], 1), Some(1));
    }

    #[test]
    fn repair_ids_keeps_first_occurrence() {
        let mut items = vec![Item(2), Item(-1), Item(2), Item(0)];
        let next = repair_ids(&mut items, 0);
        let ids: Vec<Id> = items.iter().map(|item| item.0).collect();
        assert_eq!(ids, vec![2, 3, 4, 0]);
        assert_eq!(next, 5);
    }

    #[test]
    fn huge_ids_do_not_overflow() {
        assert_eq!(next_free_id(&[Item(Id::MAX)]), Id::MAX);
        assert_eq!(next_free_id(&[Item(-7)]), 0);

        let mut items = vec![Item(Id::MAX), Item(1), Item(MAX_ID + 1), Item(Id::MIN)];
        let next = repair_ids(&mut items, 0);
        let ids: Vec<Id> = items.iter().map(|item| item.0).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
        assert_eq!(next, 5);

        let mut items = vec![Item(-1)];
        assert_eq!(repair_ids(&mut items, Id::MAX), MAX_ID + 1);
        assert_eq!(items[0].0, MAX_ID);
        assert_eq!(high_water(Id::MAX, &[Item(3)]), MAX_ID);
        assert_eq!(high_water(-4, &[Item(3)]), 4);
    }

    #[test]
    fn result_record_threads_scope() {
        let items = [Item(1), Item(2)];
        let record = result_record(&items, &Environment::new(), |item, env| {
            let seen = env.names().len() as f64;
            Environment::single(format!("i{}", item.0), Value::Number(seen))
        });
        assert_eq!(record.field("i1"), Some(&Value::Number(0.0)));
        assert_eq!(record.field("i2"), Some(&Value::Number(1.0)));
    }
}
