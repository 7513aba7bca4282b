use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ChangeCallback;
use crate::Segment;
use crate::Subscription;
use crate::Value;
use crate::VariableRegistry;
use crate::config::VariableSet;

type SubscriberKey = (Segment, String);

#[derive(Default)]
struct StoreInner {
	/// One table per segment, indexed by [`slot`].
	tables: [BTreeMap<String, Value>; 3],
	subscribers: HashMap<SubscriberKey, Vec<(u64, ChangeCallback)>>,
	next_id: u64,
}

fn slot(segment: Segment) -> usize {
	match segment {
		Segment::String => 0,
		Segment::Number => 1,
		Segment::Bool => 2,
	}
}

/// An in-memory [`VariableRegistry`].
///
/// Cloning the store yields another handle to the same variables. Writes
/// notify subscribers synchronously, in registration order, after the
/// store's own borrow has been released.
#[derive(Clone, Default)]
pub struct VariableStore {
	inner: Rc<RefCell<StoreInner>>,
}

impl VariableStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// This store as the registry handle a composed value expects.
	pub fn shared(&self) -> Rc<dyn VariableRegistry> {
		Rc::new(self.clone())
	}

	/// Store `value` under `name` in the segment matching its type. Returns
	/// `false`, without notifying anyone, when the stored value is already
	/// equal.
	pub fn set_value(&self, name: impl Into<String>, value: impl Into<Value>) -> bool {
		let name = name.into();
		let value = value.into();
		let segment = value.segment();

		let changed = {
			let mut inner = self.inner.borrow_mut();
			let table = &mut inner.tables[slot(segment)];
			if table.get(&name) == Some(&value) {
				false
			} else {
				table.insert(name.clone(), value);
				true
			}
		};

		if changed {
			self.notify(segment, &name);
		}

		changed
	}

	pub fn set_string(&self, name: impl Into<String>, value: impl Into<String>) -> bool {
		self.set_value(name, Value::Text(value.into()))
	}

	pub fn set_number(&self, name: impl Into<String>, value: f64) -> bool {
		self.set_value(name, Value::Number(value))
	}

	pub fn set_bool(&self, name: impl Into<String>, value: bool) -> bool {
		self.set_value(name, Value::Bool(value))
	}

	/// Remove `name` from `segment`, notifying subscribers if it existed.
	pub fn remove(&self, segment: Segment, name: &str) -> Option<Value> {
		let removed = self.inner.borrow_mut().tables[slot(segment)].remove(name);

		if removed.is_some() {
			self.notify(segment, name);
		}

		removed
	}

	pub fn get(&self, segment: Segment, name: &str) -> Option<Value> {
		self.inner.borrow().tables[slot(segment)].get(name).cloned()
	}

	/// Names stored in `segment`, sorted.
	pub fn names(&self, segment: Segment) -> Vec<String> {
		self.inner.borrow().tables[slot(segment)]
			.keys()
			.cloned()
			.collect()
	}

	/// Total number of variables across all segments.
	pub fn len(&self) -> usize {
		self.inner.borrow().tables.iter().map(BTreeMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of live subscriptions for `name` in `segment`.
	pub fn subscriber_count(&self, segment: Segment, name: &str) -> usize {
		self.inner
			.borrow()
			.subscribers
			.get(&(segment, name.to_string()))
			.map_or(0, Vec::len)
	}

	/// Apply every assignment in `variables`. Returns how many variables
	/// changed.
	pub fn extend(&self, variables: &VariableSet) -> usize {
		variables
			.iter()
			.filter(|assignment| self.set_value(assignment.name.clone(), assignment.value.clone()))
			.count()
	}

	/// Make the store hold exactly `variables`: anything not assigned there is
	/// removed, everything else is set. Returns how many variables changed.
	pub fn sync(&self, variables: &VariableSet) -> usize {
		let stale: Vec<(Segment, String)> = {
			let inner = self.inner.borrow();
			Segment::ALL
				.into_iter()
				.flat_map(|segment| {
					inner.tables[slot(segment)]
						.keys()
						.filter(|name| !variables.contains(segment, name))
						.map(|name| (segment, name.clone()))
						.collect::<Vec<_>>()
				})
				.collect()
		};

		let removed = stale
			.iter()
			.filter(|(segment, name)| self.remove(*segment, name).is_some())
			.count();

		removed + self.extend(variables)
	}

	fn notify(&self, segment: Segment, name: &str) {
		let key = (segment, name.to_string());
		let callbacks: Vec<(u64, ChangeCallback)> = self
			.inner
			.borrow()
			.subscribers
			.get(&key)
			.cloned()
			.unwrap_or_default();

		tracing::trace!(%segment, name, subscribers = callbacks.len(), "variable changed");

		for (id, callback) in callbacks {
			// A callback earlier in this round may have released this one.
			if self.is_subscribed(&key, id) {
				callback();
			}
		}
	}

	fn is_subscribed(&self, key: &SubscriberKey, id: u64) -> bool {
		self.inner
			.borrow()
			.subscribers
			.get(key)
			.is_some_and(|entries| entries.iter().any(|(entry_id, _)| *entry_id == id))
	}
}

impl VariableRegistry for VariableStore {
	fn contains(&self, segment: Segment, name: &str) -> bool {
		self.inner.borrow().tables[slot(segment)].contains_key(name)
	}

	fn value(&self, segment: Segment, name: &str) -> Option<Value> {
		self.get(segment, name)
	}

	fn subscribe(&self, segment: Segment, name: &str, callback: ChangeCallback) -> Subscription {
		let key = (segment, name.to_string());
		let id = {
			let mut inner = self.inner.borrow_mut();
			let id = inner.next_id;
			inner.next_id += 1;
			inner
				.subscribers
				.entry(key.clone())
				.or_default()
				.push((id, callback));
			id
		};

		let store = Rc::downgrade(&self.inner);
		Subscription::new(move || {
			let Some(shared) = store.upgrade() else {
				return;
			};

			let released = {
				let Ok(mut inner) = shared.try_borrow_mut() else {
					tracing::warn!(
						segment = %key.0,
						name = %key.1,
						"store busy, subscription not released"
					);
					return;
				};

				let mut released = None;
				if let Some(entries) = inner.subscribers.get_mut(&key) {
					if let Some(index) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
						released = Some(entries.remove(index));
					}
					if entries.is_empty() {
						inner.subscribers.remove(&key);
					}
				}
				released
			};

			// A callback can own subscriptions of its own, so it is dropped
			// only once the store is free again.
			drop(released);
		})
	}
}

impl std::fmt::Debug for VariableStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.borrow();
		f.debug_struct("VariableStore")
			.field("strings", &inner.tables[slot(Segment::String)].len())
			.field("numbers", &inner.tables[slot(Segment::Number)].len())
			.field("bools", &inner.tables[slot(Segment::Bool)].len())
			.field("subscriptions", &inner.subscribers.values().map(Vec::len).sum::<usize>())
			.finish()
	}
}
