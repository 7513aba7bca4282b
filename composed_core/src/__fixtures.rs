use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::ChangeCallback;
use crate::Segment;
use crate::Subscription;
use crate::Value;
use crate::VariableRegistry;
use crate::VariableStore;

/// A store holding `variables`, each in the segment matching its value.
pub fn store_with(variables: &[(&str, Value)]) -> VariableStore {
	let store = VariableStore::new();
	for (name, value) in variables {
		store.set_value(*name, value.clone());
	}
	store
}

/// The variables most composition tests start from.
pub fn flight_store() -> VariableStore {
	store_with(&[
		("craft", Value::from("Falcon")),
		("altitude", Value::from(12.5)),
		("armed", Value::from(true)),
		("x", Value::from("5")),
	])
}

/// Write `content` to `name` below `root`, creating parent directories.
pub fn write_file(root: &Path, name: &str, content: &str) {
	let path = root.join(name);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create_dir_all: {e}"));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {name}: {e}"));
}

/// Counts how often a callback or listener ran.
#[derive(Clone, Default)]
pub struct CallCounter(Rc<Cell<usize>>);

impl CallCounter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn count(&self) -> usize {
		self.0.get()
	}

	pub fn callback(&self) -> ChangeCallback {
		let counter = Rc::clone(&self.0);
		Rc::new(move || counter.set(counter.get() + 1))
	}
}

/// A read-only registry that never notifies but records every subscription
/// it hands out and every one that is released.
#[derive(Default)]
pub struct RecordingRegistry {
	values: HashMap<(Segment, String), Value>,
	subscribed: RefCell<Vec<(Segment, String)>>,
	released: Rc<Cell<usize>>,
}

impl RecordingRegistry {
	pub fn with(variables: &[(&str, Value)]) -> Self {
		let values = variables
			.iter()
			.map(|(name, value)| ((value.segment(), (*name).to_string()), value.clone()))
			.collect();

		Self {
			values,
			..Self::default()
		}
	}

	/// Every (segment, name) pair subscribed so far, in order.
	pub fn subscribed(&self) -> Vec<(Segment, String)> {
		self.subscribed.borrow().clone()
	}

	pub fn released(&self) -> usize {
		self.released.get()
	}

	/// Subscriptions handed out and not yet released.
	pub fn active(&self) -> usize {
		self.subscribed.borrow().len() - self.released.get()
	}
}

impl VariableRegistry for RecordingRegistry {
	fn contains(&self, segment: Segment, name: &str) -> bool {
		self.values.contains_key(&(segment, name.to_string()))
	}

	fn value(&self, segment: Segment, name: &str) -> Option<Value> {
		self.values.get(&(segment, name.to_string())).cloned()
	}

	fn subscribe(&self, segment: Segment, name: &str, _callback: ChangeCallback) -> Subscription {
		self.subscribed
			.borrow_mut()
			.push((segment, name.to_string()));

		let released = Rc::clone(&self.released);
		Subscription::new(move || released.set(released.get() + 1))
	}
}
