//! The contract between composed values and the table of variables they read.
//!
//! A registry is injected into every [`ComposedValue`](crate::ComposedValue)
//! as an `Rc<dyn VariableRegistry>`. Hosts with their own variable tables
//! implement the trait; [`VariableStore`](crate::VariableStore) is the
//! in-memory implementation used by the command line and the tests.

use std::fmt::Debug;
use std::rc::Rc;

use crate::Segment;
use crate::Value;

/// Callback fired by a registry when a subscribed variable changes.
pub type ChangeCallback = Rc<dyn Fn()>;

/// Handle for a registered callback. The registration is released when the
/// handle is dropped or [`Subscription::unsubscribe`] is called, whichever
/// comes first.
#[must_use = "dropping a subscription releases it immediately"]
pub struct Subscription {
	release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	/// Create a handle that runs `release` exactly once when let go.
	pub fn new(release: impl FnOnce() + 'static) -> Self {
		Self {
			release: Some(Box::new(release)),
		}
	}

	/// Release the registration now.
	pub fn unsubscribe(mut self) {
		self.release_now();
	}

	fn release_now(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.release_now();
	}
}

impl Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.release.is_some())
			.finish()
	}
}

/// The winning segment for a name and the value stored there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
	pub segment: Segment,
	/// `None` when the registry lists the name but has no value for it.
	pub value: Option<Value>,
}

impl Resolved {
	/// The text substituted for this variable.
	pub fn to_text(&self) -> String {
		self.value.as_ref().map(Value::to_text).unwrap_or_default()
	}
}

/// Typed, named variables with per-variable change notification.
pub trait VariableRegistry {
	/// Whether `name` exists in `segment`.
	fn contains(&self, segment: Segment, name: &str) -> bool;

	/// The value of `name` in `segment`.
	fn value(&self, segment: Segment, name: &str) -> Option<Value>;

	/// Register `callback` to run whenever `name` in `segment` is created,
	/// changed or removed. The callback must be invoked without holding any
	/// borrow of the registry so that it can read variables itself.
	fn subscribe(&self, segment: Segment, name: &str, callback: ChangeCallback) -> Subscription;

	/// Whether `name` exists in any segment.
	fn contains_any(&self, name: &str) -> bool {
		Segment::ALL
			.iter()
			.any(|segment| self.contains(*segment, name))
	}

	/// Look `name` up in priority order: string, then number, then bool.
	fn resolve(&self, name: &str) -> Option<Resolved> {
		Segment::ALL
			.into_iter()
			.find(|segment| self.contains(*segment, name))
			.map(|segment| {
				Resolved {
					segment,
					value: self.value(segment, name),
				}
			})
	}
}
