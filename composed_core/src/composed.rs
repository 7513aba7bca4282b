//! A cached value derived from a template and a variable registry.
//!
//! [`ComposedValue`] owns a template and the registry subscriptions for the
//! variables that template references. The first read extracts the
//! dependencies, subscribes to each of them in every segment and caches the
//! composed output. Any later change notification recomputes the cache
//! synchronously, inside the registry's callback, so a read never observes a
//! value older than the last notification.
//!
//! # Invariants
//!
//! 1. While initialized, the dependency list equals what the composer
//!    extracts from the current template.
//! 2. Every (segment, dependency) pair is subscribed to exactly once.
//! 3. Replacing the template releases every previous subscription before new
//!    ones are made.
//! 4. Dropping the value releases every subscription it holds.
//! 5. Change listeners fire only when the composer reports a different
//!    output.

use std::cell::Cell;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;
use std::rc::Weak;

use crate::ChangeCallback;
use crate::Segment;
use crate::Subscription;
use crate::VariableRegistry;

/// Turns a template into an output, given a registry.
pub trait Composer: 'static {
	type Output: Clone + Debug + 'static;

	/// Names of the variables `template` depends on, without duplicates.
	fn dependencies(&self, template: &str, registry: &dyn VariableRegistry) -> Vec<String>;

	/// Resolve `template` against `registry`. Must not fail: anything that
	/// cannot be resolved degrades to a fallback.
	fn compose(&self, template: &str, registry: &dyn VariableRegistry) -> Self::Output;

	/// Whether two outputs are observably the same.
	fn equals(&self, a: &Self::Output, b: &Self::Output) -> bool;
}

type Listener<T> = Rc<dyn Fn(&T)>;

struct ComposedState<C: Composer> {
	composer: C,
	template: String,
	cached: Option<C::Output>,
	initialized: bool,
	dependencies: Vec<String>,
	subscriptions: Vec<Subscription>,
}

struct ComposedInner<C: Composer> {
	registry: Rc<dyn VariableRegistry>,
	state: RefCell<ComposedState<C>>,
	listeners: RefCell<Vec<(u64, Listener<C::Output>)>>,
	next_listener_id: Cell<u64>,
	recalculations: Cell<u64>,
}

impl<C: Composer> ComposedInner<C> {
	fn recalculate(self: &Rc<Self>) {
		let Ok(mut state) = self.state.try_borrow_mut() else {
			tracing::warn!("skipping re-entrant recalculation");
			return;
		};

		if !state.initialized {
			self.initialize(&mut state);
		}

		let output = state.composer.compose(&state.template, &*self.registry);
		let changed = state
			.cached
			.as_ref()
			.is_none_or(|previous| !state.composer.equals(previous, &output));
		state.cached = Some(output.clone());
		drop(state);

		let recalculations = self.recalculations.get() + 1;
		self.recalculations.set(recalculations);
		tracing::trace!(recalculations, changed, "recalculated composed value");

		if changed {
			self.notify_listeners(&output);
		}
	}

	fn initialize(self: &Rc<Self>, state: &mut ComposedState<C>) {
		state.subscriptions.clear();
		state.dependencies = state.composer.dependencies(&state.template, &*self.registry);

		let weak = Rc::downgrade(self);
		let callback: ChangeCallback = Rc::new(move || {
			if let Some(inner) = weak.upgrade() {
				inner.recalculate();
			}
		});

		for name in &state.dependencies {
			for segment in Segment::ALL {
				let subscription = self.registry.subscribe(segment, name, Rc::clone(&callback));
				state.subscriptions.push(subscription);
			}
		}

		state.initialized = true;
		tracing::debug!(
			template = %state.template,
			dependencies = state.dependencies.len(),
			"initialized composed value"
		);
	}

	fn notify_listeners(&self, output: &C::Output) {
		let listeners: Vec<Listener<C::Output>> = self
			.listeners
			.borrow()
			.iter()
			.map(|(_, listener)| Rc::clone(listener))
			.collect();

		for listener in listeners {
			listener(output);
		}
	}

	fn add_listener(self: &Rc<Self>, listener: Listener<C::Output>) -> Subscription {
		let id = self.next_listener_id.get();
		self.next_listener_id.set(id + 1);
		self.listeners.borrow_mut().push((id, listener));

		let weak: Weak<Self> = Rc::downgrade(self);
		Subscription::new(move || {
			if let Some(inner) = weak.upgrade() {
				inner
					.listeners
					.borrow_mut()
					.retain(|(listener_id, _)| *listener_id != id);
			}
		})
	}
}

/// A template plus the cached, automatically refreshed result of composing
/// it against a registry.
pub struct ComposedValue<C: Composer> {
	inner: Rc<ComposedInner<C>>,
}

impl<C: Composer> ComposedValue<C> {
	/// Create an uninitialized value. Nothing is extracted, subscribed or
	/// composed until the first read.
	pub fn new(
		template: impl Into<String>,
		composer: C,
		registry: Rc<dyn VariableRegistry>,
	) -> Self {
		let state = ComposedState {
			composer,
			template: template.into(),
			cached: None,
			initialized: false,
			dependencies: Vec::new(),
			subscriptions: Vec::new(),
		};

		Self {
			inner: Rc::new(ComposedInner {
				registry,
				state: RefCell::new(state),
				listeners: RefCell::new(Vec::new()),
				next_listener_id: Cell::new(0),
				recalculations: Cell::new(0),
			}),
		}
	}

	/// The current output, composing it first if this is the first read.
	pub fn get_value(&self) -> C::Output {
		if !self.is_initialized() {
			self.inner.recalculate();
		}

		let state = self.inner.state.borrow();
		match &state.cached {
			Some(cached) => cached.clone(),
			// Only reachable when the first read happens inside this value's
			// own recalculation.
			None => state.composer.compose(&state.template, &*self.inner.registry),
		}
	}

	/// Recompose now, initializing first if needed.
	pub fn recalculate(&self) {
		self.inner.recalculate();
	}

	/// Replace the template. Equal templates are ignored; otherwise every
	/// subscription is released and the value is recomposed from scratch.
	pub fn set_template(&self, template: impl Into<String>) {
		let template = template.into();

		{
			let Ok(mut state) = self.inner.state.try_borrow_mut() else {
				tracing::warn!(%template, "cannot replace template during recalculation");
				return;
			};

			if state.template == template {
				return;
			}

			state.subscriptions.clear();
			state.dependencies.clear();
			state.template = template;
			state.initialized = false;
		}

		self.inner.recalculate();
	}

	/// Release every subscription and initialize again against the registry's
	/// current contents. Bare words only become dependencies at
	/// initialization, so this picks up variables defined since then.
	pub fn refresh(&self) {
		{
			let Ok(mut state) = self.inner.state.try_borrow_mut() else {
				tracing::warn!("cannot refresh during recalculation");
				return;
			};

			state.subscriptions.clear();
			state.dependencies.clear();
			state.initialized = false;
		}

		self.inner.recalculate();
	}

	pub fn template(&self) -> String {
		self.inner.state.borrow().template.clone()
	}

	/// The variables this value is subscribed to. Empty until initialized.
	pub fn dependencies(&self) -> Vec<String> {
		self.inner.state.borrow().dependencies.clone()
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.state.borrow().initialized
	}

	/// How many times the output has been composed.
	pub fn recalculation_count(&self) -> u64 {
		self.inner.recalculations.get()
	}

	/// The registry this value reads from.
	pub fn registry(&self) -> Rc<dyn VariableRegistry> {
		Rc::clone(&self.inner.registry)
	}

	/// Whether `a` and `b` are the same output under this value's composer.
	pub fn equals(&self, a: &C::Output, b: &C::Output) -> bool {
		self.inner.state.borrow().composer.equals(a, b)
	}

	/// Call `listener` with the new output after every recalculation that
	/// changes it. The listener stays registered while the returned handle is
	/// held.
	pub fn on_change(&self, listener: impl Fn(&C::Output) + 'static) -> Subscription {
		self.inner.add_listener(Rc::new(listener))
	}
}

impl<C: Composer> Debug for ComposedValue<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.borrow();
		f.debug_struct("ComposedValue")
			.field("template", &state.template)
			.field("initialized", &state.initialized)
			.field("dependencies", &state.dependencies)
			.field("cached", &state.cached)
			.finish()
	}
}
