use std::rc::Rc;

use derive_more::Deref;

use crate::ComposedValue;
use crate::Composer;
use crate::ReferenceKind;
use crate::VariableRegistry;
use crate::extract_variables;
use crate::scan_template;

/// Composes string templates by substituting variable text for references.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringComposer;

impl Composer for StringComposer {
	type Output = String;

	fn dependencies(&self, template: &str, registry: &dyn VariableRegistry) -> Vec<String> {
		extract_variables(template, registry)
	}

	fn compose(&self, template: &str, registry: &dyn VariableRegistry) -> String {
		compose_string(template, registry)
	}

	fn equals(&self, a: &String, b: &String) -> bool {
		a == b
	}
}

/// Substitute every reference in `template`.
///
/// Bracket references become the text of the variable, or nothing when no
/// segment holds it. Bare words become the text of the variable when one
/// exists and are left alone otherwise. Both kinds are located in the
/// unmodified template, so substituted text is never scanned again.
pub fn compose_string(template: &str, registry: &dyn VariableRegistry) -> String {
	let scan = scan_template(template);
	let mut output = String::with_capacity(template.len());
	let mut copied_to = 0;

	for reference in &scan.references {
		let resolved = registry.resolve(&reference.name);
		let replacement = match (reference.kind, resolved) {
			(_, Some(resolved)) => resolved.to_text(),
			(ReferenceKind::Bracket, None) => String::new(),
			(ReferenceKind::Bare, None) => continue,
		};

		output.push_str(&template[copied_to..reference.span.start]);
		output.push_str(&replacement);
		copied_to = reference.span.end;
	}

	output.push_str(&template[copied_to..]);
	output
}

/// A live string built from a template of `{name}` placeholders and bare
/// variable names.
///
/// ```rust
/// use composed_core::ComposedString;
/// use composed_core::VariableStore;
///
/// let store = VariableStore::new();
/// store.set_string("craft", "Falcon");
/// store.set_number("stage_no", 2.0);
///
/// let label = ComposedString::new("{craft} stage stage_no", store.shared());
/// assert_eq!(label.get_value(), "Falcon stage 2");
///
/// store.set_number("stage_no", 3.0);
/// assert_eq!(label.get_value(), "Falcon stage 3");
/// ```
#[derive(Debug, Deref)]
pub struct ComposedString(ComposedValue<StringComposer>);

impl ComposedString {
	pub fn new(input: impl Into<String>, registry: Rc<dyn VariableRegistry>) -> Self {
		Self(ComposedValue::new(input, StringComposer, registry))
	}

	/// The template text.
	pub fn input(&self) -> String {
		self.template()
	}

	pub fn set_input(&self, input: impl Into<String>) {
		self.set_template(input);
	}

	pub fn append(&self, text: &str) {
		self.set_template(format!("{}{text}", self.template()));
	}

	pub fn prepend(&self, text: &str) {
		self.set_template(format!("{text}{}", self.template()));
	}

	/// The variables the current template references, extracted afresh
	/// against the registry's current contents.
	pub fn used_variables(&self) -> Vec<String> {
		extract_variables(&self.template(), &*self.registry())
	}

	/// Re-initialize when the registry now knows a different set of bare
	/// words than the one subscribed to. Returns whether it did.
	pub fn refresh_if_stale(&self) -> bool {
		if self.used_variables() == self.dependencies() {
			return false;
		}

		tracing::debug!(template = %self.template(), "dependencies changed, refreshing");
		self.refresh();
		true
	}
}
