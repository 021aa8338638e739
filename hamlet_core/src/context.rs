use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

use derive_more::Deref;
use derive_more::DerefMut;
use minijinja::Value;
use minijinja::value::Object;
use minijinja::value::merge_maps;
use serde::Serialize;

use crate::CompiledTemplate;
use crate::ExpressionEvaluator;
use crate::HamletError;
use crate::HamletResult;
use crate::MiniJinjaEvaluator;

/// How deeply partials may render other partials before the render fails.
pub const MAX_PARTIAL_DEPTH: usize = 16;

/// One level of variable bindings.
#[derive(Debug, Clone, Default, Deref, DerefMut)]
pub struct Scope(BTreeMap<String, Value>);

/// Receives rendered output.
pub trait OutputSink {
	fn write_output(&mut self, text: &str);
}

impl OutputSink for String {
	fn write_output(&mut self, text: &str) {
		self.push_str(text);
	}
}

/// Everything a render needs besides the template: variable bindings, the
/// evaluator that runs embedded code, partials and named methods.
#[derive(Debug, Clone)]
pub struct RenderContext {
	evaluator: Arc<dyn ExpressionEvaluator>,
	scopes: Vec<Scope>,
	partials: Arc<BTreeMap<String, Arc<CompiledTemplate>>>,
	methods: BTreeMap<String, Arc<CompiledTemplate>>,
	/// Number of partials being rendered around this context.
	partial_depth: usize,
	/// The evaluator bindings, cleared whenever a binding or scope changes.
	flattened: OnceLock<Value>,
}

impl Default for RenderContext {
	fn default() -> Self {
		Self::with_evaluator(MiniJinjaEvaluator::default())
	}
}

impl RenderContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_evaluator(evaluator: impl ExpressionEvaluator + 'static) -> Self {
		Self::from_evaluator(Arc::new(evaluator))
	}

	pub fn from_evaluator(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
		Self {
			evaluator,
			scopes: vec![Scope::default()],
			partials: Arc::default(),
			methods: BTreeMap::new(),
			partial_depth: 0,
			flattened: OnceLock::new(),
		}
	}

	pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
		Arc::clone(&self.evaluator)
	}

	/// Bind `name` in the innermost scope.
	pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		if let Some(scope) = self.scopes.last_mut() {
			scope.insert(name.into(), value.into());
		}
		self.flattened.take();
	}

	/// Bind any serializable value.
	pub fn bind_serialize<T: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &T) {
		self.bind(name, Value::from_serialize(value));
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.bind(name, value);
		self
	}

	/// The innermost binding of `name`.
	pub fn lookup(&self, name: &str) -> Option<&Value> {
		self.scopes.iter().rev().find_map(|scope| scope.get(name))
	}

	/// Update the innermost existing binding of `name`, or create it in the
	/// innermost scope.
	pub fn assign(&mut self, name: &str, value: Value) {
		match self
			.scopes
			.iter_mut()
			.rev()
			.find(|scope| scope.contains_key(name))
		{
			Some(scope) => {
				scope.insert(name.to_string(), value);
				self.flattened.take();
			}
			None => self.bind(name, value),
		}
	}

	pub fn push_scope(&mut self) {
		self.scopes.push(Scope::default());
		self.flattened.take();
	}

	/// Drop the innermost scope. The outermost scope is never removed.
	pub fn pop_scope(&mut self) {
		if self.scopes.len() > 1 {
			self.scopes.pop();
			self.flattened.take();
		}
	}

	/// All visible bindings, inner scopes shadowing outer ones.
	fn flatten(&self) -> BTreeMap<String, Value> {
		let mut merged = BTreeMap::new();
		for scope in &self.scopes {
			merged.extend(scope.iter().map(|(name, value)| (name.clone(), value.clone())));
		}
		merged
	}

	/// The bindings handed to the evaluator. When partials are registered a
	/// `render(name[, locals])` callable is added. Built once and reused until
	/// the bindings change.
	pub fn bindings(&self) -> Value {
		self.flattened
			.get_or_init(|| {
				let base = Value::from_iter(self.flatten());
				if self.partials.is_empty() {
					return base;
				}

				let renderer = PartialRenderer {
					evaluator: self.evaluator(),
					partials: Arc::clone(&self.partials),
					bindings: base.clone(),
					depth: self.partial_depth,
				};

				merge_maps([
					Value::from_iter([("render", Value::from_object(renderer))]),
					base,
				])
			})
			.clone()
	}

	pub fn add_partial(&mut self, name: impl Into<String>, template: Arc<CompiledTemplate>) {
		Arc::make_mut(&mut self.partials).insert(name.into(), template);
		self.flattened.take();
	}

	pub fn partial(&self, name: &str) -> Option<&Arc<CompiledTemplate>> {
		self.partials.get(name)
	}

	pub(crate) fn add_method(&mut self, name: impl Into<String>, template: Arc<CompiledTemplate>) {
		self.methods.insert(name.into(), template);
	}

	pub fn has_method(&self, name: &str) -> bool {
		self.methods.contains_key(name)
	}

	/// Render a template attached with [`CompiledTemplate::define_method`]
	/// against the current bindings.
	pub fn call_method(&mut self, name: &str) -> HamletResult<String> {
		let template = self
			.methods
			.get(name)
			.cloned()
			.ok_or_else(|| HamletError::UndefinedMethod(name.to_string()))?;

		let mut output = String::new();
		template.execute(self, &mut output)?;

		Ok(output)
	}
}

/// The `render` function exposed to expressions.
#[derive(Debug)]
struct PartialRenderer {
	evaluator: Arc<dyn ExpressionEvaluator>,
	partials: Arc<BTreeMap<String, Arc<CompiledTemplate>>>,
	bindings: Value,
	depth: usize,
}

impl Object for PartialRenderer {
	fn call(
		self: &Arc<Self>,
		_state: &minijinja::State<'_, '_>,
		args: &[Value],
	) -> Result<Value, minijinja::Error> {
		let (name, locals) = match args {
			[name] => (name, None),
			[name, locals] => (name, Some(locals)),
			_ => {
				return Err(minijinja::Error::new(
					minijinja::ErrorKind::InvalidOperation,
					"render expects a partial name and optional locals",
				));
			}
		};

		let name = name.as_str().ok_or_else(|| {
			minijinja::Error::new(
				minijinja::ErrorKind::InvalidOperation,
				"partial name must be a string",
			)
		})?;

		let template = self.partials.get(name).ok_or_else(|| {
			into_jinja_error(HamletError::MissingPartial {
				name: name.to_string(),
				location: None,
			})
		})?;

		if self.depth >= MAX_PARTIAL_DEPTH {
			return Err(into_jinja_error(HamletError::evaluation(format!(
				"partial `{name}` exceeded the recursion limit of {MAX_PARTIAL_DEPTH}"
			))));
		}

		let mut context = RenderContext::from_evaluator(Arc::clone(&self.evaluator));
		context.partials = Arc::clone(&self.partials);
		context.partial_depth = self.depth + 1;
		for key in self.bindings.try_iter()? {
			let value = self.bindings.get_item(&key)?;
			context.bind(key.to_string(), value);
		}

		if let Some(locals) = locals {
			for key in locals.try_iter()? {
				let value = locals.get_item(&key)?;
				context.bind(key.to_string(), value);
			}
		}

		let mut output = String::new();
		template
			.execute(&mut context, &mut output)
			.map_err(into_jinja_error)?;

		Ok(Value::from_safe_string(output))
	}
}

fn into_jinja_error(error: HamletError) -> minijinja::Error {
	minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, error.message()).with_source(error)
}
