use std::error::Error as _;
use std::fmt;

use minijinja::Environment;
use minijinja::ErrorKind as JinjaErrorKind;
use minijinja::UndefinedBehavior;
use minijinja::Value;
use minijinja::value::ValueKind;

use crate::HamletError;
use crate::HamletResult;
use crate::RenderContext;

/// The nested lines of a silent script, run against the context the
/// evaluator hands back.
pub type Block<'b> = &'b mut dyn FnMut(&mut RenderContext) -> HamletResult<()>;

/// The state of a conditional chain, passed from one silent script to the
/// next sibling so that `else` and `elsif` know whether an earlier branch
/// ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Branch {
	/// The previous sibling was not part of a conditional chain.
	#[default]
	Idle,
	/// A branch of the chain has run.
	Taken,
	/// Every condition so far was false (or a loop had nothing to iterate).
	Skipped,
}

/// Evaluates the code embedded in templates.
pub trait ExpressionEvaluator: fmt::Debug + Send + Sync {
	/// Evaluate an expression from `=` output, attributes or `#{}`.
	fn evaluate(&self, code: &str, context: &RenderContext) -> HamletResult<Value>;

	/// Check the syntax of an attribute expression while compiling, returning
	/// the reason it is invalid. Accepts everything unless overridden.
	fn check(&self, _code: &str) -> Result<(), String> {
		Ok(())
	}

	/// Run a `-` silent script. `block` renders the lines nested under it and
	/// may be invoked any number of times.
	fn execute(
		&self,
		code: &str,
		context: &mut RenderContext,
		previous: Branch,
		block: Option<Block<'_>>,
	) -> HamletResult<Branch>;
}

/// The default evaluator. Expressions use minijinja syntax; silent scripts
/// support `if`, `unless`, `elsif`/`elif`, `else`, `for`, and assignments.
#[derive(Debug)]
pub struct MiniJinjaEvaluator {
	env: Environment<'static>,
}

impl Default for MiniJinjaEvaluator {
	fn default() -> Self {
		let mut env = Environment::new();
		env.set_undefined_behavior(UndefinedBehavior::Lenient);
		env.add_global("nil", Value::from(()));
		env.add_function("raise", raise);

		Self { env }
	}
}

fn raise(message: String) -> Result<Value, minijinja::Error> {
	Err(minijinja::Error::new(JinjaErrorKind::InvalidOperation, message))
}

impl MiniJinjaEvaluator {
	pub fn new() -> Self {
		Self::default()
	}

	/// The underlying environment, for registering functions and filters.
	pub fn environment_mut(&mut self) -> &mut Environment<'static> {
		&mut self.env
	}

	fn conditional(
		&self,
		condition: &str,
		negate: bool,
		context: &mut RenderContext,
		block: Option<Block<'_>>,
	) -> HamletResult<Branch> {
		let value = self.evaluate(condition, context)?;

		if value.is_true() == negate {
			return Ok(Branch::Skipped);
		}

		if let Some(block) = block {
			block(context)?;
		}

		Ok(Branch::Taken)
	}

	fn each(
		&self,
		targets: &[&str],
		iterable: &str,
		context: &mut RenderContext,
		block: Option<Block<'_>>,
	) -> HamletResult<Branch> {
		let collection = self.evaluate(iterable, context)?;
		let is_map = collection.kind() == ValueKind::Map;

		let items: Vec<Value> = if collection.is_undefined() || collection.is_none() {
			Vec::new()
		} else {
			collection.try_iter().map_err(evaluation_error)?.collect()
		};

		if items.is_empty() {
			return Ok(Branch::Skipped);
		}

		let Some(block) = block else {
			return Ok(Branch::Taken);
		};

		let length = items.len();

		for (index, item) in items.into_iter().enumerate() {
			context.push_scope();

			let bound = bind_targets(targets, &collection, is_map, item, context);
			let result = bound.and_then(|()| {
				context.bind("loop", loop_value(index, length));
				block(context)
			});

			context.pop_scope();
			result?;
		}

		Ok(Branch::Taken)
	}
}

fn bind_targets(
	targets: &[&str],
	collection: &Value,
	is_map: bool,
	item: Value,
	context: &mut RenderContext,
) -> HamletResult<()> {
	match targets {
		[single] => context.bind(*single, item),
		[key, value] if is_map => {
			let entry = collection.get_item(&item).map_err(evaluation_error)?;
			context.bind(*key, item);
			context.bind(*value, entry);
		}
		_ => {
			for (position, target) in targets.iter().enumerate() {
				let part = item
					.get_item(&Value::from(position))
					.map_err(evaluation_error)?;
				context.bind(*target, part);
			}
		}
	}

	Ok(())
}

fn loop_value(index: usize, length: usize) -> Value {
	Value::from_iter([
		("index", Value::from(index + 1)),
		("index0", Value::from(index)),
		("first", Value::from(index == 0)),
		("last", Value::from(index + 1 == length)),
		("length", Value::from(length)),
	])
}

impl ExpressionEvaluator for MiniJinjaEvaluator {
	fn evaluate(&self, code: &str, context: &RenderContext) -> HamletResult<Value> {
		let expression = self.env.compile_expression(code).map_err(evaluation_error)?;
		expression.eval(context.bindings()).map_err(evaluation_error)
	}

	fn check(&self, code: &str) -> Result<(), String> {
		self.env
			.compile_expression(code)
			.map(|_| ())
			.map_err(|error| evaluation_error(error).message())
	}

	fn execute(
		&self,
		code: &str,
		context: &mut RenderContext,
		previous: Branch,
		block: Option<Block<'_>>,
	) -> HamletResult<Branch> {
		match Statement::parse(code) {
			Statement::If(condition) => self.conditional(condition, false, context, block),
			Statement::Unless(condition) => self.conditional(condition, true, context, block),
			Statement::ElseIf(condition) => {
				match previous {
					Branch::Taken => Ok(Branch::Taken),
					Branch::Skipped => self.conditional(condition, false, context, block),
					Branch::Idle => Err(HamletError::evaluation("`elsif` without a preceding `if`")),
				}
			}
			Statement::Else => {
				match previous {
					Branch::Taken => Ok(Branch::Idle),
					Branch::Skipped => {
						if let Some(block) = block {
							block(context)?;
						}
						Ok(Branch::Idle)
					}
					Branch::Idle => Err(HamletError::evaluation("`else` without a preceding `if`")),
				}
			}
			Statement::For { targets, iterable } => self.each(&targets, iterable, context, block),
			Statement::Assign { name, value } => {
				let value = self.evaluate(value, context)?;
				context.assign(name, value);
				Ok(Branch::Idle)
			}
			Statement::End => Ok(Branch::Idle),
			Statement::Expression(code) => {
				self.evaluate(code, context)?;
				if let Some(block) = block {
					block(context)?;
				}
				Ok(Branch::Idle)
			}
		}
	}
}

/// A silent script line, split into its keyword and operands.
#[derive(Debug, PartialEq, Eq)]
enum Statement<'c> {
	If(&'c str),
	Unless(&'c str),
	ElseIf(&'c str),
	Else,
	For { targets: Vec<&'c str>, iterable: &'c str },
	Assign { name: &'c str, value: &'c str },
	End,
	Expression(&'c str),
}

impl<'c> Statement<'c> {
	fn parse(code: &'c str) -> Self {
		let code = code.trim();
		let bare = code.strip_suffix(':').unwrap_or(code).trim_end();
		let (keyword, rest) = bare
			.split_once(char::is_whitespace)
			.map_or((bare, ""), |(keyword, rest)| (keyword, rest.trim()));

		match keyword {
			"if" if !rest.is_empty() => return Self::If(rest),
			"unless" if !rest.is_empty() => return Self::Unless(rest),
			"elif" | "elsif" if !rest.is_empty() => return Self::ElseIf(rest),
			"else" if rest.is_empty() => return Self::Else,
			"else" => {
				if let Some(condition) = rest.strip_prefix("if ") {
					return Self::ElseIf(condition.trim());
				}
			}
			"end" | "endif" | "endfor" | "endunless" if rest.is_empty() => return Self::End,
			"for" => {
				if let Some((targets, iterable)) = rest.split_once(" in ") {
					let targets: Vec<&str> = targets.split(',').map(str::trim).collect();
					if targets.iter().all(|target| is_identifier(target)) {
						return Self::For {
							targets,
							iterable: iterable.trim(),
						};
					}
				}
			}
			"set" => {
				if let Some(statement) = assignment(rest) {
					return statement;
				}
			}
			_ => {}
		}

		assignment(code).unwrap_or(Self::Expression(code))
	}
}

/// `name = value`, where the `=` is not part of a comparison.
fn assignment(code: &str) -> Option<Statement<'_>> {
	let bytes = code.as_bytes();
	let offset = code.find('=')?;

	if bytes.get(offset + 1) == Some(&b'=') {
		return None;
	}

	let name = code[..offset].trim();
	if !is_identifier(name) {
		return None;
	}

	Some(Statement::Assign {
		name,
		value: code[offset + 1..].trim(),
	})
}

fn is_identifier(text: &str) -> bool {
	let mut chars = text.chars();
	chars
		.next()
		.is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Convert a minijinja failure. Failures raised inside a rendered partial
/// keep the partial's own location.
pub(crate) fn evaluation_error(error: minijinja::Error) -> HamletError {
	let mut cause = error.source();
	while let Some(current) = cause {
		if let Some(inner) = current.downcast_ref::<HamletError>() {
			let location = inner.location().cloned();
			return match inner {
				HamletError::MissingPartial { name, .. } => {
					HamletError::MissingPartial {
						name: name.clone(),
						location,
					}
				}
				_ => {
					HamletError::Evaluation {
						location,
						message: inner.message(),
						source: None,
					}
				}
			};
		}
		cause = current.source();
	}

	let message = match (error.kind(), error.detail()) {
		(JinjaErrorKind::InvalidOperation, Some(detail)) => detail.to_string(),
		(kind, Some(detail)) => format!("{kind}: {detail}"),
		(kind, None) => kind.to_string(),
	};

	HamletError::evaluation_with_source(message, error)
}
