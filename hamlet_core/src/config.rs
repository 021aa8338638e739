use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::ExpressionEvaluator;
use crate::Filter;
use crate::FilterRegistry;
use crate::HamletError;
use crate::HamletResult;
use crate::MiniJinjaEvaluator;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["hamlet.toml", ".hamlet.toml", ".config/hamlet.toml"];

/// Elements rendered self-closing when they have no content.
pub const DEFAULT_AUTOCLOSE: [&str; 10] = [
	"meta", "img", "link", "br", "hr", "input", "area", "param", "col", "base",
];

/// How nesting is indented in template source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "IndentUnitValue")]
pub enum IndentUnit {
	/// The first indented line decides.
	#[default]
	Auto,
	Tab,
	Spaces(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndentUnitValue {
	Name(String),
	Spaces(usize),
}

impl TryFrom<IndentUnitValue> for IndentUnit {
	type Error = String;

	fn try_from(value: IndentUnitValue) -> Result<Self, Self::Error> {
		match value {
			IndentUnitValue::Spaces(0) => Err("indent_unit must be at least 1 space".to_string()),
			IndentUnitValue::Spaces(count) => Ok(Self::Spaces(count)),
			IndentUnitValue::Name(name) => {
				match name.as_str() {
					"auto" => Ok(Self::Auto),
					"tab" | "tabs" => Ok(Self::Tab),
					other => {
						Err(format!(
							"unknown indent_unit `{other}`, expected \"auto\", \"tab\" or a number"
						))
					}
				}
			}
		}
	}
}

/// The markup dialect a template renders to. Selects doctypes and whether
/// XML prologs are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
	#[default]
	Xhtml,
	Html4,
	Html5,
}

impl Format {
	pub fn is_html(self) -> bool {
		matches!(self, Self::Html4 | Self::Html5)
	}
}

/// Immutable options for one compile.
///
/// ```toml
/// [compiler]
/// template_id = "haml"
/// escape_html = false
/// escape_attrs = true
/// suppress_eval = false
/// indent_unit = "auto"
/// format = "xhtml"
/// attr_wrapper = "'"
/// autoclose = ["meta", "img", "link", "br", "hr", "input"]
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
	/// The virtual source name used in error locations.
	pub template_id: String,
	/// Escape `=` output by default.
	pub escape_html: bool,
	/// Escape attribute values.
	pub escape_attrs: bool,
	/// Compile expressions into inert output instead of evaluating them.
	pub suppress_eval: bool,
	pub indent_unit: IndentUnit,
	pub format: Format,
	/// Quote character wrapping attribute values.
	pub attr_wrapper: char,
	/// Element names that self-close when empty.
	pub autoclose: Vec<String>,
	#[serde(skip)]
	pub filters: FilterRegistry,
	/// Checks attribute expressions while compiling. With `None` a bad
	/// expression only fails when it is evaluated.
	#[serde(skip, default = "default_syntax_check")]
	pub syntax_check: Option<Arc<dyn ExpressionEvaluator>>,
}

fn default_syntax_check() -> Option<Arc<dyn ExpressionEvaluator>> {
	Some(Arc::new(MiniJinjaEvaluator::default()))
}

impl Default for CompilerOptions {
	fn default() -> Self {
		Self {
			template_id: "haml".to_string(),
			escape_html: false,
			escape_attrs: true,
			suppress_eval: false,
			indent_unit: IndentUnit::Auto,
			format: Format::Xhtml,
			attr_wrapper: '\'',
			autoclose: DEFAULT_AUTOCLOSE.iter().map(ToString::to_string).collect(),
			filters: FilterRegistry::default(),
			syntax_check: default_syntax_check(),
		}
	}
}

impl fmt::Debug for CompilerOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CompilerOptions")
			.field("template_id", &self.template_id)
			.field("escape_html", &self.escape_html)
			.field("escape_attrs", &self.escape_attrs)
			.field("suppress_eval", &self.suppress_eval)
			.field("indent_unit", &self.indent_unit)
			.field("format", &self.format)
			.field("attr_wrapper", &self.attr_wrapper)
			.field("autoclose", &self.autoclose)
			.field("filters", &self.filters.names().collect::<Vec<_>>())
			.field("syntax_check", &self.syntax_check.is_some())
			.finish()
	}
}

impl CompilerOptions {
	#[must_use]
	pub fn with_template_id(mut self, template_id: impl Into<String>) -> Self {
		self.template_id = template_id.into();
		self
	}

	#[must_use]
	pub fn with_escape_html(mut self, escape_html: bool) -> Self {
		self.escape_html = escape_html;
		self
	}

	#[must_use]
	pub fn with_suppress_eval(mut self, suppress_eval: bool) -> Self {
		self.suppress_eval = suppress_eval;
		self
	}

	#[must_use]
	pub fn with_format(mut self, format: Format) -> Self {
		self.format = format;
		self
	}

	#[must_use]
	pub fn with_indent_unit(mut self, indent_unit: IndentUnit) -> Self {
		self.indent_unit = indent_unit;
		self
	}

	/// Register a filter, replacing any built-in of the same name.
	#[must_use]
	pub fn with_filter(mut self, name: impl Into<String>, filter: impl Filter + 'static) -> Self {
		self.filters.register(name, filter);
		self
	}

	/// Check attribute expressions with `evaluator` instead of the default
	/// minijinja syntax.
	#[must_use]
	pub fn with_syntax_check(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
		self.syntax_check = Some(Arc::new(evaluator));
		self
	}

	/// Leave attribute expressions unchecked until render.
	#[must_use]
	pub fn without_syntax_check(mut self) -> Self {
		self.syntax_check = None;
		self
	}

	pub(crate) fn is_autoclose(&self, name: &str) -> bool {
		self.autoclose.iter().any(|candidate| candidate == name)
	}
}

/// Data source entry for a `[data]` binding.
///
/// ```toml
/// [data]
/// site = "site.json"
/// release = { path = "release-info", format = "toml" }
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum DataSource {
	Path(PathBuf),
	Typed { path: PathBuf, format: String },
}

impl DataSource {
	pub fn path(&self) -> &Path {
		match self {
			Self::Path(path) | Self::Typed { path, .. } => path.as_path(),
		}
	}

	/// The format override, or the lowercased file extension.
	pub fn format(&self) -> String {
		match self {
			Self::Typed { format, .. } => format.trim().to_ascii_lowercase(),
			Self::Path(path) => extension_format(path),
		}
	}
}

/// Configuration loaded from a `hamlet.toml` file.
///
/// ```toml
/// [compiler]
/// escape_html = true
/// format = "html5"
///
/// [data]
/// site = "data/site.yaml"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct HamletConfig {
	#[serde(default)]
	pub compiler: CompilerOptions,
	/// Map of binding name to a data file relative to the config root.
	#[serde(default)]
	pub data: HashMap<String, DataSource>,
}

impl HamletConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if there is none.
	pub fn load(root: &Path) -> HamletResult<Option<HamletConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: HamletConfig =
			toml::from_str(&content).map_err(|e| HamletError::ConfigParse(e.to_string()))?;

		tracing::debug!(path = %config_path.display(), "loaded config");

		Ok(Some(config))
	}

	/// Read every `[data]` source relative to `root`, keyed by binding name.
	pub fn load_data(&self, root: &Path) -> HamletResult<HashMap<String, serde_json::Value>> {
		let mut data = HashMap::with_capacity(self.data.len());

		for (name, source) in &self.data {
			let rel_path = source.path();
			let value = read_data(&root.join(rel_path), &source.format(), rel_path)?;
			data.insert(name.clone(), value);
		}

		Ok(data)
	}
}

/// Load a single data file, picking the format from its extension.
pub fn load_data_file(path: &Path) -> HamletResult<serde_json::Value> {
	read_data(path, &extension_format(path), path)
}

fn extension_format(path: &Path) -> String {
	path.extension()
		.and_then(|extension| extension.to_str())
		.unwrap_or("")
		.to_ascii_lowercase()
}

fn read_data(path: &Path, format: &str, display: &Path) -> HamletResult<serde_json::Value> {
	let content = std::fs::read_to_string(path).map_err(|e| {
		HamletError::DataFile {
			path: display.display().to_string(),
			reason: e.to_string(),
		}
	})?;

	parse_data(&content, format).map_err(|reason| {
		match reason {
			DataError::Unsupported => HamletError::UnsupportedDataFormat(format.to_string()),
			DataError::Invalid(reason) => {
				HamletError::DataFile {
					path: display.display().to_string(),
					reason,
				}
			}
		}
	})
}

enum DataError {
	Unsupported,
	Invalid(String),
}

fn invalid(error: impl fmt::Display) -> DataError {
	DataError::Invalid(error.to_string())
}

/// Parse data file content into a `serde_json::Value` based on its format.
fn parse_data(content: &str, format: &str) -> Result<serde_json::Value, DataError> {
	match format {
		"text" | "txt" | "" => Ok(serde_json::Value::String(content.to_string())),
		"json" => serde_json::from_str(content).map_err(invalid),
		"toml" => {
			let value: toml::Value = toml::from_str(content).map_err(invalid)?;
			Ok(toml_to_json(value))
		}
		"yaml" | "yml" => serde_yaml_ng::from_str(content).map_err(invalid),
		"kdl" => {
			let document: kdl::KdlDocument = content.parse().map_err(invalid)?;
			Ok(kdl_document_to_json(&document))
		}
		"ini" => serde_ini::from_str(content).map_err(invalid),
		_ => Err(DataError::Unsupported),
	}
}

fn float_to_json(value: f64) -> serde_json::Value {
	serde_json::Number::from_f64(value).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
	match value {
		toml::Value::String(text) => serde_json::Value::String(text),
		toml::Value::Integer(number) => serde_json::Value::from(number),
		toml::Value::Float(number) => float_to_json(number),
		toml::Value::Boolean(flag) => serde_json::Value::Bool(flag),
		toml::Value::Datetime(datetime) => serde_json::Value::String(datetime.to_string()),
		toml::Value::Array(items) => items.into_iter().map(toml_to_json).collect(),
		toml::Value::Table(table) => {
			serde_json::Value::Object(
				table
					.into_iter()
					.map(|(key, value)| (key, toml_to_json(value)))
					.collect(),
			)
		}
	}
}

/// Nodes become keys. A node with children is an object, a single
/// positional argument is its value, named arguments form an object and
/// anything else is an array.
fn kdl_document_to_json(document: &kdl::KdlDocument) -> serde_json::Value {
	serde_json::Value::Object(
		document
			.nodes()
			.iter()
			.map(|node| (node.name().to_string(), kdl_node_to_json(node)))
			.collect(),
	)
}

fn kdl_node_to_json(node: &kdl::KdlNode) -> serde_json::Value {
	if let Some(children) = node.children() {
		return kdl_document_to_json(children);
	}

	let entries = node.entries();

	match entries {
		[] => serde_json::Value::Null,
		[only] if only.name().is_none() => kdl_value_to_json(only.value()),
		_ if entries.iter().all(|entry| entry.name().is_some()) => {
			serde_json::Value::Object(
				entries
					.iter()
					.filter_map(|entry| {
						entry
							.name()
							.map(|name| (name.value().to_string(), kdl_value_to_json(entry.value())))
					})
					.collect(),
			)
		}
		_ => {
			entries
				.iter()
				.map(|entry| kdl_value_to_json(entry.value()))
				.collect()
		}
	}
}

fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
	match value {
		kdl::KdlValue::String(text) => serde_json::Value::String(text.clone()),
		kdl::KdlValue::Integer(number) => {
			i64::try_from(*number)
				.map_or_else(|_| float_to_json(*number as f64), serde_json::Value::from)
		}
		kdl::KdlValue::Float(number) => float_to_json(*number),
		kdl::KdlValue::Bool(flag) => serde_json::Value::Bool(*flag),
		kdl::KdlValue::Null => serde_json::Value::Null,
	}
}
