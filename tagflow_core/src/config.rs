use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::Dialect;
use crate::RenderContext;
use crate::TagflowError;
use crate::TagflowResult;
use crate::Value;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["tagflow.toml", ".tagflow.toml", ".config/tagflow.toml"];

/// Configuration loaded from a `tagflow.toml` file.
///
/// ```toml
/// [dialect]
/// case_sensitive = false
///
/// [evaluation]
/// strict = true
///
/// [variables]
/// title = "Report"
/// limit = 3
///
/// [data]
/// package = "package.json"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TagflowConfig {
	#[serde(default)]
	pub dialect: DialectConfig,
	#[serde(default)]
	pub evaluation: EvaluationConfig,
	/// Variables available to every template.
	#[serde(default)]
	pub variables: BTreeMap<String, toml::Value>,
	/// Data files exposed as variables, keyed by variable name. Paths are
	/// relative to the config root.
	#[serde(default)]
	pub data: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DialectConfig {
	/// Match directive keywords case-sensitively.
	#[serde(default)]
	pub case_sensitive: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EvaluationConfig {
	/// Raise evaluation errors instead of rendering them as undefined.
	#[serde(default)]
	pub strict: bool,
}

impl TagflowConfig {
	/// Resolve the config file path for `root` using
	/// [`CONFIG_FILE_CANDIDATES`].
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> TagflowResult<Option<Self>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		tracing::debug!(path = %config_path.display(), "loading config");
		let content = std::fs::read_to_string(&config_path)?;

		Self::from_toml(&content).map(Some)
	}

	pub fn from_toml(content: &str) -> TagflowResult<Self> {
		toml::from_str(content).map_err(|e| TagflowError::ConfigParse(e.to_string()))
	}

	/// The standard dialect with the configured keyword case rule.
	pub fn dialect(&self) -> TagflowResult<Dialect> {
		Ok(Dialect::try_standard()?.with_case_sensitive(self.dialect.case_sensitive))
	}

	/// A render context seeded with the configured variables and data files.
	pub fn context(&self, root: &Path) -> TagflowResult<RenderContext> {
		let mut context = RenderContext::new().with_strict(self.evaluation.strict);

		context.extend(
			self.variables
				.iter()
				.map(|(name, value)| (name.clone(), Value::from(value.clone()))),
		);

		for (name, path) in &self.data {
			context.extend([(name.clone(), load_data_file(&root.join(path))?)]);
		}

		Ok(context)
	}
}

/// Read a JSON or TOML data file into a value. The format is chosen by
/// extension, and anything other than `.toml` is read as JSON.
pub fn load_data_file(path: &Path) -> TagflowResult<Value> {
	let path_display = path.display().to_string();
	let data_error = |reason: String| {
		TagflowError::DataFile {
			path: path_display.clone(),
			reason,
		}
	};

	let content = std::fs::read_to_string(path).map_err(|e| data_error(e.to_string()))?;
	let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();

	let value = match extension {
		"toml" => {
			let value: toml::Value = toml::from_str(&content).map_err(|e| data_error(e.to_string()))?;
			Value::from(value)
		}
		_ => {
			let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| data_error(e.to_string()))?;
			Value::from(value)
		}
	};

	tracing::debug!(path = %path_display, kind = value.kind(), "loaded data file");
	Ok(value)
}
