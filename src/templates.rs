use std::path::PathBuf;

use anyhow::Context;
use log::debug;
use serde_json::Value;

use crate::common::ConfigMap;



#[rocket::async_trait]
pub trait TemplateRenderer: Send + Sync {
	async fn render(&self, name: &str, context: &ConfigMap) -> anyhow::Result<String>;
}


/// Templates read from a directory on every render, with `{{key}}` placeholders.
pub struct DirTemplates {
	dir: PathBuf,
}

impl DirTemplates {
	pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
		Self { dir: dir.into() }
	}
}

#[rocket::async_trait]
impl TemplateRenderer for DirTemplates {
	async fn render(&self, name: &str, context: &ConfigMap) -> anyhow::Result<String> {
		let path = self.dir.join(name);
		debug!("Rendering template {}", path.display());
		let template = tokio::fs::read_to_string(&path).await
			.with_context(|| format!("Failed to read template {}", path.display()))?;
		Ok(substitute(&template, context))
	}
}

/// Replaces each `{{key}}` (whitespace inside the braces allowed) with the HTML-escaped context value.
/// Placeholders with no matching key are left untouched.
fn substitute(template: &str, context: &ConfigMap) -> String {
	let mut output = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(start) = rest.find("{{") {
		output.push_str(&rest[..start]);
		let after_open = &rest[start + 2..];
		let Some(end) = after_open.find("}}") else {
			rest = &rest[start..];
			break;
		};

		let key = after_open[..end].trim();
		match context.get(key) {
			Some(Value::String(text)) => output.push_str(&escape_html(text)),
			Some(value) => output.push_str(&escape_html(&value.to_string())),
			None => output.push_str(&rest[start..start + 2 + end + 2]),
		}
		rest = &after_open[end + 2..];
	}

	output.push_str(rest);
	output
}

fn escape_html(text: &str) -> String {
	text.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
		.replace('"', "&quot;")
		.replace('\'', "&#39;")
}



#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::tempdir;

	fn context() -> ConfigMap {
		let mut context = ConfigMap::new();
		context.insert("version".to_string(), json!("0.1.0"));
		context.insert("camera_count".to_string(), json!(2));
		context
	}

	#[test]
	fn substitutes_known_keys() {
		let rendered = substitute("<p>v{{version}}, {{ camera_count }} cameras</p>", &context());
		assert_eq!(rendered, "<p>v0.1.0, 2 cameras</p>");
	}

	#[test]
	fn leaves_unknown_and_unterminated_placeholders() {
		assert_eq!(substitute("{{missing}} {{version}}", &context()), "{{missing}} 0.1.0");
		assert_eq!(substitute("a {{version", &context()), "a {{version");
	}

	#[test]
	fn values_are_escaped() {
		let mut context = ConfigMap::new();
		context.insert("name".to_string(), json!("<b>\"Porch\" & 'Yard'</b>"));
		context.insert("tags".to_string(), json!(["a"]));
		assert_eq!(
			substitute("{{name}} {{tags}}", &context),
			"&lt;b&gt;&quot;Porch&quot; &amp; &#39;Yard&#39;&lt;/b&gt; [&quot;a&quot;]"
		);
	}

	#[test]
	fn renders_from_directory() {
		let dir = tempdir().unwrap();
		std::fs::write(dir.path().join("main.html"), "<title>{{version}}</title>").unwrap();
		let templates = DirTemplates::new(dir.path());

		let runtime = rocket::tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		let rendered = runtime.block_on(templates.render("main.html", &context())).unwrap();
		assert_eq!(rendered, "<title>0.1.0</title>");
		assert!(runtime.block_on(templates.render("absent.html", &context())).is_err());
	}
}
