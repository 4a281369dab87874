//! Data-source template catalog: seed samples used to generate candidate
//! rules, plus the bulk preset-reset admin operation.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::Mutex;
// self
use crate::{
	Error, Result,
	rules::model::{ApiType, DataSourceTemplate},
};

/// Durable catalog of data-source templates.
///
/// Modeled as an async trait, mirroring [`crate::rules::store::RuleStore`],
/// so a concrete backend can stand behind it.
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
	/// Look up a template by id.
	async fn find_by_id(&self, id: &str) -> Result<Option<DataSourceTemplate>>;

	/// List every stored template.
	async fn list(&self) -> Result<Vec<DataSourceTemplate>>;

	/// Insert or replace a template, preset or user-authored.
	async fn put(&self, template: DataSourceTemplate) -> Result<()>;

	/// Remove a template by id.
	async fn delete(&self, id: &str) -> Result<bool>;

	/// Restore every built-in preset template (`isPreset == true`) to its
	/// seed definition, discarding accumulated `usageCount`/`lastUsedAt` and
	/// any edits made to a preset's fields; user-authored templates
	/// (`isPreset == false`) are left untouched.
	async fn reset_presets(&self) -> Result<()>;
}

fn builtin_presets() -> Vec<DataSourceTemplate> {
	vec![
		DataSourceTemplate {
			id: "preset-longport-quote".into(),
			name: "LongPort quote (REST)".into(),
			provider: "longport".into(),
			api_type: ApiType::Rest,
			sample_data: serde_json::json!({ "lastDone": "561.000", "changePercent": "1.75" }),
			extracted_fields: vec!["lastDone".into(), "changePercent".into()],
			confidence: 0.9,
			is_default: true,
			is_preset: true,
			usage_count: 0,
			last_used_at: None,
		},
		DataSourceTemplate {
			id: "preset-futu-quote".into(),
			name: "Futu quote (REST)".into(),
			provider: "futu".into(),
			api_type: ApiType::Rest,
			sample_data: serde_json::json!({ "price": "321.40", "changeRate": "0.0120" }),
			extracted_fields: vec!["price".into(), "changeRate".into()],
			confidence: 0.85,
			is_default: true,
			is_preset: true,
			usage_count: 0,
			last_used_at: None,
		},
	]
}

/// Reference [`TemplateStore`] implementation backed by a single async mutex
/// over an ordered map; seeded with the built-in presets on construction.
pub struct InMemoryTemplateStore {
	templates: Mutex<HashMap<String, DataSourceTemplate>>,
}
impl InMemoryTemplateStore {
	/// Construct a store pre-seeded with the built-in preset templates.
	pub fn new() -> Self {
		let templates = builtin_presets().into_iter().map(|template| (template.id.clone(), template)).collect();
		Self { templates: Mutex::new(templates) }
	}

	/// Construct an empty store, carrying no presets at all.
	pub fn empty() -> Self {
		Self { templates: Mutex::new(HashMap::new()) }
	}
}
impl Default for InMemoryTemplateStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl TemplateStore for InMemoryTemplateStore {
	async fn find_by_id(&self, id: &str) -> Result<Option<DataSourceTemplate>> {
		Ok(self.templates.lock().await.get(id).cloned())
	}

	async fn list(&self) -> Result<Vec<DataSourceTemplate>> {
		let mut templates: Vec<_> = self.templates.lock().await.values().cloned().collect();
		templates.sort_by(|a, b| a.id.cmp(&b.id));
		Ok(templates)
	}

	async fn put(&self, template: DataSourceTemplate) -> Result<()> {
		if template.id.is_empty() {
			return Err(Error::RuleValidation { field: "id", reason: "template id must not be empty".into() });
		}
		self.templates.lock().await.insert(template.id.clone(), template);
		Ok(())
	}

	async fn delete(&self, id: &str) -> Result<bool> {
		Ok(self.templates.lock().await.remove(id).is_some())
	}

	#[tracing::instrument(level = "debug", skip(self))]
	async fn reset_presets(&self) -> Result<()> {
		let mut templates = self.templates.lock().await;
		for seed in builtin_presets() {
			templates.insert(seed.id.clone(), seed);
		}
		tracing::info!("preset templates reset to built-in seed definitions");
		Ok(())
	}
}
