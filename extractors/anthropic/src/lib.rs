//! Anthropic-backed implementation of the extraction pipeline.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info};
use weftgraph_core::errors::ExtractError;
use weftgraph_core::traits::{ExtractedEntity, ExtractionResult, Extractor};
use weftgraph_core::types::{Episode, ExtractionSchema};

mod config;
mod models;

pub use config::AnthropicConfig;
use models::*;

/// Anthropic implementation of [`Extractor`].
pub struct AnthropicExtractor {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicExtractor {
    pub fn new(config: AnthropicConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ExtractError::ConfigError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn build_system_prompt(&self, schemas: &HashMap<String, ExtractionSchema>) -> String {
        let mut prompt = String::from(
            "You are an expert knowledge graph extraction engine. Read the episode body and \
             identify entities (as nodes) and facts (as relationships) between them.\n\n\
             Return your findings strictly as a JSON object with this shape:\n\
             {\"entities\": [{\"id_alias\": string, \"name\": string, \"summary\": string, \
             \"labels\": [string], \"attributes\": object}], \
             \"facts\": [{\"source_id_alias\": string, \"target_id_alias\": string, \
             \"relation\": string, \"fact_text\": string}]}\n\n\
             - `id_alias` is a short identifier unique within this extraction only\n\
             - Only extract information explicitly present in the text. Do not infer or \
             hallucinate\n\
             - Every `source_id_alias`/`target_id_alias` in `facts` must match an `id_alias` in \
             `entities`\n\
             - Do not include attribute keys that are not listed in a schema below",
        );

        if !schemas.is_empty() {
            prompt.push_str("\n\nUse the following schemas to decide what labels and attributes to extract:\n");
            for schema in schemas.values() {
                prompt.push_str(&format!("\n- {} ({}): ", schema.name, schema.description));
                let fields: Vec<String> = schema
                    .fields
                    .iter()
                    .map(|f| {
                        format!(
                            "{}: {}{}",
                            f.name,
                            f.field_type,
                            if f.required { " (required)" } else { "" }
                        )
                    })
                    .collect();
                prompt.push_str(&fields.join(", "));
            }
        }

        prompt
    }

    fn parse_extraction_response(
        &self,
        content: &str,
        schemas: &HashMap<String, ExtractionSchema>,
    ) -> Result<ExtractionResult, ExtractError> {
        let cleaned = content
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        debug!(content = %cleaned, "parsing extraction response");

        let mut result: ExtractionResult = serde_json::from_str(cleaned).map_err(|e| {
            error!(error = %e, "failed to parse extraction response");
            ExtractError::ResponseParseError(format!("failed to parse JSON: {e}"))
        })?;

        let mut aliases = std::collections::HashSet::new();
        for entity in &result.entities {
            if !aliases.insert(entity.id_alias.clone()) {
                return Err(ExtractError::SchemaValidationError(format!(
                    "duplicate entity id_alias: {}",
                    entity.id_alias
                )));
            }
        }
        for fact in &result.facts {
            if !aliases.contains(&fact.source_id_alias) {
                return Err(ExtractError::SchemaValidationError(format!(
                    "fact references unknown source_id_alias: {}",
                    fact.source_id_alias
                )));
            }
            if !aliases.contains(&fact.target_id_alias) {
                return Err(ExtractError::SchemaValidationError(format!(
                    "fact references unknown target_id_alias: {}",
                    fact.target_id_alias
                )));
            }
        }

        for entity in &result.entities {
            reject_unknown_attributes(entity, schemas)?;
        }

        Ok(result)
    }
}

/// Reject any attribute keys not declared by a schema whose name matches one
/// of the entity's labels. Entities with no matching schema are left
/// unvalidated.
fn reject_unknown_attributes(
    entity: &ExtractedEntity,
    schemas: &HashMap<String, ExtractionSchema>,
) -> Result<(), ExtractError> {
    let matching_schema = entity
        .labels
        .iter()
        .find_map(|label| schemas.values().find(|s| s.name.eq_ignore_ascii_case(label)));

    let Some(schema) = matching_schema else {
        return Ok(());
    };

    if let serde_json::Value::Object(map) = &entity.attributes {
        let allowed = schema.field_names();
        let mut unknown: Vec<String> = map
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            let paths = unknown
                .iter()
                .map(|key| format!("{}.attributes.{key}", entity.id_alias))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ExtractError::SchemaValidationError(format!(
                "entity '{}' (schema '{}') has fields not declared by the schema: {paths}",
                entity.id_alias, schema.name
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl Extractor for AnthropicExtractor {
    async fn extract(
        &self,
        episode: &Episode,
        schemas: &HashMap<String, ExtractionSchema>,
    ) -> Result<ExtractionResult, ExtractError> {
        debug!(namespace = %episode.namespace, episode = %episode.name, "starting Anthropic extraction");
        let start_time = Instant::now();

        let request = MessageRequest {
            model: self.config.model.clone(),
            messages: vec![Message::new_user(&episode.body)],
            system: Some(self.build_system_prompt(schemas)),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.api_base))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractError::NetworkError(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(ExtractError::ApiError(format!("Anthropic API error {status}: {error_text}")));
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::ResponseParseError(format!("failed to parse response: {e}")))?;

        let content_text = message_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if content_text.is_empty() {
            return Err(ExtractError::ResponseParseError("no content in response".to_string()));
        }

        let result = self.parse_extraction_response(&content_text, schemas)?;

        info!(
            namespace = %episode.namespace,
            elapsed_ms = start_time.elapsed().as_millis(),
            entities = result.entities.len(),
            facts = result.facts.len(),
            "Anthropic extraction completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weftgraph_core::types::{EpisodeFormat, Namespace};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_episode() -> Episode {
        Episode::from_request(
            "ep-1".to_string(),
            "Alice works at Acme Corp".to_string(),
            EpisodeFormat::Text,
            Namespace::new("default"),
            "test".to_string(),
            None,
        )
    }

    #[test]
    fn parse_extraction_response_rejects_duplicate_alias() {
        let config = AnthropicConfig::new("test-key");
        let extractor = AnthropicExtractor::new(config).unwrap();

        let response = json!({
            "entities": [
                {"id_alias": "a", "name": "Alice", "summary": "", "labels": [], "attributes": {}},
                {"id_alias": "a", "name": "Alice2", "summary": "", "labels": [], "attributes": {}}
            ],
            "facts": []
        })
        .to_string();

        let result = extractor.parse_extraction_response(&response, &HashMap::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn extract_calls_configured_api_base() {
        let server = MockServer::start().await;
        let body = json!({
            "content": [{"type": "text", "text": "{\"entities\": [], \"facts\": []}"}]
        });

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let config = AnthropicConfig::new("test-key").with_api_base(server.uri());
        let extractor = AnthropicExtractor::new(config).unwrap();

        let result = extractor.extract(&test_episode(), &HashMap::new()).await.unwrap();
        assert!(result.entities.is_empty());
        assert!(result.facts.is_empty());
    }
}
