//! Tool declaration and dispatch
//!
//! One tool is declared to the model: `fetch_article_details`. Dispatch never
//! aborts a turn; unknown tool names and malformed argument payloads come
//! back as error payloads so the model can react in natural language.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{ChatToolDefinition, ChatToolFunction};
use crate::core::article::ArticleIndex;

pub const FETCH_ARTICLE_DETAILS: &str = "fetch_article_details";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FetchArticleDetailsArgs {
    article_ids: Vec<String>,
}

pub fn tool_definitions() -> Vec<ChatToolDefinition> {
    vec![ChatToolDefinition {
        kind: "function".to_string(),
        function: ChatToolFunction {
            name: FETCH_ARTICLE_DETAILS.to_string(),
            description: Some(
                "Fetches the full content/summary of specific news articles by their unique IDs. \
                 Use this when the user asks about a topic found in the headline index."
                    .to_string(),
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "articleIds": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of Article IDs to fetch details for."
                    }
                },
                "required": ["articleIds"]
            }),
        },
    }]
}

pub struct ToolDispatcher<'a> {
    index: &'a ArticleIndex,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(index: &'a ArticleIndex) -> Self {
        Self { index }
    }

    /// Resolve one tool call into its response payload.
    pub fn dispatch(&self, name: &str, raw_arguments: &str) -> Value {
        if name != FETCH_ARTICLE_DETAILS {
            debug!(tool = name, "Unknown tool requested by model");
            return json!({ "error": "Tool not found" });
        }

        let args: FetchArticleDetailsArgs = match serde_json::from_str(raw_arguments) {
            Ok(args) => args,
            Err(err) => {
                debug!(tool = name, error = %err, "Malformed tool arguments");
                return json!({ "error": format!("Invalid arguments: {err}") });
            }
        };

        let articles = self.index.lookup_by_ids(&args.article_ids);
        debug!(
            tool = name,
            requested = args.article_ids.len(),
            matched = articles.len(),
            "Dispatched article lookup"
        );
        json!({
            "articles": articles
                .iter()
                .map(|article| serde_json::to_value(article.details()).unwrap_or(Value::Null))
                .collect::<Vec<Value>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_returns_narrow_article_records() {
        let index = ArticleIndex::bundled();
        let dispatcher = ToolDispatcher::new(&index);

        let payload = dispatcher.dispatch(FETCH_ARTICLE_DETAILS, r#"{"articleIds":["1","2"]}"#);
        let articles = payload["articles"].as_array().expect("articles array");
        assert_eq!(articles.len(), 2);
        assert!(articles[0].get("title").is_some());
        assert!(articles[0].get("summary").is_some());
        assert!(articles[0].get("id").is_none());
    }

    #[test]
    fn unknown_ids_shrink_the_result() {
        let index = ArticleIndex::bundled();
        let dispatcher = ToolDispatcher::new(&index);

        let payload = dispatcher.dispatch(FETCH_ARTICLE_DETAILS, r#"{"articleIds":["1","99"]}"#);
        assert_eq!(payload["articles"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn unknown_tool_name_yields_error_payload() {
        let index = ArticleIndex::bundled();
        let dispatcher = ToolDispatcher::new(&index);

        let payload = dispatcher.dispatch("delete_everything", "{}");
        assert_eq!(payload["error"], "Tool not found");
    }

    #[test]
    fn malformed_arguments_yield_error_payload() {
        let index = ArticleIndex::bundled();
        let dispatcher = ToolDispatcher::new(&index);

        for raw in [r#"{"articleIds": "1"}"#, "not json", r#"{"ids":["1"]}"#] {
            let payload = dispatcher.dispatch(FETCH_ARTICLE_DETAILS, raw);
            assert!(
                payload.get("error").is_some(),
                "expected error payload for {raw}"
            );
        }
    }

    #[test]
    fn declaration_requires_article_ids() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), 1);
        let function = &definitions[0].function;
        assert_eq!(function.name, FETCH_ARTICLE_DETAILS);
        assert_eq!(function.parameters["required"][0], "articleIds");
    }
}
