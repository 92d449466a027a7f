//! Call history and summary analytics.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use voicebolt_shared::{Result, VoiceBoltError};

use crate::client::PlatformClient;

/// Filter for listing conversations.
#[derive(Debug, Clone)]
pub struct ConversationFilter {
    pub agent_id: Option<String>,
    pub page_size: u32,
    pub cursor: Option<String>,
}

impl Default for ConversationFilter {
    fn default() -> Self {
        Self {
            agent_id: None,
            page_size: 30,
            cursor: None,
        }
    }
}

/// One call as listed by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub start_time_unix_secs: i64,
    #[serde(default)]
    pub call_duration_secs: u64,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default)]
    pub status: String,
    /// `success`, `failure`, or `unknown`.
    #[serde(default)]
    pub call_successful: String,
}

impl ConversationSummary {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start_time_unix_secs, 0)
    }
}

/// One page of call history.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationPage {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Aggregates shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallStats {
    pub total_calls: usize,
    pub total_duration_secs: u64,
    pub average_duration_secs: f64,
    pub successful: usize,
    pub failed: usize,
    pub unknown: usize,
    /// Share of evaluated calls (success + failure) that succeeded, 0.0..=1.0.
    pub success_rate: f64,
    pub total_messages: u64,
}

impl CallStats {
    pub fn from_conversations(conversations: &[ConversationSummary]) -> Self {
        let mut stats = Self {
            total_calls: conversations.len(),
            ..Self::default()
        };

        for c in conversations {
            stats.total_duration_secs += c.call_duration_secs;
            stats.total_messages += u64::from(c.message_count);
            match c.call_successful.as_str() {
                "success" => stats.successful += 1,
                "failure" => stats.failed += 1,
                _ => stats.unknown += 1,
            }
        }

        if stats.total_calls > 0 {
            stats.average_duration_secs =
                stats.total_duration_secs as f64 / stats.total_calls as f64;
        }
        let evaluated = stats.successful + stats.failed;
        if evaluated > 0 {
            stats.success_rate = stats.successful as f64 / evaluated as f64;
        }

        stats
    }
}

impl PlatformClient {
    /// List one page of call history.
    #[instrument(skip(self))]
    pub async fn list_conversations(&self, filter: &ConversationFilter) -> Result<ConversationPage> {
        let mut query = vec![("page_size", filter.page_size.to_string())];
        if let Some(agent_id) = &filter.agent_id {
            query.push(("agent_id", agent_id.clone()));
        }
        if let Some(cursor) = &filter.cursor {
            query.push(("cursor", cursor.clone()));
        }

        let value = self
            .send(Method::GET, "/convai/conversations", None, &query)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| VoiceBoltError::contract(format!("conversation list: {e}")))
    }

    /// Collect up to `limit` calls across pages.
    pub async fn collect_conversations(
        &self,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let mut filter = ConversationFilter {
            agent_id: agent_id.map(String::from),
            page_size: limit.clamp(1, 100) as u32,
            cursor: None,
        };
        let mut all = Vec::new();

        while all.len() < limit {
            let page = self.list_conversations(&filter).await?;
            all.extend(page.conversations);
            match page.next_cursor {
                Some(next) if page.has_more => filter.cursor = Some(next),
                _ => break,
            }
        }

        all.truncate(limit);
        Ok(all)
    }

    /// Fetch one call, including its transcript and analysis.
    #[instrument(skip(self))]
    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Value> {
        self.request_json(
            Method::GET,
            &format!("/convai/conversations/{conversation_id}"),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use voicebolt_shared::{PlatformConfig, StaticKey};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn call(duration: u64, outcome: &str) -> ConversationSummary {
        ConversationSummary {
            conversation_id: format!("conv_{duration}"),
            agent_id: Some("ag_1".into()),
            agent_name: Some("Ava".into()),
            start_time_unix_secs: 1_700_000_000,
            call_duration_secs: duration,
            message_count: 4,
            status: "done".into(),
            call_successful: outcome.into(),
        }
    }

    #[test]
    fn stats_over_calls() {
        let stats = CallStats::from_conversations(&[
            call(60, "success"),
            call(30, "failure"),
            call(90, "success"),
            call(20, "unknown"),
        ]);

        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.total_duration_secs, 200);
        assert_eq!(stats.average_duration_secs, 50.0);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.unknown, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.total_messages, 16);
    }

    #[test]
    fn stats_empty() {
        assert_eq!(CallStats::from_conversations(&[]), CallStats::default());
    }

    #[test]
    fn started_at_converts_unix_seconds() {
        let c = call(10, "success");
        assert_eq!(c.started_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn collect_stops_at_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/convai/conversations"))
            .and(query_param("agent_id", "ag_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversations": [
                    {"conversation_id": "c1", "call_duration_secs": 12, "call_successful": "success"},
                    {"conversation_id": "c2", "call_duration_secs": 40, "call_successful": "failure"},
                    {"conversation_id": "c3", "call_duration_secs": 5}
                ],
                "has_more": true,
                "next_cursor": "next"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = PlatformConfig {
            base_url: server.uri(),
            ..PlatformConfig::default()
        };
        let client =
            PlatformClient::new(&config, Arc::new(StaticKey::new("voice platform", "xi-test"))).unwrap();

        let calls = client.collect_conversations(Some("ag_1"), 2).await.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].conversation_id, "c2");
    }
}
