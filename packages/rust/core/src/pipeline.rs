//! End-to-end `create` pipeline: form → site content → knowledge document → agent → link.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use voicebolt_crawler::{CrawlOptions, ExtractionMethod, FirecrawlClient, extract_site};
use voicebolt_platform::{PlatformClient, widget_snippet};
use voicebolt_shared::{
    AgentId, AppConfig, BackoffPolicy, CreateAgentForm, KnowledgeDocument, Result, VoiceBoltError,
};
use voicebolt_storage::Storage;

use crate::prompt;
use crate::reconcile::{AssociationOutcome, Reconciler};

/// External collaborators the pipeline talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub firecrawl: &'a FirecrawlClient,
    pub platform: &'a PlatformClient,
    /// Local agent ledger; `None` disables recording.
    pub ledger: Option<&'a Storage>,
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub crawl: CrawlOptions,
    /// Propagation wait before the association read-back.
    pub settle: BackoffPolicy,
    pub language: String,
    pub voice_id: Option<String>,
    /// Abort instead of creating a knowledge-less agent when the upload fails.
    pub require_knowledge: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            crawl: CrawlOptions::from(&config.crawl),
            settle: config.association.settle.clone(),
            language: config.platform.language.clone(),
            voice_id: config.platform.voice_id.clone(),
            require_knowledge: config.pipeline.require_knowledge,
        }
    }
}

/// Result of a successful `create` run.
#[derive(Debug)]
pub struct CreateAgentOutcome {
    pub agent_id: AgentId,
    /// Uploaded document, if the upload succeeded.
    pub document: Option<KnowledgeDocument>,
    /// Why the upload failed, when the agent was created without knowledge.
    pub knowledge_error: Option<String>,
    /// Link result; `None` when there was no document to link.
    pub association: Option<AssociationOutcome>,
    pub extraction: ExtractionMethod,
    pub pages: usize,
    pub elapsed: Duration,
}

impl CreateAgentOutcome {
    /// HTML embed for the new agent.
    pub fn widget_snippet(&self) -> String {
        widget_snippet(&self.agent_id)
    }

    /// Whether the agent ended up with its knowledge attached.
    pub fn knowledge_linked(&self) -> bool {
        self.association
            .as_ref()
            .is_some_and(AssociationOutcome::is_linked)
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called for soft failures the run continues past.
    fn warn(&self, message: &str);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &CreateAgentOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn warn(&self, _message: &str) {}
    fn done(&self, _outcome: &CreateAgentOutcome) {}
}

/// Run the full `create` pipeline.
///
/// 1. Validate the form (no network before this passes)
/// 2. Extract the website (crawl or scrape)
/// 3. Upload the flattened text as a knowledge document
/// 4. Create the agent with the document attached
/// 5. Reconcile the link when a document exists
/// 6. Record the agent in the ledger
///
/// Extraction and agent-creation failures abort the run. Upload failures
/// abort only on auth errors or when `require_knowledge` is set. Association
/// and ledger failures never abort.
#[instrument(skip_all, fields(company = %form.data.company_name, deep = form.use_deep_extraction))]
pub async fn create_agent(
    form: &CreateAgentForm,
    services: &Services<'_>,
    opts: &PipelineOptions,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<CreateAgentOutcome> {
    let start = Instant::now();
    let data = &form.data;
    let website = data.validate()?;

    info!(%website, "starting agent creation");

    // --- Phase 1: Website content ---
    progress.phase("Extracting website content");
    let site = extract_site(
        services.firecrawl,
        &website,
        form.use_deep_extraction,
        &opts.crawl,
        cancel,
    )
    .await?;
    let text = site.to_document_text()?;

    // --- Phase 2: Knowledge document ---
    progress.phase("Uploading knowledge document");
    let name = prompt::document_name(data);
    let (document, knowledge_error) = match services
        .platform
        .create_text_document(&name, &text)
        .await
    {
        Ok(id) => (Some(KnowledgeDocument { id, name }), None),
        Err(e) if e.is_fatal_auth() || opts.require_knowledge => return Err(e),
        Err(e) => {
            warn!(error = %e, "knowledge upload failed, creating the agent without it");
            progress.warn(&format!("knowledge upload failed: {e}"));
            (None, Some(e.to_string()))
        }
    };

    if cancel.is_cancelled() {
        return Err(VoiceBoltError::Cancelled);
    }

    // --- Phase 3: Agent ---
    progress.phase("Creating agent");
    let spec = prompt::agent_spec(
        data,
        document.as_ref(),
        &opts.language,
        opts.voice_id.as_deref(),
    );
    let agent_id = services.platform.create_agent(&spec).await?;

    // --- Phase 4: Association ---
    let association = match &document {
        Some(doc) => {
            progress.phase("Linking knowledge to agent");
            let outcome = Reconciler::new(services.platform, opts.settle.clone())
                .reconcile(&agent_id, doc, cancel)
                .await;
            if !outcome.is_linked() {
                progress.warn(&outcome.to_string());
            }
            Some(outcome)
        }
        None => None,
    };

    let association_label = association
        .as_ref()
        .map(AssociationOutcome::label)
        .unwrap_or("none");
    let document_id = document.as_ref().map(|d| d.id.as_str());

    info!(
        agent_id = %agent_id,
        agent_name = %data.agent_name.trim(),
        company = %data.company_name.trim(),
        %website,
        email = %data.email.trim(),
        document_id = document_id.unwrap_or("-"),
        association = association_label,
        extraction = %site.method,
        pages = site.pages.len(),
        "agent metadata"
    );

    // --- Phase 5: Ledger ---
    if let Some(ledger) = services.ledger {
        let record = Storage::new_record(
            agent_id.as_str(),
            data.agent_name.trim(),
            data.company_name.trim(),
            website.as_str(),
            data.email.trim(),
            document_id,
            association_label,
        );
        if let Err(e) = ledger.record_agent(&record).await {
            warn!(error = %e, "could not record agent in the local ledger");
        }
    }

    let outcome = CreateAgentOutcome {
        agent_id,
        document,
        knowledge_error,
        association,
        extraction: site.method,
        pages: site.pages.len(),
        elapsed: start.elapsed(),
    };

    progress.done(&outcome);

    info!(
        agent_id = %outcome.agent_id,
        elapsed_ms = outcome.elapsed.as_millis(),
        "create pipeline complete"
    );

    Ok(outcome)
}

/// Link an existing document to an existing agent and update the ledger.
#[instrument(skip_all, fields(agent_id = %agent_id, document_id = %document.id))]
pub async fn link_document(
    services: &Services<'_>,
    settle: BackoffPolicy,
    agent_id: &AgentId,
    document: &KnowledgeDocument,
    cancel: &CancellationToken,
) -> AssociationOutcome {
    let outcome = Reconciler::new(services.platform, settle)
        .reconcile(agent_id, document, cancel)
        .await;

    if let Some(ledger) = services.ledger {
        match ledger
            .update_association(agent_id.as_str(), Some(document.id.as_str()), outcome.label())
            .await
        {
            Ok(true) => {}
            Ok(false) => info!("agent is not in the local ledger"),
            Err(e) => warn!(error = %e, "could not update the local ledger"),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};
    use uuid::Uuid;
    use voicebolt_shared::{
        AgentCreationData, DocumentId, EnvKeySource, FirecrawlConfig, PlatformConfig, StaticKey,
    };
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    struct Clients {
        firecrawl: FirecrawlClient,
        platform: PlatformClient,
    }

    impl Clients {
        fn new(server: &MockServer) -> Self {
            let firecrawl = FirecrawlClient::new(
                &FirecrawlConfig {
                    base_url: server.uri(),
                    ..FirecrawlConfig::default()
                },
                Arc::new(StaticKey::new("firecrawl", "fc-test")),
            )
            .unwrap();
            let platform = PlatformClient::new(
                &PlatformConfig {
                    base_url: server.uri(),
                    ..PlatformConfig::default()
                },
                Arc::new(StaticKey::new("voice platform", "xi-test")),
            )
            .unwrap();
            Self {
                firecrawl,
                platform,
            }
        }

        fn services(&self) -> Services<'_> {
            Services {
                firecrawl: &self.firecrawl,
                platform: &self.platform,
                ledger: None,
            }
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(format!("phase:{name}"));
        }
        fn warn(&self, message: &str) {
            self.events.lock().unwrap().push(format!("warn:{message}"));
        }
        fn done(&self, outcome: &CreateAgentOutcome) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done:{}", outcome.agent_id));
        }
    }

    fn acme_form() -> CreateAgentForm {
        CreateAgentForm {
            data: AgentCreationData {
                email: "a@b.com".into(),
                company_name: "Acme".into(),
                website_url: "acme.com".into(),
                agent_name: "Ava".into(),
            },
            use_deep_extraction: false,
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            crawl: CrawlOptions {
                poll: BackoffPolicy::immediate(3),
                ..CrawlOptions::default()
            },
            settle: BackoffPolicy::immediate(1),
            language: "en".into(),
            voice_id: None,
            require_knowledge: false,
        }
    }

    fn linked_agent() -> Value {
        json!({
            "agent_id": "ag_1",
            "name": "Ava",
            "conversation_config": {"agent": {"prompt": {
                "prompt": "You are Ava.",
                "knowledge_base": [{"type": "text", "id": "doc_1", "name": "Acme website knowledge"}]
            }}}
        })
    }

    async fn mount_scrape(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "markdown": "Acme sells anvils and rockets.",
                    "metadata": {"title": "Acme", "sourceURL": "https://acme.com/"}
                }
            })))
            .mount(server)
            .await;
    }

    async fn mount_upload(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/convai/knowledge-base/text"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn mount_create(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/convai/agents/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agent_id": "ag_1"})))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn echoed_knowledge_needs_no_association_writes() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"id": "doc_1"})),
        )
        .await;
        mount_create(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/convai/agents/ag_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(linked_agent()))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/convai/agents/ag_1/.*$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let clients = Clients::new(&server);
        let progress = RecordingProgress::default();
        let outcome = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.agent_id.as_str(), "ag_1");
        assert_eq!(outcome.document.as_ref().unwrap().id, DocumentId::from("doc_1"));
        assert_eq!(
            outcome.association,
            Some(AssociationOutcome::AlreadyLinked {
                location: "conversation_config.agent.prompt.knowledge_base"
            })
        );
        assert!(outcome.knowledge_linked());
        assert_eq!(outcome.extraction, ExtractionMethod::Scrape);
        assert!(outcome.widget_snippet().contains("ag_1"));

        let events = progress.events.lock().unwrap();
        assert_eq!(events.last().map(String::as_str), Some("done:ag_1"));
        assert!(!events.iter().any(|e| e.starts_with("warn:")));
    }

    #[tokio::test]
    async fn invalid_form_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut form = acme_form();
        form.data.website_url = "not a url".into();

        let clients = Clients::new(&server);
        let err = create_agent(
            &form,
            &clients.services(),
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VoiceBoltError::Validation { .. }));
    }

    #[tokio::test]
    async fn scrape_failure_creates_no_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "DNS resolution failed for acme.com"
            })))
            .mount(&server)
            .await;
        mount_create(&server, 0).await;

        let clients = Clients::new(&server);
        let err = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VoiceBoltError::Crawl { .. }));
        assert!(err.to_string().contains("DNS resolution failed"));
    }

    #[tokio::test]
    async fn upload_server_error_is_swallowed() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(
            &server,
            ResponseTemplate::new(500).set_body_json(json!({"detail": "storage unavailable"})),
        )
        .await;
        mount_create(&server, 1).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(linked_agent()))
            .expect(0)
            .mount(&server)
            .await;

        let clients = Clients::new(&server);
        let progress = RecordingProgress::default();
        let outcome = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.document.is_none());
        assert!(outcome.association.is_none());
        assert!(!outcome.knowledge_linked());
        assert!(
            outcome
                .knowledge_error
                .as_deref()
                .unwrap()
                .contains("storage unavailable")
        );
        assert!(
            progress
                .events
                .lock()
                .unwrap()
                .iter()
                .any(|e| e.starts_with("warn:knowledge upload failed"))
        );
    }

    #[tokio::test]
    async fn upload_auth_failure_aborts() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(
            &server,
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid API key"})),
        )
        .await;
        mount_create(&server, 0).await;

        let clients = Clients::new(&server);
        let err = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal_auth());
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn required_knowledge_aborts_on_upload_failure() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(&server, ResponseTemplate::new(500)).await;
        mount_create(&server, 0).await;

        let mut opts = options();
        opts.require_knowledge = true;

        let clients = Clients::new(&server);
        let err = create_agent(
            &acme_form(),
            &clients.services(),
            &opts,
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VoiceBoltError::Platform { status: 500, .. }));
    }

    #[tokio::test]
    async fn upload_without_id_is_not_swallowed_silently() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})),
        )
        .await;
        mount_create(&server, 1).await;

        let clients = Clients::new(&server);
        let outcome = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.document.is_none());
        assert!(outcome.knowledge_error.as_deref().unwrap().contains("no document id"));
    }

    #[tokio::test]
    async fn agent_creation_failure_is_fatal() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"id": "doc_1"})),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/convai/agents/create"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [{"loc": ["body", "name"], "msg": "field required"}]
            })))
            .mount(&server)
            .await;

        let clients = Clients::new(&server);
        let err = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VoiceBoltError::Validation { .. }));
        assert!(err.to_string().contains("field required"));
    }

    #[tokio::test]
    async fn missing_platform_key_fails_with_auth_error() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_create(&server, 0).await;

        let var_name = format!("VB_MISSING_{}", Uuid::now_v7().simple());
        let clients = Clients {
            platform: PlatformClient::new(
                &PlatformConfig {
                    base_url: server.uri(),
                    ..PlatformConfig::default()
                },
                Arc::new(EnvKeySource::new("voice platform", var_name)),
            )
            .unwrap(),
            ..Clients::new(&server)
        };

        let err = create_agent(
            &acme_form(),
            &clients.services(),
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal_auth());
        assert!(err.to_string().contains("VB_MISSING_"));
    }

    #[tokio::test]
    async fn ledger_records_created_agent() {
        let server = MockServer::start().await;
        mount_scrape(&server).await;
        mount_upload(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"data": {"document_id": "doc_1"}})),
        )
        .await;
        mount_create(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/convai/agents/ag_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(linked_agent()))
            .mount(&server)
            .await;

        let db = std::env::temp_dir().join(format!("vb_pipeline_{}.db", Uuid::now_v7()));
        let ledger = Storage::open(&db).await.unwrap();
        let clients = Clients::new(&server);
        let services = Services {
            ledger: Some(&ledger),
            ..clients.services()
        };

        create_agent(
            &acme_form(),
            &services,
            &options(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let record = ledger.get_agent("ag_1").await.unwrap().expect("recorded");
        assert_eq!(record.company_name, "Acme");
        assert_eq!(record.website_url, "https://acme.com/");
        assert_eq!(record.document_id.as_deref(), Some("doc_1"));
        assert_eq!(record.association, "already-linked");
    }

    #[tokio::test]
    async fn link_document_updates_ledger() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/convai/agents/ag_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"document_ids": ["doc_9"]})))
            .mount(&server)
            .await;

        let db = std::env::temp_dir().join(format!("vb_pipeline_{}.db", Uuid::now_v7()));
        let ledger = Storage::open(&db).await.unwrap();
        ledger
            .record_agent(&Storage::new_record(
                "ag_1", "Ava", "Acme", "https://acme.com/", "a@b.com", None, "none",
            ))
            .await
            .unwrap();

        let clients = Clients::new(&server);
        let services = Services {
            ledger: Some(&ledger),
            ..clients.services()
        };
        let document = KnowledgeDocument {
            id: DocumentId::from("doc_9"),
            name: "doc_9".into(),
        };

        let outcome = link_document(
            &services,
            BackoffPolicy::immediate(1),
            &AgentId::from("ag_1"),
            &document,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome.label(), "already-linked");

        let record = ledger.get_agent("ag_1").await.unwrap().unwrap();
        assert_eq!(record.document_id.as_deref(), Some("doc_9"));
        assert_eq!(record.association, "already-linked");
    }
}
