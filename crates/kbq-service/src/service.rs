use tracing::{debug, error, info, warn};

use kbq_core::config::{Config, QuerySettings, ServiceConfig};
use kbq_core::traits::{Embedder, Retriever};
use kbq_core::types::{Candidate, QueryRequest, QueryResult, Reference, ServiceState};
use kbq_core::{Error, Result, SourceCatalog};
use kbq_embed::embedder_from_settings;
use kbq_store::ArtifactStore;
use kbq_vector::VectorIndex;

use crate::answer::{assemble_answer, clip_with_marker, truncate_with_ellipsis};
use crate::diversity::DiversityReranker;

struct Engine {
    embedder: Box<dyn Embedder>,
    retriever: Box<dyn Retriever>,
    // Owns the materialized artifacts for as long as the service lives.
    _store: Option<ArtifactStore>,
}

/// Answers questions against one knowledge-base index.
///
/// Construction never fails outright: the first failing step leaves the
/// service in [`ServiceState::Error`] and every later query reports it.
pub struct QueryService {
    state: ServiceState,
    settings: QuerySettings,
    catalog: SourceCatalog,
    reranker: DiversityReranker,
    engine: Option<Engine>,
}

impl QueryService {
    /// Build from layered configuration. Extraction errors become the service error.
    pub fn from_config(config: &Config) -> Self {
        match config.service_config() {
            Ok(service_config) => Self::new(&service_config),
            Err(e) => {
                error!(error = %e, "invalid service configuration");
                Self::unconfigured(QuerySettings::default(), SourceCatalog::default()).fail(e)
            }
        }
    }

    pub fn new(config: &ServiceConfig) -> Self {
        let service = Self::unconfigured(config.query.clone(), config.sources.clone());
        match Self::build(config) {
            Ok(engine) => service.ready(engine),
            Err(e) => {
                error!(error = %e, index = %config.index.describe(), "query service failed to initialize");
                service.fail(e)
            }
        }
    }

    /// Assemble a ready service from already constructed parts.
    pub fn with_parts(
        settings: QuerySettings,
        catalog: SourceCatalog,
        embedder: Box<dyn Embedder>,
        retriever: Box<dyn Retriever>,
    ) -> Self {
        Self::unconfigured(settings, catalog).ready(Engine { embedder, retriever, _store: None })
    }

    fn unconfigured(settings: QuerySettings, catalog: SourceCatalog) -> Self {
        let reranker = DiversityReranker::new(settings.diversity_quota);
        Self { state: ServiceState::Uninitialized, settings, catalog, reranker, engine: None }
    }

    fn ready(mut self, engine: Engine) -> Self {
        if self.state == ServiceState::Uninitialized {
            info!(embedder = engine.embedder.id(), chunks = engine.retriever.len(), "query service ready");
            self.engine = Some(engine);
            self.state = ServiceState::Ready;
        }
        self
    }

    fn fail(mut self, e: Error) -> Self {
        if self.state == ServiceState::Uninitialized {
            self.state = ServiceState::Error(e);
        }
        self
    }

    fn build(config: &ServiceConfig) -> Result<Engine> {
        config.validate()?;
        let embedder = embedder_from_settings(&config.embedding)?;
        let mut store = ArtifactStore::from_locator(&config.index)?;
        let path = store.materialize()?;
        let index = VectorIndex::load(&path)?;
        if !index.is_empty() && index.dim() != embedder.dim() {
            return Err(Error::IndexLoad(format!(
                "index has {} dimensions but embedder {} produces {}",
                index.dim(),
                embedder.id(),
                embedder.dim()
            )));
        }
        Ok(Engine { embedder, retriever: Box::new(index), _store: Some(store) })
    }

    pub fn state(&self) -> &ServiceState { &self.state }

    /// Number of indexed chunks, once ready.
    pub fn chunk_count(&self) -> Option<usize> { self.engine.as_ref().map(|e| e.retriever.len()) }

    pub fn embedder_id(&self) -> Option<&str> { self.engine.as_ref().map(|e| e.embedder.id()) }

    pub fn settings(&self) -> &QuerySettings { &self.settings }

    /// Run one query. Failures are reported in `QueryResult::error`.
    pub fn query(&self, request: &QueryRequest) -> QueryResult {
        let engine = match (&self.state, &self.engine) {
            (ServiceState::Ready, Some(engine)) => engine,
            (ServiceState::Error(e), _) => return QueryResult::failure(e),
            _ => return QueryResult::failure(&Error::Config("query service is not initialized".to_string())),
        };
        match self.run(engine, request) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "query failed");
                QueryResult::failure(&e)
            }
        }
    }

    fn run(&self, engine: &Engine, request: &QueryRequest) -> Result<QueryResult> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::Retrieval("question is empty".to_string()));
        }
        let top_k = if request.top_k == 0 { self.settings.top_k } else { request.top_k };
        let text = self.query_text(question, request.context.as_deref());
        if request.diagnostic {
            info!(query = %text, top_k, "diagnostic query");
        } else {
            debug!(query = %text, top_k, "query");
        }

        let vector = engine.embedder.embed(&text)?;
        let breadth = self.settings.breadth_for(top_k);
        let hits = engine.retriever.retrieve(&vector, breadth)?;
        let pool = self.catalog.label(hits);
        debug!(breadth, candidates = pool.len(), "candidates retrieved");

        let selected = self.reranker.rerank(pool, top_k);
        self.report_distribution(&selected, request.diagnostic);

        let references: Vec<Reference> = selected.iter().map(|c| self.reference(c)).collect();
        for (rank, r) in references.iter().enumerate() {
            if request.diagnostic {
                info!(rank = rank + 1, source = %r.source_label, score = r.similarity_score, file = %r.file_path, "reference");
            } else {
                debug!(rank = rank + 1, source = %r.source_label, score = r.similarity_score, file = %r.file_path, "reference");
            }
        }
        let answer =
            assemble_answer(&selected, &self.catalog, self.reranker.quota(), self.settings.answer_excerpt_chars);
        Ok(QueryResult::new(answer, references))
    }

    fn query_text(&self, question: &str, context: Option<&str>) -> String {
        let question = clip_with_marker(question, self.settings.max_question_chars);
        match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) if self.settings.max_context_chars > 0 => {
                format!("{question}\n{}", clip_with_marker(context, self.settings.max_context_chars))
            }
            _ => question,
        }
    }

    fn reference(&self, candidate: &Candidate) -> Reference {
        let chunk = &candidate.chunk;
        Reference {
            source_label: candidate.source_label.clone(),
            file_name: chunk.file_name().unwrap_or_default().to_string(),
            file_path: chunk.file_path().unwrap_or_default().to_string(),
            similarity_score: round_score(candidate.similarity_score),
            text_preview: truncate_with_ellipsis(&chunk.text, self.settings.preview_chars),
            node_id: chunk.id.clone(),
        }
    }

    fn report_distribution(&self, selected: &[Candidate], diagnostic: bool) {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for c in selected {
            match counts.iter_mut().find(|(label, _)| *label == c.source_label) {
                Some((_, n)) => *n += 1,
                None => counts.push((c.source_label.as_str(), 1)),
            }
        }
        let summary = counts.iter().map(|(label, n)| format!("{label}={n}")).collect::<Vec<_>>().join(", ");
        if diagnostic {
            info!(sources = counts.len(), distribution = %summary, "source distribution");
        } else {
            debug!(sources = counts.len(), distribution = %summary, "source distribution");
        }

        if counts.len() == 1 {
            warn!(source = counts[0].0, "all references come from a single source");
        } else if let Some((label, n)) = counts.iter().find(|(_, n)| *n > self.reranker.quota()) {
            warn!(source = label, count = n, quota = self.reranker.quota(), "source exceeds diversity quota");
        }
    }
}

/// Clamp to 0..=1 and round to three decimals.
pub fn round_score(score: f32) -> f64 {
    let clamped = if score.is_finite() { f64::from(score).clamp(0.0, 1.0) } else { 0.0 };
    (clamped * 1000.0).round() / 1000.0
}
