use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::Value as JsonValue;
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info};

use docrag_core::filter::{Condition, Filter};
use docrag_core::traits::KeywordIndex;
use docrag_core::types::{meta_str, DeleteSelector, IndexRecord, Meta, SearchCandidate};

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// Extra hits fetched per requested hit to leave room for post-filtering.
const FILTER_HEADROOM: usize = 4;

pub struct TantivyKeywordIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	scope_field: String,
	id_field: Field,
	scope: Field,
	doc_id_field: Field,
	text_field: Field,
	metadata_field: Field,
}

impl TantivyKeywordIndex {
	pub fn in_ram(scope_field: &str) -> Result<Self> { Self::from_index(Index::create_in_ram(build_schema()), scope_field) }

	/// Opens the index in `dir`, creating it (and the directory) when missing.
	pub fn open_or_create(dir: &Path, scope_field: &str) -> Result<Self> {
		std::fs::create_dir_all(dir)?;
		let index = Index::open_or_create(MmapDirectory::open(dir)?, build_schema())?;
		info!(dir = %dir.display(), "Keyword index opened");
		Self::from_index(index, scope_field)
	}

	fn from_index(index: Index, scope_field: &str) -> Result<Self> {
		register_tokenizer(&index);
		let schema = index.schema();
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let writer = index.writer(50_000_000)?;
		Ok(Self {
			id_field: schema.get_field("id")?,
			scope: schema.get_field("scope")?,
			doc_id_field: schema.get_field("doc_id")?,
			text_field: schema.get_field("text")?,
			metadata_field: schema.get_field("metadata_json")?,
			scope_field: scope_field.to_string(),
			writer: Mutex::new(writer),
			reader,
			index,
		})
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
		writer.commit()?;
		self.reader.reload()?;
		Ok(())
	}

	fn metadata_of(&self, doc: &TantivyDocument) -> Meta {
		doc.get_first(self.metadata_field)
			.and_then(|v| v.as_str())
			.and_then(|s| serde_json::from_str::<Meta>(s).ok())
			.unwrap_or_default()
	}

	fn id_of(&self, doc: &TantivyDocument) -> String { doc.get_first(self.id_field).and_then(|v| v.as_str()).unwrap_or("").to_string() }

	/// Replaces each record's document in the writer without committing.
	fn stage(&self, writer: &IndexWriter, records: &[IndexRecord]) -> Result<()> {
		for r in records {
			writer.delete_term(Term::from_field_text(self.id_field, &r.id));
			let scope = meta_str(&r.metadata, &self.scope_field).unwrap_or("");
			let doc_id = meta_str(&r.metadata, "doc_id").unwrap_or("");
			writer.add_document(doc!(
				self.id_field => r.id.clone(),
				self.scope => scope.to_string(),
				self.doc_id_field => doc_id.to_string(),
				self.text_field => r.text().to_string(),
				self.metadata_field => serde_json::to_string(&r.metadata)?,
			))?;
		}
		Ok(())
	}

	/// Term restriction for a scalar string condition on the scope or doc_id field.
	fn term_clause(&self, filter: &Filter) -> Vec<(Occur, Box<dyn Query>)> {
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		for (name, field) in [(self.scope_field.as_str(), self.scope), ("doc_id", self.doc_id_field)] {
			if let Some(Condition::Eq(JsonValue::String(value))) = filter.get(name) {
				let term = Term::from_field_text(field, value);
				clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
			}
		}
		clauses
	}

	fn ids_matching(&self, searcher: &Searcher, filter: &Filter) -> Result<Vec<String>> {
		let total = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1);
		let mut clauses = self.term_clause(filter);
		clauses.push((Occur::Must, Box::new(AllQuery)));
		let hits = searcher.search(&BooleanQuery::new(clauses), &TopDocs::with_limit(total))?;
		let mut ids = Vec::new();
		for (_, addr) in hits {
			let doc: TantivyDocument = searcher.doc(addr)?;
			if filter.matches(&self.metadata_of(&doc)) {
				ids.push(self.id_of(&doc));
			}
		}
		Ok(ids)
	}
}

impl KeywordIndex for TantivyKeywordIndex {
	fn index(&self, records: &[IndexRecord]) -> Result<usize> {
		if records.is_empty() {
			return Ok(0);
		}
		let mut writer = self.writer.lock().map_err(|_| anyhow!("keyword index writer lock poisoned"))?;
		if let Err(e) = self.stage(&writer, records) {
			// Nothing staged may leak into a later commit.
			writer.rollback()?;
			return Err(e);
		}
		self.commit(&mut writer)?;
		debug!(records = records.len(), "Keyword index updated");
		Ok(records.len())
	}

	fn search(&self, query: &str, top_k: usize, filter: &Filter) -> Result<Vec<SearchCandidate>> {
		if top_k == 0 || query.trim().is_empty() {
			return Ok(Vec::new());
		}
		let searcher = self.reader.searcher();
		let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (text_query, errors) = parser.parse_query_lenient(query);
		if !errors.is_empty() {
			debug!(errors = errors.len(), "Keyword query parsed leniently");
		}
		let mut clauses = self.term_clause(filter);
		clauses.push((Occur::Must, text_query));
		let combined = BooleanQuery::new(clauses);

		let top_docs = searcher.search(&combined, &TopDocs::with_limit(top_k.saturating_mul(FILTER_HEADROOM)))?;
		let mut hits = Vec::new();
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let metadata = self.metadata_of(&doc);
			// Conditions the term clauses cannot express are checked here.
			if !filter.matches(&metadata) {
				continue;
			}
			hits.push(SearchCandidate::new(self.id_of(&doc), score, metadata));
			if hits.len() == top_k {
				break;
			}
		}
		Ok(hits)
	}

	fn delete(&self, selector: &DeleteSelector) -> Result<usize> {
		let searcher = self.reader.searcher();
		let ids = match selector {
			DeleteSelector::Ids(ids) => ids.clone(),
			DeleteSelector::Filter(filter) if filter.is_empty() => return Ok(0),
			DeleteSelector::Filter(filter) => self.ids_matching(&searcher, filter)?,
		};
		let mut removed = 0usize;
		let mut writer = self.writer.lock().map_err(|_| anyhow!("keyword index writer lock poisoned"))?;
		for id in &ids {
			let term = Term::from_field_text(self.id_field, id);
			removed += searcher.search(&TermQuery::new(term.clone(), IndexRecordOption::Basic), &Count)?;
			writer.delete_term(term);
		}
		self.commit(&mut writer)?;
		Ok(removed)
	}
}
