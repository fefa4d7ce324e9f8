//! Tantivy keyword collection for BM25 search
use super::IndexError;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

const WRITER_HEAP_BYTES: usize = 20_000_000;

/// In-memory BM25 index keyed by string document ids
pub struct KeywordCollection {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    text_field: Field,
}

impl KeywordCollection {
    /// Create an empty in-memory BM25 index over `id` and `text` fields
    pub fn new() -> Result<Self, IndexError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("doc_id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let writer = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| IndexError::Backend(format!("keyword writer: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::Backend(format!("keyword reader: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            text_field,
        })
    }

    /// Index `text` under `id`, replacing any earlier version
    pub fn upsert(&self, id: &str, text: &str) -> Result<(), IndexError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Backend("keyword writer poisoned".to_string()))?;

        writer.delete_term(Term::from_field_text(self.id_field, id));
        writer
            .add_document(doc!(
                self.id_field => id,
                self.text_field => text,
            ))
            .map_err(|e| IndexError::Backend(format!("keyword insert: {}", e)))?;

        self.commit(&mut writer)
    }

    pub fn remove(&self, id: &str) -> Result<(), IndexError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Backend("keyword writer poisoned".to_string()))?;

        writer.delete_term(Term::from_field_text(self.id_field, id));
        self.commit(&mut writer)
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<(), IndexError> {
        writer
            .commit()
            .map_err(|e| IndexError::Backend(format!("keyword commit: {}", e)))?;
        self.reader
            .reload()
            .map_err(|e| IndexError::Backend(format!("keyword reload: {}", e)))?;
        Ok(())
    }

    /// Documents matching `query`, best BM25 score first
    ///
    /// Free text is parsed leniently so stray operators or quotes in user
    /// input never fail the search.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>, IndexError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (query, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!("Keyword query parsed with {} recoverable errors", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| IndexError::Backend(format!("keyword search: {}", e)))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| IndexError::Backend(format!("keyword fetch: {}", e)))?;

            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                results.push((id.to_string(), score));
            }
        }

        Ok(results)
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
