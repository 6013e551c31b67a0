//! Tantivy-backed inverted index.
//!
//! The live index lives under `<base>/index`. A rebuild creates a fresh
//! index in `<base>/index.new` and promotes it by rename, so concurrent
//! readers observe either the old or the new document set, never a partial
//! one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, BoostQuery, EmptyQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, Value, FAST, STORED, STRING, TEXT,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, Order, TantivyDocument, Term};
use tracing::{info, warn};

use super::{IndexError, IndexRepository};
use crate::model::Entry;
use crate::search::{RoomQuery, SearchRepository};

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone, Copy)]
struct Fields {
    id: Field,
    kind: Field,
    alias: Field,
    name: Field,
    topic: Field,
    avatar: Field,
    avatar_url: Field,
    server: Field,
    members: Field,
    language: Field,
}

struct Handle {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    fields: Fields,
}

/// Index engine handle; swap-safe behind a read-write lock.
pub struct SearchIndex {
    base_dir: PathBuf,
    inner: RwLock<Handle>,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("type", STRING | STORED);
    builder.add_text_field("alias", TEXT | STORED);
    builder.add_text_field("name", TEXT | STORED);
    builder.add_text_field("topic", TEXT | STORED);
    builder.add_text_field("avatar", STORED);
    builder.add_text_field("avatar_url", STORED);
    builder.add_text_field("server", TEXT | STORED);
    builder.add_u64_field("members", STORED | FAST);
    builder.add_text_field("language", TEXT | STORED);
    builder.build()
}

fn resolve_fields(schema: &Schema) -> Result<Fields, IndexError> {
    Ok(Fields {
        id: schema.get_field("id")?,
        kind: schema.get_field("type")?,
        alias: schema.get_field("alias")?,
        name: schema.get_field("name")?,
        topic: schema.get_field("topic")?,
        avatar: schema.get_field("avatar")?,
        avatar_url: schema.get_field("avatar_url")?,
        server: schema.get_field("server")?,
        members: schema.get_field("members")?,
        language: schema.get_field("language")?,
    })
}

impl SearchIndex {
    /// Open the live index, creating it (and the base directory) on first
    /// use.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self, IndexError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        let handle = open_handle(&base_dir.join("index"))?;
        info!(path = %base_dir.display(), "search index opened");
        Ok(Self {
            base_dir,
            inner: RwLock::new(handle),
        })
    }

    fn entry_doc(&self, fields: &Fields, entry: &Entry) -> TantivyDocument {
        doc!(
            fields.id => entry.id.clone(),
            fields.kind => entry.kind.clone(),
            fields.alias => entry.alias.clone(),
            fields.name => entry.name.clone(),
            fields.topic => entry.topic.clone(),
            fields.avatar => entry.avatar.clone(),
            fields.avatar_url => entry.avatar_url.clone(),
            fields.server => entry.server.clone(),
            fields.members => entry.members,
            fields.language => entry.language.clone(),
        )
    }

    fn entry_from_doc(fields: &Fields, doc: &TantivyDocument) -> Entry {
        let text = |field: Field| -> String {
            doc.get_first(field)
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Entry {
            id: text(fields.id),
            kind: text(fields.kind),
            alias: text(fields.alias),
            name: text(fields.name),
            topic: text(fields.topic),
            avatar: text(fields.avatar),
            avatar_url: text(fields.avatar_url),
            server: text(fields.server),
            members: doc
                .get_first(fields.members)
                .and_then(|value| value.as_u64())
                .unwrap_or_default(),
            language: text(fields.language),
        }
    }

    fn field_by_name(fields: &Fields, name: &str) -> Option<Field> {
        match name {
            "id" => Some(fields.id),
            "type" => Some(fields.kind),
            "alias" => Some(fields.alias),
            "name" => Some(fields.name),
            "topic" => Some(fields.topic),
            "server" => Some(fields.server),
            "language" => Some(fields.language),
            _ => None,
        }
    }

    fn analyze(index: &Index, field: Field, text: &str) -> Vec<Term> {
        let Ok(mut analyzer) = index.tokenizer_for_field(field) else {
            return Vec::new();
        };
        let mut terms = Vec::new();
        let mut stream = analyzer.token_stream(text);
        while stream.advance() {
            terms.push(Term::from_field_text(field, &stream.token().text));
        }
        terms
    }

    fn to_tantivy(handle: &Handle, query: &RoomQuery) -> Box<dyn Query> {
        match query {
            RoomQuery::Match {
                field,
                value,
                phrase,
                boost,
            } => {
                let Some(field) = Self::field_by_name(&handle.fields, field) else {
                    return Box::new(EmptyQuery);
                };
                let terms = Self::analyze(&handle.index, field, value);
                let inner: Box<dyn Query> = if terms.is_empty() {
                    Box::new(EmptyQuery)
                } else if *phrase && terms.len() > 1 {
                    Box::new(PhraseQuery::new(terms))
                } else if terms.len() == 1 {
                    Box::new(TermQuery::new(
                        terms.into_iter().next().unwrap(),
                        IndexRecordOption::WithFreqs,
                    ))
                } else {
                    Box::new(BooleanQuery::new(
                        terms
                            .into_iter()
                            .map(|term| {
                                (
                                    Occur::Should,
                                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
                                        as Box<dyn Query>,
                                )
                            })
                            .collect(),
                    ))
                };
                if (*boost - 1.0).abs() > f32::EPSILON {
                    Box::new(BoostQuery::new(inner, *boost))
                } else {
                    inner
                }
            }
            RoomQuery::Must(subs) => Box::new(BooleanQuery::new(
                subs.iter()
                    .map(|sub| (Occur::Must, Self::to_tantivy(handle, sub)))
                    .collect(),
            )),
            RoomQuery::Disjunction(subs) => Box::new(BooleanQuery::new(
                subs.iter()
                    .map(|sub| (Occur::Should, Self::to_tantivy(handle, sub)))
                    .collect(),
            )),
        }
    }
}

fn open_handle(dir: &Path) -> Result<Handle, IndexError> {
    fs::create_dir_all(dir)?;
    let directory = MmapDirectory::open(dir)?;
    let index = if Index::exists(&directory)? {
        Index::open_in_dir(dir)?
    } else {
        Index::create_in_dir(dir, build_schema())?
    };
    let fields = resolve_fields(&index.schema())?;
    let reader = index.reader()?;
    let writer = index.writer(WRITER_HEAP_BYTES)?;
    Ok(Handle {
        index,
        reader,
        writer,
        fields,
    })
}

impl IndexRepository for SearchIndex {
    fn index_batch(&self, entries: &[(String, Entry)]) -> Result<(), IndexError> {
        let mut handle = self.inner.write().unwrap();
        let fields = handle.fields;
        for (id, entry) in entries {
            handle
                .writer
                .delete_term(Term::from_field_text(fields.id, id));
            handle.writer.add_document(self.entry_doc(&fields, entry))?;
        }
        handle.writer.commit()?;
        handle.reader.reload()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), IndexError> {
        let mut handle = self.inner.write().unwrap();
        let term = Term::from_field_text(handle.fields.id, id);
        handle.writer.delete_term(term);
        handle.writer.commit()?;
        handle.reader.reload()?;
        Ok(())
    }

    /// Build an empty sibling index and promote it by rename. The handle
    /// is replaced under the write lock, which is the linearization point
    /// for every subsequent search.
    fn swap(&self) -> Result<(), IndexError> {
        let mut guard = self.inner.write().unwrap();

        let live = self.base_dir.join("index");
        let fresh = self.base_dir.join("index.new");
        let trash = self.base_dir.join("index.old");

        if fresh.exists() {
            fs::remove_dir_all(&fresh)?;
        }
        fs::create_dir_all(&fresh)?;
        Index::create_in_dir(&fresh, build_schema())?;

        if trash.exists() {
            fs::remove_dir_all(&trash)?;
        }
        if live.exists() {
            fs::rename(&live, &trash)?;
        }
        fs::rename(&fresh, &live)?;

        *guard = open_handle(&live)?;

        if let Err(e) = fs::remove_dir_all(&trash) {
            warn!(error = %e, "cannot remove old index");
        }
        info!("index swapped");
        Ok(())
    }

    fn len(&self) -> usize {
        let handle = self.inner.read().unwrap();
        handle.reader.searcher().num_docs() as usize
    }
}

impl SearchRepository for SearchIndex {
    fn search(
        &self,
        query: &RoomQuery,
        limit: usize,
        offset: usize,
        sort_by: &[String],
    ) -> Result<Vec<Entry>, IndexError> {
        let handle = self.inner.read().unwrap();
        let searcher = handle.reader.searcher();
        let query = Self::to_tantivy(&handle, query);
        let limit = limit.max(1);

        let addresses: Vec<tantivy::DocAddress> = match members_order(sort_by) {
            Some(order) => searcher
                .search(
                    &query,
                    &TopDocs::with_limit(limit)
                        .and_offset(offset)
                        .order_by_fast_field::<u64>("members", order),
                )?
                .into_iter()
                .map(|(_members, address)| address)
                .collect(),
            None => searcher
                .search(&query, &TopDocs::with_limit(limit).and_offset(offset))?
                .into_iter()
                .map(|(_score, address)| address)
                .collect(),
        };

        let mut entries = Vec::with_capacity(addresses.len());
        for address in addresses {
            let document: TantivyDocument = searcher.doc(address)?;
            entries.push(Self::entry_from_doc(&handle.fields, &document));
        }
        Ok(entries)
    }
}

/// The only supported sort vector is by member count; anything else falls
/// back to relevance.
fn members_order(sort_by: &[String]) -> Option<Order> {
    for key in sort_by {
        match key.as_str() {
            "members" => return Some(Order::Asc),
            "-members" => return Some(Order::Desc),
            other => warn!(sort_by = other, "unsupported sort field, using relevance"),
        }
    }
    None
}
