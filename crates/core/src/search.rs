//! Query parsing and field-weighted query construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::index::IndexError;
use crate::model::Entry;

/// Backend-agnostic query tree handed to the index engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomQuery {
    /// Match the analyzed value against one field; `phrase` requires the
    /// tokens in order.
    Match {
        field: String,
        value: String,
        phrase: bool,
        boost: f32,
    },
    /// All sub-queries must match.
    Must(Vec<RoomQuery>),
    /// Any sub-query may match.
    Disjunction(Vec<RoomQuery>),
}

/// Executes a constructed query against the index.
pub trait SearchRepository: Send + Sync {
    fn search(
        &self,
        query: &RoomQuery,
        limit: usize,
        offset: usize,
        sort_by: &[String],
    ) -> Result<Vec<Entry>, IndexError>;
}

/// Per-field boosts; unlisted fields keep the default weight.
fn field_boost(field: &str) -> f32 {
    match field {
        "language" => 100.0,
        "name" => 10.0,
        "server" => 10.0,
        "alias" => 5.0,
        _ => 1.0,
    }
}

/// Search service
pub struct Search {
    repo: Arc<dyn SearchRepository>,
}

impl Search {
    pub fn new(repo: Arc<dyn SearchRepository>) -> Self {
        Self { repo }
    }

    /// Run a free-text query with optional embedded `key:value` tokens.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
        sort_by: &[String],
    ) -> Result<Vec<Entry>, IndexError> {
        let (term, fields) = match_fields(query);
        self.repo
            .search(&build_query(&term, &fields), limit, offset, sort_by)
    }
}

/// Split `key:value` tokens out of a space-separated query; the residual
/// trimmed free text becomes the primary term.
pub fn match_fields(query: &str) -> (String, BTreeMap<String, String>) {
    if !query.contains(':') {
        return (query.trim().to_string(), BTreeMap::new());
    }

    let mut fields = BTreeMap::new();
    let mut residual = Vec::new();
    for part in query.split(' ') {
        match part.trim().split_once(':') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
            Some(_) => {} // malformed pair, dropped like the residual token
            None => residual.push(part),
        }
    }

    (residual.join(" ").trim().to_string(), fields)
}

/// Disjunction over name/alias/topic/server, phrase-matched when the term
/// contains a space, plus a boolean must group for the extracted fields.
pub fn build_query(term: &str, fields: &BTreeMap<String, String>) -> RoomQuery {
    let term = term.trim();
    let phrase = term.contains(' ');
    let mut queries: Vec<RoomQuery> = ["name", "alias", "topic", "server"]
        .into_iter()
        .map(|field| RoomQuery::Match {
            field: field.to_string(),
            value: term.to_string(),
            phrase,
            boost: field_boost(field),
        })
        .collect();

    if !fields.is_empty() {
        let musts = fields
            .iter()
            .map(|(field, value)| RoomQuery::Match {
                field: field.clone(),
                value: value.clone(),
                phrase: false,
                boost: field_boost(field),
            })
            .collect();
        queries.push(RoomQuery::Must(musts));
    }

    RoomQuery::Disjunction(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_fields_plain_query() {
        let (term, fields) = match_fields("hello world");
        assert_eq!(term, "hello world");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_match_fields_extracts_pairs() {
        let (term, fields) = match_fields("foss language:EN");
        assert_eq!(term, "foss");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("language").map(String::as_str), Some("EN"));
    }

    #[test]
    fn test_match_fields_multiple_pairs() {
        let (term, fields) = match_fields("language:DE server:example.com chat");
        assert_eq!(term, "chat");
        assert_eq!(fields.get("language").map(String::as_str), Some("DE"));
        assert_eq!(fields.get("server").map(String::as_str), Some("example.com"));
    }

    #[test]
    fn test_single_word_builds_match_queries() {
        let query = build_query("hello", &BTreeMap::new());
        let RoomQuery::Disjunction(subs) = query else {
            panic!("expected disjunction");
        };
        assert_eq!(subs.len(), 4);
        for sub in &subs {
            let RoomQuery::Match { phrase, .. } = sub else {
                panic!("expected match");
            };
            assert!(!phrase);
        }
    }

    #[test]
    fn test_multi_word_builds_phrase_queries() {
        let query = build_query("hello world", &BTreeMap::new());
        let RoomQuery::Disjunction(subs) = query else {
            panic!("expected disjunction");
        };
        for sub in &subs {
            let RoomQuery::Match { phrase, .. } = sub else {
                panic!("expected match");
            };
            assert!(phrase);
        }
    }

    #[test]
    fn test_field_pairs_become_must_group() {
        let (term, fields) = match_fields("foss language:EN");
        let query = build_query(&term, &fields);
        let RoomQuery::Disjunction(subs) = query else {
            panic!("expected disjunction");
        };
        assert_eq!(subs.len(), 5);
        let RoomQuery::Must(musts) = &subs[4] else {
            panic!("expected must group last");
        };
        assert_eq!(musts.len(), 1);
        assert_eq!(
            musts[0],
            RoomQuery::Match {
                field: "language".to_string(),
                value: "EN".to_string(),
                phrase: false,
                boost: 100.0,
            }
        );
    }

    #[test]
    fn test_field_boosts() {
        let query = build_query("x", &BTreeMap::new());
        let RoomQuery::Disjunction(subs) = query else {
            panic!("expected disjunction");
        };
        let boosts: Vec<(String, f32)> = subs
            .iter()
            .map(|sub| {
                let RoomQuery::Match { field, boost, .. } = sub else {
                    panic!("expected match");
                };
                (field.clone(), *boost)
            })
            .collect();
        assert_eq!(
            boosts,
            vec![
                ("name".to_string(), 10.0),
                ("alias".to_string(), 5.0),
                ("topic".to_string(), 1.0),
                ("server".to_string(), 10.0),
            ]
        );
    }
}
