//! Lexical (FTS5) search (spec §4.G step 1).

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::params;

use crate::error::Result;
use crate::storage::Storage;

static TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_-]+").expect("valid regex"));

/// One lexical hit: memory id and its FTS5 BM25-derived rank score (higher
/// is better; SQLite's `bm25()` returns lower-is-better, so it is negated).
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub id: String,
    pub score: f32,
}

/// Escape characters FTS5's query syntax treats specially so that raw user
/// input never breaks (or is interpreted as) a MATCH expression.
///
/// FTS5 only needs double quotes escaped when a whole phrase is quoted; the
/// simplest safe strategy is to tokenize on whitespace, strip characters
/// that have query-syntax meaning, and OR the surviving terms together.
pub fn sanitize_fts5_query(query: &str) -> String {
    let terms: Vec<String> = TERM.find_iter(query).map(|m| format!("\"{}\"", m.as_str())).collect();

    if terms.is_empty() {
        String::new()
    } else {
        terms.join(" OR ")
    }
}

impl Storage {
    /// Run an FTS5 query over memory content, returning up to `limit` hits
    /// ordered by descending relevance.
    pub fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, bm25(memory_fts) AS rank
                 FROM memory_fts
                 WHERE memory_fts MATCH ?1
                 ORDER BY rank ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![sanitized, limit as i64], |row| {
                    let id: String = row.get(0)?;
                    let rank: f64 = row.get(1)?;
                    Ok(LexicalHit { id, score: -rank as f32 })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_special_characters() {
        let sanitized = sanitize_fts5_query("what(does) \"this\" do?");
        assert_eq!(sanitized, "\"what\" OR \"does\" OR \"this\" OR \"do\"");
    }

    #[test]
    fn sanitize_empty_query_yields_empty_string() {
        assert_eq!(sanitize_fts5_query("   !!! ??? "), "");
    }

    #[test]
    fn lexical_search_finds_indexed_memory() {
        use crate::memory::store::CreateMemoryInput;

        let storage = Storage::open_in_memory().unwrap();
        storage
            .create_memory(CreateMemoryInput {
                content: "Always run migrations before deploying the service".into(),
                ..Default::default()
            })
            .unwrap();

        let hits = storage.lexical_search("migrations deploying", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
