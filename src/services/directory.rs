//! PPA directory search

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ServiceResult;
use crate::storage::{collections, to_fields, Direction, DocumentStore, Query};

/// States selectable in a directory search
pub const STATES: &[&str] = &[
    "Abia",
    "Adamawa",
    "Akwa Ibom",
    "Anambra",
    "Bauchi",
    "Bayelsa",
    "Benue",
    "Borno",
    "Cross River",
    "Delta",
    "Ebonyi",
    "Edo",
    "Ekiti",
    "Enugu",
    "FCT",
    "Abuja",
    "Gombe",
    "Imo",
    "Jigawa",
    "Kaduna",
    "Kano",
    "Katsina",
    "Kebbi",
    "Kogi",
    "Kwara",
    "Lagos",
    "Nasarawa",
    "Niger",
    "Ogun",
    "Ondo",
    "Osun",
    "Oyo",
    "Plateau",
    "Rivers",
    "Sokoto",
    "Taraba",
    "Yobe",
    "Zamfara",
];

/// Canonical spelling of a state name, matched case-insensitively
pub fn canonical_state(name: &str) -> Option<&'static str> {
    let name = name.trim();
    STATES
        .iter()
        .copied()
        .find(|state| state.eq_ignore_ascii_case(name))
}

/// A place of primary assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ppa {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub state: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews: u32,
    #[serde(default)]
    pub description: String,
}

/// Search parameters. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySearch {
    /// Name prefix
    #[serde(default, alias = "q")]
    pub text: String,
    /// Exact state
    #[serde(default)]
    pub state: String,
}

impl DirectorySearch {
    pub fn new(text: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            state: state.into(),
        }
    }

    fn to_query(&self) -> Query {
        let mut query = Query::collection(collections::PPAS);

        // The prefix is matched as typed, trailing spaces included
        if !self.text.is_empty() {
            query = query.where_prefix("name", self.text.as_str());
        }

        let state = self.state.trim();
        if !state.is_empty() {
            query = query.where_eq("state", state);
        }

        query.order_by("name", Direction::Asc)
    }
}

#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn DocumentStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Run a search. The result replaces any earlier result; there is no paging.
    pub async fn search(&self, search: &DirectorySearch) -> ServiceResult<Vec<Ppa>> {
        let docs = self.store.query(&search.to_query()).await?;
        let mut ppas = Vec::with_capacity(docs.len());
        for doc in &docs {
            ppas.push(doc.decode()?);
        }

        tracing::debug!(
            text = %search.text,
            state = %search.state,
            results = ppas.len(),
            "Directory search"
        );
        Ok(ppas)
    }

    /// Bulk insert PPA records, returning how many were written
    pub async fn import(&self, records: &[Ppa]) -> ServiceResult<usize> {
        for record in records {
            self.store.add(collections::PPAS, to_fields(record)?).await?;
        }
        tracing::info!(count = records.len(), "Imported PPAs");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;

    fn ppa(name: &str, state: &str) -> Ppa {
        Ppa {
            id: String::new(),
            name: name.to_string(),
            location: "Somewhere".to_string(),
            state: state.to_string(),
            rating: 4.0,
            reviews: 10,
            description: String::new(),
        }
    }

    async fn directory() -> DirectoryService {
        let directory = DirectoryService::new(Arc::new(LocalStore::in_memory().await));
        directory
            .import(&[
                ppa("Lagos State Secretariat", "Lagos"),
                ppa("Lagos Sports Centre", "Ogun"),
                ppa("Lagos University Teaching Hospital", "Lagos"),
                ppa("Kano Secretariat", "Kano"),
                ppa("Lagos Shipyard", "Lagos"),
                ppa("Ikeja General Hospital", "Lagos"),
            ])
            .await
            .unwrap();
        directory
    }

    #[tokio::test]
    async fn test_prefix_and_state() {
        let directory = directory().await;
        let results = directory
            .search(&DirectorySearch::new("Lagos S", "Lagos"))
            .await
            .unwrap();

        let names: Vec<&str> = results.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Lagos Shipyard", "Lagos State Secretariat"]);
        assert!(results
            .iter()
            .all(|p| p.name.starts_with("Lagos S") && p.state == "Lagos"));
    }

    #[tokio::test]
    async fn test_prefix_keeps_trailing_space() {
        let directory = directory().await;
        directory.import(&[ppa("Lagosian Hotel", "Lagos")]).await.unwrap();

        let spaced = directory
            .search(&DirectorySearch::new("Lagos ", ""))
            .await
            .unwrap();
        assert_eq!(spaced.len(), 4);
        assert!(spaced.iter().all(|p| p.name != "Lagosian Hotel"));

        let bare = directory
            .search(&DirectorySearch::new("Lagos", ""))
            .await
            .unwrap();
        assert_eq!(bare.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_filters_return_everything() {
        let directory = directory().await;
        let all = directory.search(&DirectorySearch::default()).await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].name, "Ikeja General Hospital");

        let in_lagos = directory
            .search(&DirectorySearch::new("", "Lagos"))
            .await
            .unwrap();
        assert_eq!(in_lagos.len(), 4);

        let by_prefix = directory
            .search(&DirectorySearch::new("Kano", ""))
            .await
            .unwrap();
        assert_eq!(by_prefix.len(), 1);
    }

    #[tokio::test]
    async fn test_records_round_trip() {
        let directory = directory().await;
        let results = directory
            .search(&DirectorySearch::new("Kano", "Kano"))
            .await
            .unwrap();
        assert_eq!(results[0].rating, 4.0);
        assert_eq!(results[0].reviews, 10);
        assert!(!results[0].id.is_empty());
    }

    #[test]
    fn test_canonical_state() {
        assert_eq!(canonical_state(" lagos "), Some("Lagos"));
        assert_eq!(canonical_state("fct"), Some("FCT"));
        assert_eq!(canonical_state("Atlantis"), None);
        assert_eq!(STATES.len(), 38);
    }
}
