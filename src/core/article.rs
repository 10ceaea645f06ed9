//! Bundled article index
//!
//! The index is loaded once from the embedded articles.toml and treated as
//! read-only for the lifetime of the process. It feeds three surfaces: the
//! browse listing, the headline projection embedded in the system prompt, and
//! the detail projection returned to the model by the lookup tool.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub image_url: String,
    pub district: String,
    pub category: String,
    pub tags: Vec<String>,
    pub timestamp: String,
    pub author: String,
}

/// Headline projection embedded in the system prompt. Summaries are withheld
/// so the model has to fetch details through the tool instead of answering
/// from the prompt alone.
#[derive(Debug, Serialize)]
pub struct Headline<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub district: &'a str,
    pub category: &'a str,
    pub tags: &'a [String],
}

/// Detail projection returned to the model by `fetch_article_details`.
/// Internal fields (id, image_url, tags) stay out of the tool payload.
#[derive(Debug, Serialize)]
pub struct ArticleDetails<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub author: &'a str,
    pub timestamp: &'a str,
}

#[derive(Deserialize)]
struct ArticleIndexConfig {
    districts: Vec<String>,
    categories: Vec<String>,
    hints: Vec<String>,
    articles: Vec<Article>,
}

#[derive(Debug)]
pub struct ArticleIndex {
    districts: Vec<String>,
    categories: Vec<String>,
    hints: Vec<String>,
    articles: Vec<Article>,
}

impl ArticleIndex {
    /// Load the index from the embedded configuration.
    pub fn bundled() -> Self {
        const INDEX_CONTENT: &str = include_str!("articles.toml");

        let config: ArticleIndexConfig =
            toml::from_str(INDEX_CONTENT).expect("Failed to parse articles.toml");

        Self {
            districts: config.districts,
            categories: config.categories,
            hints: config.hints,
            articles: config.articles,
        }
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn districts(&self) -> &[String] {
        &self.districts
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// Articles whose ids appear in `ids`. Unknown ids are silently dropped.
    pub fn lookup_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Vec<&Article> {
        self.articles
            .iter()
            .filter(|article| ids.iter().any(|id| id.as_ref() == article.id))
            .collect()
    }

    /// Articles matching the given district and category filters. `None`
    /// leaves that dimension unfiltered.
    pub fn filter(&self, district: Option<&str>, category: Option<&str>) -> Vec<&Article> {
        self.articles
            .iter()
            .filter(|article| {
                district.is_none_or(|d| article.district.eq_ignore_ascii_case(d))
                    && category.is_none_or(|c| article.category.eq_ignore_ascii_case(c))
            })
            .collect()
    }

    pub fn headlines(&self) -> Vec<Headline<'_>> {
        self.articles
            .iter()
            .map(|article| Headline {
                id: &article.id,
                title: &article.title,
                district: &article.district,
                category: &article.category,
                tags: &article.tags,
            })
            .collect()
    }
}

impl Article {
    pub fn details(&self) -> ArticleDetails<'_> {
        ArticleDetails {
            title: &self.title,
            summary: &self.summary,
            author: &self.author,
            timestamp: &self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_index_loads() {
        let index = ArticleIndex::bundled();
        assert!(!index.articles().is_empty());
        assert!(!index.districts().is_empty());
        assert!(!index.hints().is_empty());
    }

    #[test]
    fn lookup_drops_unknown_ids_silently() {
        let index = ArticleIndex::bundled();
        let found = index.lookup_by_ids(&["1", "99"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "1");
    }

    #[test]
    fn lookup_with_no_matches_is_empty() {
        let index = ArticleIndex::bundled();
        assert!(index.lookup_by_ids(&["99", "100"]).is_empty());
    }

    #[test]
    fn filters_compose() {
        let index = ArticleIndex::bundled();

        let bhubaneswar = index.filter(Some("Bhubaneswar"), None);
        assert!(!bhubaneswar.is_empty());
        assert!(bhubaneswar.iter().all(|a| a.district == "Bhubaneswar"));

        let tech = index.filter(Some("Bhubaneswar"), Some("Technology"));
        assert_eq!(tech.len(), 1);
        assert_eq!(tech[0].id, "5");

        let all = index.filter(None, None);
        assert_eq!(all.len(), index.articles().len());
    }

    #[test]
    fn details_projection_narrows_fields() {
        let index = ArticleIndex::bundled();
        let article = &index.articles()[0];
        let details = serde_json::to_value(article.details()).unwrap();

        assert!(details.get("title").is_some());
        assert!(details.get("summary").is_some());
        assert!(details.get("id").is_none());
        assert!(details.get("image_url").is_none());
        assert!(details.get("tags").is_none());
    }

    #[test]
    fn headlines_withhold_summaries() {
        let index = ArticleIndex::bundled();
        let headlines = serde_json::to_value(index.headlines()).unwrap();
        let first = &headlines[0];

        assert!(first.get("id").is_some());
        assert!(first.get("summary").is_none());
    }
}
