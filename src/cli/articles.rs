//! Article browse command.

use std::error::Error;

use crate::core::article::{Article, ArticleIndex};

pub const ARTICLES_PER_PAGE: usize = 6;

pub fn run(
    district: Option<&str>,
    category: Option<&str>,
    page: usize,
) -> Result<(), Box<dyn Error>> {
    let index = ArticleIndex::bundled();
    let matches = index.filter(district, category);

    if matches.is_empty() {
        println!("No stories found for this selection.");
        println!("Districts:  {}", index.districts().join(", "));
        println!("Categories: {}", index.categories().join(", "));
        return Ok(());
    }

    let (page_articles, total_pages) = paginate(&matches, page);
    for article in page_articles {
        print_article(article);
    }
    if total_pages > 1 {
        println!("Page {} of {}", page.clamp(1, total_pages), total_pages);
    }
    Ok(())
}

/// Clamp `page` into range and slice out its articles.
fn paginate<'a>(matches: &'a [&'a Article], page: usize) -> (&'a [&'a Article], usize) {
    let total_pages = matches.len().div_ceil(ARTICLES_PER_PAGE);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * ARTICLES_PER_PAGE;
    let end = (start + ARTICLES_PER_PAGE).min(matches.len());
    (&matches[start..end], total_pages)
}

fn print_article(article: &Article) {
    println!("{}", article.title);
    println!(
        "  {} · {} · {} · {}",
        article.district, article.category, article.timestamp, article.author
    );
    println!("  {}", article.summary);
    println!("  [{}]", article.tags.join(", "));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_out_of_range_pages() {
        let index = ArticleIndex::bundled();
        let all = index.filter(None, None);

        let (first, total) = paginate(&all, 0);
        assert_eq!(total, 2);
        assert_eq!(first.len(), ARTICLES_PER_PAGE);

        let (last, _) = paginate(&all, 99);
        assert_eq!(last.len(), all.len() - ARTICLES_PER_PAGE);
    }

    #[test]
    fn filtered_listing_runs() {
        assert!(run(Some("Puri"), None, 1).is_ok());
        assert!(run(Some("Nowhere"), None, 1).is_ok());
    }
}
