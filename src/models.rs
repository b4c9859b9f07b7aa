use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized news article, independent of the provider it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub category_id: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl FeedItem {
    /// Key used to collapse the same article reported by several categories.
    /// Falls back to the title when the item has no link.
    pub fn dedupe_key(&self) -> &str {
        match self.link.as_deref() {
            Some(link) if !link.is_empty() => link,
            _ => &self.title,
        }
    }
}

/// Static reference data for a topic the reader can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: &'static str,
    pub name: &'static str,
    pub slug: &'static str,
    pub icon: &'static str,
    /// Search keywords sent to the news provider
    #[serde(skip)]
    pub topic: &'static str,
}

pub const CATEGORIES: &[Category] = &[
    Category { id: "1", name: "Business", slug: "business", icon: "💼", topic: "business markets economy startups" },
    Category { id: "2", name: "Social", slug: "social", icon: "👥", topic: "social media digital culture online communities" },
    Category { id: "3", name: "AI", slug: "ai", icon: "🤖", topic: "artificial intelligence machine learning llm" },
    Category { id: "4", name: "Robotics", slug: "robotics", icon: "🦾", topic: "robotics automation humanoid robots" },
    Category { id: "5", name: "Beauty", slug: "beauty", icon: "✨", topic: "beauty skincare cosmetics wellness" },
    Category { id: "6", name: "Tech", slug: "tech", icon: "📱", topic: "technology gadgets software cybersecurity" },
    Category { id: "7", name: "Health", slug: "health", icon: "🏥", topic: "health medicine healthcare public health" },
    Category { id: "8", name: "Science", slug: "science", icon: "🔬", topic: "science research discoveries" },
    Category { id: "9", name: "Entertainment", slug: "entertainment", icon: "🎬", topic: "entertainment movies music streaming" },
    Category { id: "10", name: "Sports", slug: "sports", icon: "⚽", topic: "sports cricket football olympics" },
    Category { id: "11", name: "Finance", slug: "finance", icon: "📈", topic: "finance stock market investment banking" },
    Category { id: "12", name: "Fashion", slug: "fashion", icon: "👗", topic: "fashion trends designers apparel" },
    Category { id: "13", name: "Travel", slug: "travel", icon: "✈️", topic: "travel tourism airlines destinations" },
    Category { id: "14", name: "Food", slug: "food", icon: "🍳", topic: "food restaurants recipes culinary" },
    Category { id: "15", name: "Environment", slug: "environment", icon: "🌍", topic: "climate environment sustainability renewable energy" },
];

pub fn find_category(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|category| category.id == id)
}

/// Resolve the given ids to categories, in catalog order. Unknown ids are ignored.
pub fn categories_for(ids: &[String]) -> Vec<&'static Category> {
    CATEGORIES
        .iter()
        .filter(|category| ids.iter().any(|id| id == category.id))
        .collect()
}
