//! Topic → category classification.
//!
//! One constrained LLM completion first; on any failure (disabled client, HTTP
//! error, a label outside the fixed set) the keyword table decides. Errors are
//! logged and absorbed, never returned.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::llm::{CompletionRequest, DynLlm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    OutdoorRecreation,
    Technology,
    Software,
    Finance,
    HealthFitness,
    BeautyFashion,
    HomeGarden,
    Travel,
    Education,
    FoodBeverage,
    Pets,
    Gaming,
    Business,
    ParentingFamily,
    Automotive,
    General,
}

impl Category {
    pub const ALL: [Category; 16] = [
        Category::OutdoorRecreation,
        Category::Technology,
        Category::Software,
        Category::Finance,
        Category::HealthFitness,
        Category::BeautyFashion,
        Category::HomeGarden,
        Category::Travel,
        Category::Education,
        Category::FoodBeverage,
        Category::Pets,
        Category::Gaming,
        Category::Business,
        Category::ParentingFamily,
        Category::Automotive,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::OutdoorRecreation => "outdoor_recreation",
            Category::Technology => "technology",
            Category::Software => "software",
            Category::Finance => "finance",
            Category::HealthFitness => "health_fitness",
            Category::BeautyFashion => "beauty_fashion",
            Category::HomeGarden => "home_garden",
            Category::Travel => "travel",
            Category::Education => "education",
            Category::FoodBeverage => "food_beverage",
            Category::Pets => "pets",
            Category::Gaming => "gaming",
            Category::Business => "business",
            Category::ParentingFamily => "parenting_family",
            Category::Automotive => "automotive",
            Category::General => "general",
        }
    }

    /// Human label used in prompts, e.g. "outdoor recreation".
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }

    /// Lenient parse: accepts `outdoor_recreation`, `Outdoor Recreation`,
    /// `"outdoor-recreation."` and similar.
    pub fn parse(s: &str) -> Option<Category> {
        let cleaned: String = s
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        Category::ALL.into_iter().find(|c| c.as_str() == cleaned)
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Category::OutdoorRecreation => &[
                "camping", "camp", "hiking", "hike", "outdoor", "outdoors", "tent", "backpacking",
                "fishing", "hunting", "kayak", "kayaking", "climbing", "trail", "cycling", "bike",
                "ski", "skiing", "surfing", "survival", "rv",
            ],
            Category::Technology => &[
                "tech", "technology", "gadget", "gadgets", "computer", "computing", "laptop",
                "smartphone", "phone", "electronics", "hardware", "drone", "camera", "vpn",
                "smart home", "quantum",
            ],
            Category::Software => &[
                "software", "saas", "app", "apps", "hosting", "web hosting", "crm", "plugin",
                "wordpress", "developer", "api", "cloud", "email marketing", "automation",
            ],
            Category::Finance => &[
                "finance", "financial", "investing", "investment", "stock", "stocks", "crypto",
                "bitcoin", "credit card", "banking", "bank", "loan", "loans", "insurance",
                "budget", "budgeting", "trading", "retirement", "tax",
            ],
            Category::HealthFitness => &[
                "fitness", "health", "workout", "gym", "yoga", "supplement", "supplements",
                "nutrition", "diet", "weight loss", "running", "wellness", "meditation",
                "keto", "protein",
            ],
            Category::BeautyFashion => &[
                "beauty", "skincare", "makeup", "cosmetics", "fashion", "clothing", "apparel",
                "jewelry", "hair", "fragrance", "shoes", "style",
            ],
            Category::HomeGarden => &[
                "home", "garden", "gardening", "furniture", "decor", "kitchen", "diy",
                "home improvement", "tools", "mattress", "bedding", "cleaning", "plants",
            ],
            Category::Travel => &[
                "travel", "hotel", "hotels", "flight", "flights", "vacation", "cruise",
                "luggage", "tourism", "booking", "airbnb", "trip",
            ],
            Category::Education => &[
                "course", "courses", "education", "learning", "online learning", "tutoring",
                "language", "certification", "bootcamp", "school", "university", "study",
                "ebook", "books",
            ],
            Category::FoodBeverage => &[
                "food", "recipe", "recipes", "cooking", "coffee", "tea", "wine", "beer",
                "meal kit", "meal", "snacks", "vegan", "baking", "grocery",
            ],
            Category::Pets => &[
                "pet", "pets", "dog", "dogs", "cat", "cats", "puppy", "aquarium", "pet food",
                "veterinary",
            ],
            Category::Gaming => &[
                "gaming", "game", "games", "esports", "console", "playstation", "xbox",
                "nintendo", "pc gaming", "streaming gear",
            ],
            Category::Business => &[
                "business", "marketing", "ecommerce", "e commerce", "startup", "entrepreneur",
                "freelance", "productivity", "seo", "affiliate marketing", "dropshipping",
                "small business",
            ],
            Category::ParentingFamily => &[
                "baby", "babies", "parenting", "kids", "toddler", "family", "maternity",
                "toys", "nursery",
            ],
            Category::Automotive => &[
                "car", "cars", "auto", "automotive", "vehicle", "truck", "motorcycle", "tires",
                "ev", "electric vehicle",
            ],
            Category::General => &[],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic keyword fallback. Categories are checked in declaration order;
/// the first with a matching keyword wins. Single words also match simple
/// plurals ("tent" ↔ "tents").
pub fn classify_by_keywords(topic: &str) -> Category {
    let normalized = crate::networks::normalize(topic);
    if normalized.is_empty() {
        return Category::General;
    }
    let tokens: Vec<&str> = normalized.split(' ').collect();
    let padded = format!(" {normalized} ");

    for cat in Category::ALL {
        let hit = cat.keywords().iter().any(|kw| {
            if kw.contains(' ') {
                padded.contains(&format!(" {kw} "))
            } else {
                tokens.iter().any(|t| {
                    *t == *kw
                        || t.strip_suffix('s') == Some(kw)
                        || t.strip_suffix("es") == Some(kw)
                })
            }
        });
        if hit {
            return cat;
        }
    }
    Category::General
}

/// LLM-first classifier with keyword fallback.
#[derive(Clone)]
pub struct CategoryClassifier {
    llm: DynLlm,
}

impl CategoryClassifier {
    pub fn new(llm: DynLlm) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, topic: &str) -> Category {
        let labels = Category::ALL
            .iter()
            .map(Category::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Classify this topic into exactly one category.\n\
             Topic: {topic}\n\
             Allowed categories: {labels}\n\
             Answer with the category label only."
        );
        let req = CompletionRequest::new(prompt)
            .system("You are a precise topic classifier. Reply with a single label.")
            .max_tokens(20)
            .temperature(0.0);

        match self.llm.complete(&req).await {
            Ok(c) => {
                let first_line = c.content.lines().next().unwrap_or_default();
                match Category::parse(first_line) {
                    Some(cat) => return cat,
                    None => debug!(
                        target: "research",
                        provider = self.llm.provider_name(),
                        "classifier label outside the fixed set, using keywords"
                    ),
                }
            }
            Err(e) => debug!(
                target: "research",
                error = %e,
                "classifier LLM unavailable, using keywords"
            ),
        }
        classify_by_keywords(topic)
    }
}
