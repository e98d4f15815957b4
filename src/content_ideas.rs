//! Blog and software content ideas for a topic.
//!
//! One LLM completion per requested content type. If the model is unavailable
//! or its answer cannot be parsed, template ideas built from the topic,
//! subtopics and keywords are used instead. Every idea records its origin.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ResearchError;
use crate::llm::{extract_json_array, CompletionRequest, DynLlm};
use crate::store::DynStore;

const IDEAS_PER_TYPE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    BlogPost,
    Software,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::BlogPost => "blog_post",
            ContentType::Software => "software",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaOrigin {
    Llm,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIdea {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub topic_title: String,
    pub content_type: ContentType,
    pub title: String,
    pub description: String,
    pub target_keywords: Vec<String>,
    pub outline: Vec<String>,
    pub origin: IdeaOrigin,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateIdeasRequest {
    pub topic_id: String,
    pub topic_title: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub user_id: String,
    #[serde(default)]
    pub content_types: Option<Vec<ContentType>>,
}

#[derive(Debug, Deserialize)]
struct IdeaDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    target_keywords: Vec<String>,
    #[serde(default)]
    outline: Vec<Value>,
}

pub struct ContentIdeaGenerator {
    llm: DynLlm,
    store: DynStore,
}

fn clean(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ContentIdeaGenerator {
    pub fn new(llm: DynLlm, store: DynStore) -> Self {
        Self { llm, store }
    }

    pub async fn generate(&self, req: GenerateIdeasRequest) -> Result<Vec<ContentIdea>, ResearchError> {
        let title = req.topic_title.trim();
        if title.is_empty() {
            return Err(ResearchError::invalid("topic_title must not be empty"));
        }
        let user_id = req.user_id.trim();
        if user_id.is_empty() {
            return Err(ResearchError::invalid("user_id must not be empty"));
        }
        let subtopics = clean(&req.subtopics);
        let keywords = clean(&req.keywords);
        let mut seen = HashSet::new();
        let types: Vec<ContentType> = req
            .content_types
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| vec![ContentType::BlogPost, ContentType::Software])
            .into_iter()
            .filter(|t| seen.insert(*t))
            .collect();

        let mut ideas = Vec::new();
        for ct in types {
            let drafts = match self.ask_llm(ct, title, &subtopics, &keywords).await {
                Some(d) => d.into_iter().map(|d| (d, IdeaOrigin::Llm)).collect::<Vec<_>>(),
                None => template_ideas(ct, title, &subtopics, &keywords)
                    .into_iter()
                    .map(|d| (d, IdeaOrigin::Template))
                    .collect(),
            };
            let now = Utc::now();
            ideas.extend(drafts.into_iter().map(|(d, origin)| ContentIdea {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                topic_id: req.topic_id.trim().to_string(),
                topic_title: title.to_string(),
                content_type: ct,
                title: d.title,
                description: d.description,
                target_keywords: d.target_keywords,
                outline: d.outline,
                origin,
                created_at: now,
            }));
        }

        self.store.insert_content_ideas(&ideas).await?;
        info!(target: "research", ideas = ideas.len(), "content ideas generated");
        Ok(ideas)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<ContentIdea>, ResearchError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ResearchError::invalid("user_id must not be empty"));
        }
        Ok(self.store.list_content_ideas(user_id).await?)
    }

    async fn ask_llm(
        &self,
        ct: ContentType,
        title: &str,
        subtopics: &[String],
        keywords: &[String],
    ) -> Option<Vec<Draft>> {
        let kind = match ct {
            ContentType::BlogPost => "blog post ideas",
            ContentType::Software => "small software tool or app ideas",
        };
        let prompt = format!(
            "Suggest {IDEAS_PER_TYPE} {kind} for the topic \"{title}\".\n\
             Subtopics: {}\nKeywords: {}\n\
             Return a JSON array of objects with \"title\", \"description\", \
             \"target_keywords\" (array of strings) and \"outline\" (array of strings).",
            if subtopics.is_empty() { "-".to_string() } else { subtopics.join(", ") },
            if keywords.is_empty() { "-".to_string() } else { keywords.join(", ") },
        );
        let req = CompletionRequest::new(prompt)
            .system("You are a content strategist for affiliate marketers. Reply with JSON only.")
            .max_tokens(1500)
            .temperature(0.7);

        let completion = match self.llm.complete(&req).await {
            Ok(c) => c,
            Err(e) => {
                debug!(target: "llm", error = %e, content_type = ct.as_str(), "using template ideas");
                return None;
            }
        };
        let drafts: Vec<Draft> = extract_json_array(&completion.content)?
            .into_iter()
            .filter_map(|v| serde_json::from_value::<IdeaDraft>(v).ok())
            .filter(|d| !d.title.trim().is_empty())
            .map(Draft::from)
            .take(IDEAS_PER_TYPE * 2)
            .collect();
        if drafts.is_empty() {
            debug!(target: "llm", content_type = ct.as_str(), "unusable idea JSON, using template ideas");
            return None;
        }
        Some(drafts)
    }
}

#[derive(Debug, Clone)]
struct Draft {
    title: String,
    description: String,
    target_keywords: Vec<String>,
    outline: Vec<String>,
}

impl From<IdeaDraft> for Draft {
    fn from(d: IdeaDraft) -> Self {
        Self {
            title: d.title.trim().to_string(),
            description: d.description.trim().to_string(),
            target_keywords: clean(&d.target_keywords),
            outline: d
                .outline
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Object(m) => m
                        .get("title")
                        .or_else(|| m.get("heading"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

fn template_ideas(ct: ContentType, title: &str, subtopics: &[String], keywords: &[String]) -> Vec<Draft> {
    let mut kw: Vec<String> = vec![title.to_lowercase()];
    kw.extend(keywords.iter().take(4).cloned());
    let focus: Vec<&str> = if subtopics.is_empty() {
        vec![title]
    } else {
        subtopics.iter().map(String::as_str).collect()
    };

    match ct {
        ContentType::BlogPost => vec![
            Draft {
                title: format!("The Complete Guide to {title}"),
                description: format!("A beginner-friendly overview of {title} with product recommendations."),
                target_keywords: kw.clone(),
                outline: std::iter::once("Introduction".to_string())
                    .chain(focus.iter().map(|s| s.to_string()))
                    .chain(std::iter::once("Recommended products".to_string()))
                    .collect(),
            },
            Draft {
                title: format!("{} Mistakes to Avoid with {title}", focus.len().max(5)),
                description: format!("Common pitfalls people run into with {title} and how to fix them."),
                target_keywords: kw.clone(),
                outline: vec![
                    "Why these mistakes happen".to_string(),
                    "The mistakes".to_string(),
                    "What to use instead".to_string(),
                ],
            },
            Draft {
                title: format!("Best {title} Picks This Year: Tested and Compared"),
                description: format!("A comparison of the top {title} options with pros and cons."),
                target_keywords: kw,
                outline: vec![
                    "How we compared".to_string(),
                    "Top picks".to_string(),
                    "Buying guide".to_string(),
                    "FAQ".to_string(),
                ],
            },
        ],
        ContentType::Software => vec![
            Draft {
                title: format!("{title} Planner"),
                description: format!("A simple web app that helps users plan and track their {title} goals."),
                target_keywords: kw.clone(),
                outline: vec![
                    "Goal setup".to_string(),
                    "Progress tracking".to_string(),
                    "Product suggestions".to_string(),
                ],
            },
            Draft {
                title: format!("{title} Cost Calculator"),
                description: format!("Estimate what getting started with {title} costs, with affiliate links to the gear."),
                target_keywords: kw.clone(),
                outline: vec![
                    "Inputs".to_string(),
                    "Cost breakdown".to_string(),
                    "Recommended products".to_string(),
                ],
            },
            Draft {
                title: format!("{title} Comparison Tool"),
                description: format!("Side-by-side comparison of {title} products and programs."),
                target_keywords: kw,
                outline: focus.iter().map(|s| format!("Compare: {s}")).collect(),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DisabledClient, ScriptedLlm};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn req(types: Option<Vec<ContentType>>) -> GenerateIdeasRequest {
        GenerateIdeasRequest {
            topic_id: "t1".into(),
            topic_title: "Home Espresso".into(),
            subtopics: vec!["Grinders".into(), " ".into()],
            keywords: vec!["espresso machine".into()],
            user_id: "u1".into(),
            content_types: types,
        }
    }

    #[tokio::test]
    async fn falls_back_to_templates_and_persists() {
        let store: DynStore = Arc::new(MemoryStore::new());
        let gen = ContentIdeaGenerator::new(Arc::new(DisabledClient), store.clone());
        let ideas = gen.generate(req(None)).await.unwrap();
        assert_eq!(ideas.len(), 2 * IDEAS_PER_TYPE);
        assert!(ideas.iter().all(|i| i.origin == IdeaOrigin::Template));
        assert_eq!(ideas[0].title, "The Complete Guide to Home Espresso");
        assert_eq!(ideas[0].outline, vec!["Introduction", "Grinders", "Recommended products"]);
        assert_eq!(gen.list("u1").await.unwrap().len(), 6);
        assert!(gen.list("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uses_llm_json_when_available() {
        let reply = r#"[{"title":"Dialing In Your First Shot","description":"Step by step",
            "target_keywords":["espresso"],"outline":["Dose",{"title":"Grind"}]}]"#;
        let store: DynStore = Arc::new(MemoryStore::new());
        let gen = ContentIdeaGenerator::new(
            Arc::new(ScriptedLlm::empty().on("blog post ideas", reply)),
            store,
        );
        let ideas = gen
            .generate(req(Some(vec![ContentType::BlogPost, ContentType::Software])))
            .await
            .unwrap();
        let blog: Vec<_> = ideas.iter().filter(|i| i.content_type == ContentType::BlogPost).collect();
        assert_eq!(blog.len(), 1);
        assert_eq!(blog[0].origin, IdeaOrigin::Llm);
        assert_eq!(blog[0].outline, vec!["Dose", "Grind"]);
        // no rule for software prompts → templates
        assert!(ideas
            .iter()
            .filter(|i| i.content_type == ContentType::Software)
            .all(|i| i.origin == IdeaOrigin::Template));
    }

    #[tokio::test]
    async fn repeated_content_types_are_generated_once() {
        let store: DynStore = Arc::new(MemoryStore::new());
        let llm = Arc::new(ScriptedLlm::empty());
        let gen = ContentIdeaGenerator::new(llm.clone(), store);
        let ideas = gen
            .generate(req(Some(vec![
                ContentType::BlogPost,
                ContentType::Software,
                ContentType::BlogPost,
            ])))
            .await
            .unwrap();
        assert_eq!(llm.calls(), 2);
        assert_eq!(ideas.len(), 2 * IDEAS_PER_TYPE);
        assert_eq!(gen.list("u1").await.unwrap().len(), 2 * IDEAS_PER_TYPE);
    }

    #[tokio::test]
    async fn rejects_missing_title_or_user() {
        let store: DynStore = Arc::new(MemoryStore::new());
        let gen = ContentIdeaGenerator::new(Arc::new(DisabledClient), store);
        let mut r = req(None);
        r.topic_title = "  ".into();
        assert!(gen.generate(r).await.is_err());
        let mut r = req(None);
        r.user_id = String::new();
        assert!(gen.generate(r).await.is_err());
    }
}
