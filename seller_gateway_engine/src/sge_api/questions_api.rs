//! The questions view: unanswered questions enriched with listing and buyer data,
//! served through the per-user cache.

use std::sync::Arc;

use log::*;
use meli_tools::data_objects::{ItemSummary, MeliUser, Question, QuestionFilters, QuestionStatus};
use serde::Serialize;

use crate::{
    cache::QuestionCache,
    db_types::User,
    sge_api::errors::QuestionsApiError,
    traits::MarketplaceOps,
};

/// The attribute projection requested for each question's listing.
const ITEM_ATTRS: [&str; 8] =
    ["id", "title", "price", "available_quantity", "permalink", "secure_thumbnail", "status", "shipping"];

#[derive(Debug, Clone, Serialize)]
pub struct QuestionDetail {
    pub question: Question,
    pub item: ItemSummary,
    pub buyer: MeliUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionsOverview {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<QuestionDetail>,
}

pub struct QuestionsApi {
    cache: Arc<QuestionCache>,
}

impl QuestionsApi {
    pub fn new(cache: Arc<QuestionCache>) -> Self {
        Self { cache }
    }

    /// Fetch the user's unanswered questions, enriched with the listing projection and
    /// the asker's profile. Cached per user; `questions` notifications invalidate the
    /// entry.
    pub async fn unanswered_questions<M: MarketplaceOps>(
        &self,
        api: &M,
        user: &User,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<QuestionsOverview, QuestionsApiError> {
        if offset.unwrap_or(0) == 0 {
            if let Some(cached) = self.cache.get(user.id) {
                return Ok(cached);
            }
        }
        let filters = QuestionFilters {
            status: Some(QuestionStatus::Unanswered),
            limit,
            offset,
            ..QuestionFilters::default()
        };
        let page = api.fetch_questions(&filters).await?.into_result().map_err(QuestionsApiError::Remote)?;

        let mut results = Vec::with_capacity(page.questions.len());
        for question in page.questions {
            let item = api
                .fetch_item(&question.item_id, &ITEM_ATTRS)
                .await?
                .into_result()
                .map_err(QuestionsApiError::Remote)?;
            let buyer = api
                .fetch_user(question.from.id)
                .await?
                .into_result()
                .map_err(QuestionsApiError::Remote)?;
            results.push(QuestionDetail { question, item, buyer });
        }
        let overview = QuestionsOverview {
            total: page.total,
            limit: page.limit,
            offset: offset.unwrap_or(0) as i64,
            results,
        };
        if overview.offset == 0 {
            self.cache.put(user.id, overview.clone());
        }
        debug!("❓️ Assembled {} unanswered questions for user {}", overview.results.len(), user.id);
        Ok(overview)
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use meli_tools::{
        data_objects::{QuestionFrom, QuestionsPage},
        MeliResult,
    };
    use sgw_common::UserId;

    use super::*;
    use crate::{
        db_types::{AutoMessage, Credential},
        test_utils::mocks::MockMarketplace,
    };

    fn test_user() -> User {
        User {
            id: UserId(1),
            email: "ana@example.com".to_string(),
            credential: Credential::default(),
            auto_message: AutoMessage::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn one_question_page() -> QuestionsPage {
        QuestionsPage {
            total: 1,
            limit: 25,
            questions: vec![Question {
                id: 5036111111,
                text: "Tiene stock?".to_string(),
                status: "UNANSWERED".to_string(),
                item_id: "MLA1".to_string(),
                date_created: None,
                from: QuestionFrom { id: 77 },
                answer: None,
            }],
        }
    }

    #[tokio::test]
    async fn questions_are_enriched_with_item_and_buyer() {
        let mut api = MockMarketplace::new();
        api.expect_fetch_questions().times(1).returning(|_| Ok(MeliResult::Success(one_question_page())));
        api.expect_fetch_item().withf(|id, _| id == "MLA1").times(1).returning(|id, _| {
            Ok(MeliResult::Success(ItemSummary {
                id: id.to_string(),
                title: Some("Libro usado".to_string()),
                price: Some(100.0),
                available_quantity: Some(3),
                permalink: None,
                secure_thumbnail: None,
                status: Some("active".to_string()),
                attributes: None,
                shipping: None,
            }))
        });
        api.expect_fetch_user().withf(|id| *id == 77).times(1).returning(|id| {
            Ok(MeliResult::Success(MeliUser { id, nickname: Some("COMPRADOR1".into()), first_name: None, address: None }))
        });

        let cache = Arc::new(QuestionCache::default());
        let questions = QuestionsApi::new(Arc::clone(&cache));
        let user = test_user();
        let overview = questions.unanswered_questions(&api, &user, None, None).await.unwrap();
        assert_eq!(overview.total, 1);
        assert_eq!(overview.results[0].item.title.as_deref(), Some("Libro usado"));
        assert_eq!(overview.results[0].buyer.nickname.as_deref(), Some("COMPRADOR1"));

        // Second read is served from the cache: the mock allows only one fetch of each.
        let cached = questions.unanswered_questions(&api, &user, None, None).await.unwrap();
        assert_eq!(cached.total, 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_refetch() {
        let mut api = MockMarketplace::new();
        api.expect_fetch_questions().times(2).returning(|_| {
            Ok(MeliResult::Success(QuestionsPage { total: 0, limit: 25, questions: vec![] }))
        });

        let cache = Arc::new(QuestionCache::default());
        let questions = QuestionsApi::new(Arc::clone(&cache));
        let user = test_user();
        questions.unanswered_questions(&api, &user, None, None).await.unwrap();
        cache.invalidate(user.id);
        questions.unanswered_questions(&api, &user, None, None).await.unwrap();
    }
}
