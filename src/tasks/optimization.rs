//! Survey answer report on the awesomedb database.
//!
//! `opportunities` documents embed contacts, their questions and the answers
//! to each question, several levels deep. The report unwinds down to single
//! loop instances, so the pipeline narrows each level with `$project` and
//! `$filter` before unwinding it. The first `$match` is the only stage that
//! can use the compound index; the `$lookup` sub-pipeline uses the index on
//! `clientCriteria`.

use super::{asc, SuiteKind, TaskInfo, TaskSuite};
use crate::db::{AggregateOptions, DocumentDatabase, IndexSpec, Record};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use std::sync::Arc;
use tracing::debug;

/// Initiative the report is scoped to.
const INITIATIVE_ID: &str = "58af4da0b310d92314627290";

/// Question categories the report covers.
const CATEGORIES: [i32; 2] = [105, 147];

/// Vendor the report is about, matched by name or by criteria value.
const VENDOR_NAME: &str = "ADP";
const VENDOR_VALUE: i32 = 50;

/// Answers at or above this value are "not applicable" codes.
const ANSWER_CEILING: i32 = 9000;

pub const TASKS: &[TaskInfo] = &[TaskInfo::new(
    "task_3_1",
    "Answers about the selected vendor, grouped by answer value",
    &["_id", "answer_value", "answer_text", "answers", "count"],
)
.sorted(&[
    asc("answer_text"),
    asc("answers.question_id"),
    asc("answers.answer_value"),
    asc("answers.c"),
    asc("answers.ins"),
])];

/// The awesomedb suite bound to a database handle.
pub struct OptimizationSuite {
    db: Arc<dyn DocumentDatabase>,
}

impl OptimizationSuite {
    pub fn new(db: Arc<dyn DocumentDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskSuite for OptimizationSuite {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Optimization
    }

    async fn before(&self) -> Result<()> {
        before(self.db.as_ref()).await
    }

    async fn run(&self, task: &str) -> Result<Vec<Record>> {
        match task {
            "task_3_1" => task_3_1(self.db.as_ref()).await,
            other => Err(TaskError::internal(format!(
                "unknown task '{other}' in suite 'optimization'"
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}

/// Creates the sparse compound indexes behind the initial `$match` and the
/// criteria lookup.
pub async fn before(db: &dyn DocumentDatabase) -> Result<()> {
    db.create_index(
        "opportunities",
        IndexSpec::sparse(doc! {
            "initiativeId": 1,
            "contacts.questions.category_id": 1,
            "contacts.datePublished": 1,
        }),
    )
    .await?;

    db.create_index(
        "clientCriteria",
        IndexSpec::sparse(doc! { "value": 1, "versions.initiativeId": 1 }),
    )
    .await?;

    debug!("Ensured opportunity and criteria indexes");
    Ok(())
}

fn initiative() -> Result<ObjectId> {
    ObjectId::parse_str(INITIATIVE_ID)
        .map_err(|e| TaskError::internal(format!("bad initiative id {INITIATIVE_ID}: {e}")))
}

/// A shortlisted vendor entry that was selected for the vendor.
fn selected_vendor() -> Document {
    doc! {
        "$elemMatch": {
            "$or": [
                { "name": VENDOR_NAME, "is_selected": true },
                { "value": VENDOR_VALUE, "is_selected": true },
            ]
        }
    }
}

/// `{ $filter }` over `input`, binding each element to `alias`.
fn filtered(input: &str, alias: &str, cond: Document) -> Document {
    doc! { "$filter": { "input": input, "as": alias, "cond": cond } }
}

pub async fn task_3_1(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    let initiative = initiative()?;
    let categories: Vec<Bson> = CATEGORIES.iter().map(|c| Bson::Int32(*c)).collect();

    let pipeline = vec![
        doc! {
            "$match": {
                "initiativeId": initiative,
                "contacts.questions.category_id": { "$in": categories.clone() },
                "contacts.datePublished": { "$ne": "null" },
                "contacts.shortListedVendors": selected_vendor(),
            }
        },
        doc! {
            "$project": {
                "contacts.id": 1,
                "contacts.datePublished": 1,
                "contacts.win_vendor": 1,
                "contacts.shortListedVendors.name": 1,
                "contacts.shortListedVendors.is_selected": 1,
                "contacts.shortListedVendors.value": 1,
                "contacts.questions.criteria_value": 1,
                "contacts.questions.label": 1,
                "contacts.questions.raw_text": 1,
                "contacts.questions.id": 1,
                "contacts.questions.category_id": 1,
                "contacts.questions.answers": 1,
            }
        },
        doc! {
            "$project": {
                "contacts": filtered(
                    "$contacts",
                    "contact",
                    doc! { "$ne": ["$$contact.datePublished", Bson::Null] },
                )
            }
        },
        doc! { "$unwind": "$contacts" },
        doc! { "$match": { "contacts.shortListedVendors": selected_vendor() } },
        doc! {
            "$project": {
                "contacts.id": 1,
                "contacts.win_vendor": 1,
                "contacts.questions": filtered(
                    "$contacts.questions",
                    "question",
                    doc! { "$in": ["$$question.category_id", categories] },
                ),
            }
        },
        doc! { "$unwind": "$contacts.questions" },
        doc! {
            "$match": {
                "$nor": [{
                    "contacts.questions.category_id": CATEGORIES[0],
                    "contacts.questions.answers": {
                        "$elemMatch": {
                            "primary_answer_value": { "$gte": ANSWER_CEILING },
                            "loopInstances": {
                                "$elemMatch": {
                                    "is_selected": true,
                                    "$or": [
                                        { "loop_instance": VENDOR_VALUE },
                                        { "loop_text": VENDOR_NAME },
                                    ]
                                }
                            }
                        }
                    }
                }]
            }
        },
        doc! {
            "$project": {
                "contacts.id": 1,
                "contacts.win_vendor": 1,
                "contacts.questions.criteria_value": 1,
                "contacts.questions.label": 1,
                "contacts.questions.raw_text": 1,
                "contacts.questions.id": 1,
                "contacts.questions.category_id": 1,
                "contacts.questions.answers": filtered(
                    "$contacts.questions.answers",
                    "answer",
                    doc! { "$lt": ["$$answer.primary_answer_value", ANSWER_CEILING] },
                ),
            }
        },
        doc! { "$unwind": "$contacts.questions.answers" },
        doc! { "$unwind": "$contacts.questions.answers.loopInstances" },
        doc! {
            "$match": {
                "$or": [
                    { "contacts.questions.answers.loopInstances.loop_instance": VENDOR_VALUE },
                    { "contacts.questions.answers.loopInstances.loop_text": VENDOR_NAME },
                    {
                        "contacts.win_vendor.is_client": false,
                        "contacts.questions.category_id": CATEGORIES[1],
                        "$or": [
                            { "contacts.win_vendor.value": VENDOR_VALUE },
                            { "contacts.win_vendor.name": VENDOR_NAME },
                        ]
                    },
                ]
            }
        },
        doc! {
            "$project": {
                "contacts.id": 1,
                "criteria_value": {
                    "$ifNull": [
                        "$contacts.questions.criteria_value",
                        "$contacts.questions.answers.criteria_value",
                    ]
                },
                "contacts.questions.id": 1,
                "contacts.questions.answers": 1,
                "contacts.questions.category_id": 1,
            }
        },
        doc! {
            "$lookup": {
                "from": "clientCriteria",
                "as": "criteria",
                "let": { "criteria_value": "$criteria_value" },
                "pipeline": [
                    { "$match": { "$expr": { "$eq": ["$$criteria_value", "$value"] } } },
                    { "$match": { "versions.initiativeId": initiative } },
                    {
                        "$project": {
                            "_id": 0,
                            "label": 1,
                            "definition": 1,
                            "versions": filtered(
                                "$versions",
                                "version",
                                doc! { "$eq": ["$$version.initiativeId", initiative] },
                            ),
                        }
                    },
                    { "$match": { "versions": { "$not": { "$size": 0 } } } },
                    {
                        "$project": {
                            "_id": 0,
                            "label": 1,
                            "definition": 1,
                            "versions.definition": 1,
                        }
                    },
                ]
            }
        },
        doc! { "$unwind": "$criteria" },
        doc! { "$unwind": "$criteria.versions" },
        doc! {
            "$group": {
                "_id": "$contacts.questions.answers.primary_answer_value",
                "answer_value": { "$first": "$contacts.questions.answers.primary_answer_value" },
                "answer_text": { "$first": "$contacts.questions.answers.primary_answer_text" },
                "answers": {
                    "$push": {
                        "c": "$contacts.id",
                        "question_category": "$contacts.questions.category_id",
                        "question_id": "$contacts.questions.id",
                        "ins": "$contacts.questions.answers.loopInstances.loop_instance",
                        "answer_value": "$contacts.questions.answers.primary_answer_value",
                        "selected": "$contacts.questions.answers.loopInstances.is_selected",
                        "value": "$criteria_value",
                        "text": "$criteria.label",
                        "definition": {
                            "$ifNull": ["$criteria.versions.definition", "$criteria.definition"]
                        },
                    }
                },
                "count": { "$sum": 1 },
            }
        },
        doc! { "$unwind": "$answers" },
        doc! {
            "$sort": {
                "answer_text": 1,
                "answers.question_id": 1,
                "answers.answer_value": 1,
                "answers.c": 1,
                "answers.ins": 1,
            }
        },
    ];

    db.aggregate(
        "opportunities",
        pipeline,
        AggregateOptions {
            allow_disk_use: true,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailingDatabase, MockDocumentDatabase, RecordedCall};
    use pretty_assertions::assert_eq;

    fn recorded_pipeline(db: &MockDocumentDatabase) -> Vec<Document> {
        match db.calls().into_iter().next() {
            Some(RecordedCall::Aggregate {
                collection,
                pipeline,
                options,
            }) => {
                assert_eq!(collection, "opportunities");
                assert!(options.allow_disk_use);
                pipeline
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    fn stage_names(pipeline: &[Document]) -> Vec<&str> {
        pipeline
            .iter()
            .filter_map(|stage| stage.keys().next().map(String::as_str))
            .collect()
    }

    #[tokio::test]
    async fn test_before_creates_sparse_compound_indexes() {
        let db = MockDocumentDatabase::new();
        before(&db).await.unwrap();

        let calls = db.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            RecordedCall::CreateIndex { collection, index } => {
                assert_eq!(collection, "opportunities");
                assert!(index.sparse);
                assert_eq!(
                    index.keys.keys().collect::<Vec<_>>(),
                    vec![
                        "initiativeId",
                        "contacts.questions.category_id",
                        "contacts.datePublished"
                    ]
                );
            }
            other => panic!("expected index, got {other:?}"),
        }
        assert_eq!(calls[1].collection(), "clientCriteria");
    }

    #[tokio::test]
    async fn test_pipeline_matches_on_indexed_fields_first() {
        let db = MockDocumentDatabase::new();
        task_3_1(&db).await.unwrap();
        let pipeline = recorded_pipeline(&db);

        let first = pipeline[0].get_document("$match").unwrap();
        assert_eq!(
            first.get_object_id("initiativeId").unwrap().to_hex(),
            INITIATIVE_ID
        );
        assert!(first.contains_key("contacts.questions.category_id"));
    }

    #[tokio::test]
    async fn test_pipeline_projects_before_each_unwind() {
        let db = MockDocumentDatabase::new();
        task_3_1(&db).await.unwrap();
        let pipeline = recorded_pipeline(&db);
        let stages = stage_names(&pipeline);

        assert_eq!(stages.first(), Some(&"$match"));
        assert_eq!(stages.last(), Some(&"$sort"));
        let first_unwind = stages.iter().position(|s| *s == "$unwind").unwrap();
        assert!(stages[..first_unwind].contains(&"$project"));
        assert!(stages.contains(&"$lookup"));
        assert_eq!(stages.iter().filter(|s| **s == "$group").count(), 1);
    }

    #[tokio::test]
    async fn test_output_order_matches_contract() {
        let db = MockDocumentDatabase::new();
        task_3_1(&db).await.unwrap();
        let pipeline = recorded_pipeline(&db);

        let sort = pipeline
            .last()
            .and_then(|stage| stage.get_document("$sort").ok())
            .unwrap();
        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        let declared: Vec<&str> = TASKS[0].sort.iter().map(|k| k.field).collect();
        assert_eq!(keys, declared);
    }

    #[tokio::test]
    async fn test_unwound_answers_sort_to_a_single_contact_instance() {
        let db = MockDocumentDatabase::new();
        task_3_1(&db).await.unwrap();
        let pipeline = recorded_pipeline(&db);

        // Answers sharing question and value still differ by contact and loop instance
        let sort = pipeline.last().unwrap().get_document("$sort").unwrap();
        assert!(sort.contains_key("answers.c"));
        assert!(sort.contains_key("answers.ins"));
    }

    #[tokio::test]
    async fn test_suite_dispatch() {
        let suite = OptimizationSuite::new(Arc::new(MockDocumentDatabase::new()));
        assert_eq!(suite.kind(), SuiteKind::Optimization);
        assert!(suite.run("task_3_1").await.unwrap().is_empty());
        assert!(matches!(
            suite.run("task_1_1").await.unwrap_err(),
            TaskError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn test_setup_failure_is_reported() {
        let err = before(&FailingDatabase::new()).await.unwrap_err();
        assert!(matches!(err, TaskError::Setup(_)));
    }
}
