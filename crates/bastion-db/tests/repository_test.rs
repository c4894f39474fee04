//! Repository tests against a migrated Postgres.
//!
//! Run with `DATABASE_URL=... cargo test -p bastion-db -- --ignored`.

use bastion_db::test_fixtures::{connect, TestTenant};
use bastion_db::{
    compute_content_hash, BriefStatus, CreateBriefRequest, CreatePracticeRequest,
    CreateTemplateRequest, Error, ListBriefsQuery, MessageRole, NewBriefSection, NewStoredFile,
    PromptKey, SectionTemplateInput,
};
use bastion_db::Database;
use uuid::Uuid;

/// Connect after loading `DATABASE_URL` from a local `.env`, if present.
async fn test_db() -> Database {
    dotenvy::dotenv().ok();
    connect().await
}

fn sections(titles: &[&str]) -> Vec<SectionTemplateInput> {
    titles
        .iter()
        .map(|t| SectionTemplateInput {
            title: t.to_string(),
            instructions: Some(format!("Write the {}", t.to_lowercase())),
        })
        .collect()
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_cross_tenant_lookups_return_none() {
    let db = test_db().await;
    let a = TestTenant::create(&db).await;
    let b = TestTenant::create(&db).await;

    assert!(db.clients.get(a.organisation_id, a.client_id).await.unwrap().is_some());
    assert!(db.clients.get(b.organisation_id, a.client_id).await.unwrap().is_none());
    assert!(!db.clients.delete(b.organisation_id, a.client_id).await.unwrap());
    assert!(db.profiles.get(b.organisation_id, a.admin_id).await.unwrap().is_none());

    a.cleanup(&db).await;
    b.cleanup(&db).await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_replace_template_sections_is_ordered_and_complete() {
    let db = test_db().await;
    let t = TestTenant::create(&db).await;

    let practice = db
        .practices
        .create(
            t.organisation_id,
            &CreatePracticeRequest {
                name: "Creative".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let created = db
        .templates
        .create(
            t.organisation_id,
            practice.id,
            &CreateTemplateRequest {
                name: "Campaign brief".to_string(),
                description: None,
                sections: sections(&["Objective", "Audience"]),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.sections.len(), 2);

    let replaced = db
        .templates
        .replace_sections(
            t.organisation_id,
            created.template.id,
            &sections(&["Insight", "Proposition", "Mandatories"]),
        )
        .await
        .unwrap();
    assert_eq!(replaced.len(), 3);

    let stored = db
        .templates
        .sections(t.organisation_id, created.template.id)
        .await
        .unwrap();
    let titles: Vec<_> = stored.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["Insight", "Proposition", "Mandatories"]);
    assert_eq!(stored.iter().map(|s| s.position).collect::<Vec<_>>(), [0, 1, 2]);

    t.cleanup(&db).await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_brief_section_replacement_marks_expanded() {
    let db = test_db().await;
    let t = TestTenant::create(&db).await;

    let brief = db
        .briefs
        .create(
            t.organisation_id,
            t.admin_id,
            &CreateBriefRequest {
                client_id: t.client_id,
                practice_id: None,
                template_id: None,
                title: "Summer launch".to_string(),
                input: "New flavour for the summer".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(brief.status, BriefStatus::Draft);

    db.briefs
        .replace_sections(
            t.organisation_id,
            brief.id,
            &[
                NewBriefSection {
                    section_template_id: None,
                    title: "Objective".to_string(),
                    content: "Drive trial".to_string(),
                },
                NewBriefSection {
                    section_template_id: None,
                    title: "Audience".to_string(),
                    content: String::new(),
                },
            ],
        )
        .await
        .unwrap();

    let detail = db
        .briefs
        .get_detail(t.organisation_id, brief.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.brief.status, BriefStatus::Expanded);
    assert_eq!(detail.sections.len(), 2);
    assert_eq!(detail.sections[0].title, "Objective");

    let expanded = db
        .briefs
        .list(
            t.organisation_id,
            &ListBriefsQuery {
                status: Some(BriefStatus::Expanded),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(expanded.len(), 1);

    t.cleanup(&db).await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_duplicate_source_is_conflict() {
    let db = test_db().await;
    let t = TestTenant::create(&db).await;
    let data = b"quarterly results";

    let file = |id: Uuid| NewStoredFile {
        id,
        organisation_id: t.organisation_id,
        parent_id: t.client_id,
        file_name: "results.txt".to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: data.len() as i64,
        storage_path: format!("sources/{}/{}/{}-results.txt", t.organisation_id, t.client_id, id),
        content_hash: compute_content_hash(data),
        uploaded_by: t.admin_id,
    };

    db.sources.insert(&file(Uuid::new_v4())).await.unwrap();
    let err = db.sources.insert(&file(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let found = db
        .sources
        .find_by_hash(t.organisation_id, t.client_id, &compute_content_hash(data))
        .await
        .unwrap();
    assert!(found.is_some());

    t.cleanup(&db).await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_conversations_are_private_to_their_user() {
    let db = test_db().await;
    let t = TestTenant::create(&db).await;

    let conversation = db
        .kb
        .create_conversation(t.organisation_id, t.client_id, t.admin_id, None)
        .await
        .unwrap();
    db.kb
        .insert_message(t.organisation_id, conversation.id, MessageRole::User, "What is the tone?")
        .await
        .unwrap();

    assert!(db.kb.auto_title(conversation.id, "What is the tone?").await.unwrap());
    // Only the placeholder is replaced
    assert!(!db.kb.auto_title(conversation.id, "Something else").await.unwrap());

    let other_user = Uuid::new_v4();
    assert!(db
        .kb
        .get_conversation(t.organisation_id, other_user, conversation.id)
        .await
        .unwrap()
        .is_none());

    let recent = db
        .kb
        .recent_messages(t.organisation_id, conversation.id, 10)
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].role, MessageRole::User);

    t.cleanup(&db).await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_prompt_override_upsert_and_revert() {
    let db = test_db().await;
    let t = TestTenant::create(&db).await;

    db.prompts
        .upsert(t.organisation_id, PromptKey::KbChat, "First")
        .await
        .unwrap();
    db.prompts
        .upsert(t.organisation_id, PromptKey::KbChat, "Second")
        .await
        .unwrap();

    let effective = db
        .prompts
        .effective(t.organisation_id, PromptKey::KbChat, "Default")
        .await
        .unwrap();
    assert_eq!(effective.content, "Second");
    assert!(!effective.is_default);

    assert!(db.prompts.delete(t.organisation_id, PromptKey::KbChat).await.unwrap());
    let effective = db
        .prompts
        .effective(t.organisation_id, PromptKey::KbChat, "Default")
        .await
        .unwrap();
    assert!(effective.is_default);

    t.cleanup(&db).await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_storage_paths_cover_sources_and_brief_files() {
    let db = test_db().await;
    let t = TestTenant::create(&db).await;
    let other = TestTenant::create(&db).await;

    let stored = |id: Uuid, parent_id: Uuid, path: &str| NewStoredFile {
        id,
        organisation_id: t.organisation_id,
        parent_id,
        file_name: "notes.txt".to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: 5,
        storage_path: path.to_string(),
        content_hash: compute_content_hash(path.as_bytes()),
        uploaded_by: t.admin_id,
    };

    db.sources
        .insert(&stored(Uuid::new_v4(), t.client_id, "sources/a.txt"))
        .await
        .unwrap();
    let brief = db
        .briefs
        .create(
            t.organisation_id,
            t.admin_id,
            &CreateBriefRequest {
                client_id: t.client_id,
                practice_id: None,
                template_id: None,
                title: "Autumn".to_string(),
                input: String::new(),
            },
        )
        .await
        .unwrap();
    db.briefs
        .insert_file(&stored(Uuid::new_v4(), brief.id, "briefs/b.txt"))
        .await
        .unwrap();

    let mut paths = db.organisations.storage_paths(t.organisation_id).await.unwrap();
    paths.sort();
    assert_eq!(paths, ["briefs/b.txt", "sources/a.txt"]);
    assert!(db
        .organisations
        .storage_paths(other.organisation_id)
        .await
        .unwrap()
        .is_empty());

    t.cleanup(&db).await;
    other.cleanup(&db).await;
}
