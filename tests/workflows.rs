//! End-to-end workflows over the in-memory store: the full journey from
//! admin provisioning through enrollment, coursework, grading, and the
//! audit trail.

use std::sync::Arc;

use async_trait::async_trait;

use schooltable::collab::{self, AuthOutcome, IdentityProvider, LoggingMailer};
use schooltable::domain::{LogFilter, Role};
use schooltable::repository::assignment::{NewAssignment, NewSubmission};
use schooltable::repository::class::NewClass;
use schooltable::repository::subject::NewSubject;
use schooltable::repository::user::NewUser;
use schooltable::repository::{
    AssignmentRepository, AuditLog, ClassRepository, EnrollmentRepository,
    NotificationRepository, PostRepository, SubjectRepository, UserRepository,
};
use schooltable::search::SearchDispatcher;
use schooltable::storage::MemoryTableStore;
use schooltable::DomainError;

struct StubIdentity;

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn create_account(&self, _u: &str, _e: &str, _p: &str) -> collab::Result<()> {
        Ok(())
    }

    async fn authenticate(&self, _u: &str, _p: &str) -> collab::Result<AuthOutcome> {
        Ok(AuthOutcome::Tokens {
            id_token: "id".into(),
            access_token: "access".into(),
            refresh_token: None,
            expires_in: 3600,
        })
    }

    async fn email_for_token(&self, _t: &str) -> collab::Result<String> {
        Ok("se001@school.test".into())
    }

    async fn respond_to_challenge(
        &self,
        _u: &str,
        _s: &str,
        _p: &str,
    ) -> collab::Result<AuthOutcome> {
        Err(collab::CollabError::Identity("no challenge pending".into()))
    }
}

struct App {
    store: Arc<MemoryTableStore>,
    users: UserRepository,
    subjects: SubjectRepository,
    classes: ClassRepository,
    enrollments: EnrollmentRepository,
    posts: PostRepository,
    assignments: AssignmentRepository,
    notifications: Arc<NotificationRepository>,
    search: SearchDispatcher,
    audit: AuditLog,
}

fn app() -> App {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(MemoryTableStore::new());
    let notifications = Arc::new(NotificationRepository::new(
        store.clone(),
        Arc::new(LoggingMailer),
    ));
    App {
        users: UserRepository::new(store.clone(), Arc::new(StubIdentity)),
        subjects: SubjectRepository::new(store.clone()),
        classes: ClassRepository::new(store.clone(), notifications.clone(), None),
        enrollments: EnrollmentRepository::new(store.clone(), notifications.clone()),
        posts: PostRepository::new(store.clone()),
        assignments: AssignmentRepository::new(store.clone(), None),
        notifications,
        search: SearchDispatcher::new(store.clone()),
        audit: AuditLog::new(store.clone()),
        store,
    }
}

async fn provision(app: &App) -> String {
    app.users
        .create(NewUser {
            code_user: Some("GV01".into()),
            name: "Binh Le".into(),
            email: "gv01@school.test".into(),
            temporary_password: "Temp#1234".into(),
            role: Role::Lecturer,
            date_of_birth: None,
        })
        .await
        .unwrap();
    app.users
        .create(NewUser {
            code_user: Some("SE001".into()),
            name: "Dana Tran".into(),
            email: "se001@school.test".into(),
            temporary_password: "Temp#1234".into(),
            role: Role::Student,
            date_of_birth: Some("01-09-2003".into()),
        })
        .await
        .unwrap();
    app.subjects
        .create(NewSubject {
            code: "SE101".into(),
            name: "Databases".into(),
            credits: 3,
            department: Some("SE".into()),
            prerequisites: None,
            status: None,
        })
        .await
        .unwrap();
    let class = app
        .classes
        .create(NewClass {
            name: "Databases Fall".into(),
            subject_id: Some("SE101".into()),
            teacher_id: Some("GV01".into()),
            semester: Some("FA25".into()),
            academic_year: Some("2025".into()),
            room: None,
            password: None,
            status: None,
        })
        .await
        .unwrap();
    class.id
}

#[tokio::test]
async fn full_coursework_journey() {
    let app = app();
    let class_id = provision(&app).await;

    app.enrollments
        .enroll_self(&class_id, "SE001", None)
        .await
        .unwrap();

    // teacher publishes an assignment, student submits, teacher grades
    let assignment = app
        .assignments
        .create(
            &class_id,
            "GV01",
            NewAssignment {
                title: "Schema design".into(),
                content: Some("Model the library".into()),
                deadline: Some("2099-01-01T00:00:00Z".into()),
                max_score: Some(10.0),
                weight: 40.0,
                is_published: true,
                file_url: None,
            },
        )
        .await
        .unwrap();

    let visible = app
        .assignments
        .list_published(&class_id, "SE001")
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);

    let submission = app
        .assignments
        .submit(
            &class_id,
            &assignment.id,
            "SE001",
            NewSubmission {
                file_url: "s3://bucket/se001.pdf".into(),
                file_name: Some("se001.pdf".into()),
                file_type: Some("application/pdf".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(submission.timing.as_deref(), Some("on_time"));

    let graded = app
        .assignments
        .grade(&class_id, &assignment.id, "SE001", "GV01", 9.0, Some("solid"))
        .await
        .unwrap();
    assert_eq!(graded.score, Some(9.0));

    assert_eq!(
        app.assignments
            .student_rank(&class_id, "SE001")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn enrollment_gates_are_enforced_in_order() {
    let app = app();
    let class_id = provision(&app).await;

    // an unknown class is reported before any other check
    let err = app
        .enrollments
        .enroll_self("NOPE", "SE001", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    app.enrollments
        .enroll_self(&class_id, "SE001", None)
        .await
        .unwrap();
    let err = app
        .enrollments
        .enroll_self(&class_id, "SE001", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AlreadyEnrolled { .. }));

    // deactivated classes stop taking students
    app.classes.deactivate(&class_id).await.unwrap();
    let err = app
        .enrollments
        .enroll_self(&class_id, "SE002", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn feed_counters_track_activity() {
    let app = app();
    let class_id = provision(&app).await;
    app.enrollments
        .enroll_self(&class_id, "SE001", None)
        .await
        .unwrap();

    let post = app
        .posts
        .create_post(&class_id, "GV01", Some("Week 1"), "Read chapter 1")
        .await
        .unwrap();
    app.posts
        .create_comment(&post.id, "SE001", "done", None)
        .await
        .unwrap();
    app.posts.react(&post.id, "SE001").await.unwrap();

    let fresh = app.posts.get_post(&post.id).await.unwrap();
    assert_eq!(fresh.comment_count, 1);
    assert_eq!(fresh.like_count, 1);
}

#[tokio::test]
async fn class_notification_reaches_roster_and_inbox_merges_broadcasts() {
    let app = app();
    let class_id = provision(&app).await;
    app.enrollments
        .enroll_self(&class_id, "SE001", None)
        .await
        .unwrap();

    app.notifications
        .send_class_notification(&class_id, "GV01", "Exam moved", "Now on Friday")
        .await
        .unwrap();
    app.notifications
        .broadcast("Maintenance", "Sunday night", "SYSTEM_ALERT")
        .await
        .unwrap();

    // enrollment confirmation + class notification + system broadcast
    let inbox = app
        .notifications
        .list_for_user("SE001", None, None)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 3);

    let class_only = app
        .notifications
        .list_for_user("SE001", Some("class"), None)
        .await
        .unwrap();
    assert_eq!(class_only.len(), 1);
    assert_eq!(class_only[0].title.as_deref(), Some("Exam moved"));
}

#[tokio::test]
async fn admin_actions_leave_an_audit_trail() {
    let app = app();
    let class_id = provision(&app).await;
    app.enrollments
        .enroll_by_admin(&class_id, "SE001")
        .await
        .unwrap();

    let entries = app.audit.list(&LogFilter::default()).await.unwrap();
    let actions: Vec<_> = entries.iter().map(|e| e.action_type.as_str()).collect();
    assert!(actions.contains(&"CREATE_USER"));
    assert!(actions.contains(&"CREATE_SUBJECT"));
    assert!(actions.contains(&"ENROLL_STUDENT"));

    let scoped = app
        .audit
        .list(&LogFilter {
            class_id: Some(class_id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].action_type, "ENROLL_STUDENT");
}

#[tokio::test]
async fn search_spans_every_entity_kind() {
    let app = app();
    provision(&app).await;

    assert_eq!(app.search.search("subjects", "data").await.unwrap().len(), 1);
    assert_eq!(app.search.search("classes", "data").await.unwrap().len(), 1);
    assert_eq!(app.search.search("students", "dana").await.unwrap().len(), 1);
    assert_eq!(app.search.search("lecturers", "binh").await.unwrap().len(), 1);
    assert!(matches!(
        app.search.search("rooms", "x").await.unwrap_err(),
        DomainError::Validation(_)
    ));
}

#[tokio::test]
async fn store_is_shared_state_not_copies() {
    let app = app();
    let class_id = provision(&app).await;
    app.enrollments
        .enroll_self(&class_id, "SE001", None)
        .await
        .unwrap();

    // every repository sees the same rows
    assert!(!app.store.is_empty().await);
    let classes = app
        .enrollments
        .list_classes_for_student("SE001")
        .await
        .unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].student_count, 1);
}
