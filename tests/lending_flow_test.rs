use bibliotheca::db;
use bibliotheca::domain::{AuditContext, DomainError};
use bibliotheca::models::exemplar::ExemplarStatus;
use bibliotheca::models::lending::LendingStatus;
use bibliotheca::models::{book, exemplar, lending, member};
use bibliotheca::services::{exemplar_service, lending_service, now_stamp};
use bibliotheca::services::exemplar_service::CreateExemplarInput;
use bibliotheca::services::lending_service::BorrowInput;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

// Helper to create a test database
async fn setup_test_db() -> DatabaseConnection {
    // In-memory SQLite for testing
    db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB")
}

fn audit() -> AuditContext {
    AuditContext::new("test_admin")
}

// Helper to create a test member
async fn create_test_member(db: &DatabaseConnection, username: &str) -> i32 {
    let now = now_stamp();
    let m = member::ActiveModel {
        name: Set(format!("Member {}", username)),
        username: Set(username.to_string()),
        email: Set(None),
        password_hash: Set("hash".to_string()),
        role: Set("member".to_string()),
        is_deleted: Set(false),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    m.insert(db).await.expect("Failed to create member").id
}

// Helper to create a test book
async fn create_test_book(
    db: &DatabaseConnection,
    title: &str,
    circulating: bool,
    status: book::BookStatus,
) -> i32 {
    let now = now_stamp();
    let b = book::ActiveModel {
        title: Set(title.to_string()),
        publisher: Set(None),
        circulating: Set(circulating),
        status: Set(status),
        is_deleted: Set(false),
        created_by: Set("test_admin".to_string()),
        updated_by: Set("test_admin".to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    b.insert(db).await.expect("Failed to create book").id
}

// Helper to create a test exemplar
async fn create_test_exemplar(db: &DatabaseConnection, book_id: i32, accession: &str) -> i32 {
    let exemplar = exemplar_service::create(
        db,
        CreateExemplarInput {
            accession_number: accession.to_string(),
            book_id,
            status: None,
            visible: None,
        },
        &audit(),
    )
    .await
    .expect("Failed to create exemplar");
    exemplar.id
}

fn borrow_input(book_id: i32, due: &str) -> BorrowInput {
    BorrowInput {
        book_id,
        due_date: due.to_string(),
        note: None,
        exemplar_id: None,
    }
}

#[tokio::test]
async fn borrow_selects_lowest_accession_number() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    // Inserted out of order on purpose
    create_test_exemplar(&db, book_id, "ACC-0200").await;
    create_test_exemplar(&db, book_id, "ACC-0100").await;
    create_test_exemplar(&db, book_id, "ACC-0300").await;

    let outcome = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .expect("borrow should succeed");

    assert_eq!(outcome.accession_number, "ACC-0100");
    assert_eq!(outcome.lending.status, LendingStatus::Active);
    assert_eq!(outcome.lending.exemplar_id, Some(outcome.exemplar_id));

    let chosen = exemplar_service::find_by_id(&db, outcome.exemplar_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chosen.status, ExemplarStatus::OnLoan);
}

#[tokio::test]
async fn borrow_without_copies_fails_and_writes_nothing() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;

    let err = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .expect_err("borrow must fail without copies");
    assert!(matches!(err, DomainError::InvalidState(_)));

    let count = lending::Entity::find().count(&db).await.unwrap();
    assert_eq!(count, 0, "no lending row may be created");
}

#[tokio::test]
async fn borrow_reference_only_book_is_forbidden() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Rare Atlas", false, book::BookStatus::Normal).await;
    create_test_exemplar(&db, book_id, "ACC-0001").await;

    let err = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .expect_err("reference-only book must not be lendable");
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test]
async fn borrow_damaged_book_is_invalid_state() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Worn Novel", true, book::BookStatus::Damaged).await;
    create_test_exemplar(&db, book_id, "ACC-0001").await;

    let err = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .expect_err("damaged book must not be lendable");
    assert!(matches!(err, DomainError::InvalidState(_)));
}

#[tokio::test]
async fn borrow_missing_book_is_not_found() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;

    let err = lending_service::borrow(&db, member_id, borrow_input(999, "2099-01-01"), &audit())
        .await
        .expect_err("missing book must fail");
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn borrow_with_exemplar_of_another_book_is_bad_request() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_a = create_test_book(&db, "Book A", true, book::BookStatus::Normal).await;
    let book_b = create_test_book(&db, "Book B", true, book::BookStatus::Normal).await;
    create_test_exemplar(&db, book_a, "A-0001").await;
    let foreign = create_test_exemplar(&db, book_b, "B-0001").await;

    let input = BorrowInput {
        book_id: book_a,
        due_date: "2099-01-01".to_string(),
        note: None,
        exemplar_id: Some(foreign),
    };
    let err = lending_service::borrow(&db, member_id, input, &audit())
        .await
        .expect_err("cross-book exemplar must fail");
    assert!(matches!(err, DomainError::BadRequest(_)));
}

#[tokio::test]
async fn borrow_with_unavailable_exemplar_is_invalid_state() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let other = create_test_member(&db, "bob").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    lending_service::borrow(&db, other, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .expect("first borrow succeeds");

    let input = BorrowInput {
        book_id,
        due_date: "2099-01-01".to_string(),
        note: None,
        exemplar_id: Some(ex),
    };
    let err = lending_service::borrow(&db, member_id, input, &audit())
        .await
        .expect_err("on-loan exemplar must be refused");
    assert!(matches!(err, DomainError::InvalidState(_)));
}

#[tokio::test]
async fn borrow_with_missing_exemplar_is_not_found() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;

    let input = BorrowInput {
        book_id,
        due_date: "2099-01-01".to_string(),
        note: None,
        exemplar_id: Some(424242),
    };
    let err = lending_service::borrow(&db, member_id, input, &audit())
        .await
        .expect_err("unknown exemplar must fail");
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn round_trip_restores_exemplar_and_closes_lending() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    let outcome = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .expect("borrow succeeds");

    let returned = lending_service::return_lending(&db, &outcome.lending.id, &audit())
        .await
        .expect("return succeeds");
    assert_eq!(returned.status, LendingStatus::Returned);
    assert!(returned.return_date.is_some());

    let copy = exemplar_service::find_by_id(&db, ex).await.unwrap().unwrap();
    assert_eq!(copy.status, ExemplarStatus::Available);

    // Second return of the same lending must be rejected
    let err = lending_service::return_lending(&db, &outcome.lending.id, &audit())
        .await
        .expect_err("double return must fail");
    assert!(matches!(err, DomainError::InvalidState(_)));

    // And must not disturb the exemplar
    let copy = exemplar_service::find_by_id(&db, ex).await.unwrap().unwrap();
    assert_eq!(copy.status, ExemplarStatus::Available);
}

#[tokio::test]
async fn return_unknown_lending_is_not_found() {
    let db = setup_test_db().await;
    let err = lending_service::return_lending(&db, "no-such-id", &audit())
        .await
        .expect_err("unknown lending must fail");
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn concurrent_borrows_of_single_copy_leave_one_winner() {
    let db = setup_test_db().await;
    let alice = create_test_member(&db, "alice").await;
    let bob = create_test_member(&db, "bob").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    let audit_ctx = audit();
    let (a, b) = tokio::join!(
        lending_service::borrow(&db, alice, borrow_input(book_id, "2099-01-01"), &audit_ctx),
        lending_service::borrow(&db, bob, borrow_input(book_id, "2099-01-01"), &audit_ctx),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|s| **s).count();
    assert_eq!(successes, 1, "exactly one borrow may win");

    let loser = if a.is_err() { a.err() } else { b.err() };
    assert!(matches!(
        loser,
        Some(DomainError::Conflict(_)) | Some(DomainError::InvalidState(_))
    ));

    // Final state: copy on loan, exactly one active lending
    let copy = exemplar_service::find_by_id(&db, ex).await.unwrap().unwrap();
    assert_eq!(copy.status, ExemplarStatus::OnLoan);
    let active = exemplar_service::active_lending_count(&db, ex).await.unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn on_loan_matches_active_ledger_after_operation_sequence() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex1 = create_test_exemplar(&db, book_id, "ACC-0001").await;
    let ex2 = create_test_exemplar(&db, book_id, "ACC-0002").await;

    let first = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();
    let _second = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();
    lending_service::return_lending(&db, &first.lending.id, &audit())
        .await
        .unwrap();
    let third = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();
    lending_service::return_lending(&db, &third.lending.id, &audit())
        .await
        .unwrap();

    // ex1 was borrowed, returned, borrowed again, returned again; ex2 is
    // still out. Status must agree with the ledger for every copy.
    for ex in [ex1, ex2] {
        let copy = exemplar_service::find_by_id(&db, ex).await.unwrap().unwrap();
        let active = exemplar_service::active_lending_count(&db, ex).await.unwrap();
        if copy.status == ExemplarStatus::OnLoan {
            assert_eq!(active, 1);
        } else {
            assert_eq!(active, 0);
        }
    }
}

#[tokio::test]
async fn overdue_listing_is_filtered_and_sorted() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    for n in 1..=4 {
        create_test_exemplar(&db, book_id, &format!("ACC-000{}", n)).await;
    }

    // Two overdue loans (out of order), one future, one overdue-but-returned
    let late_b = lending_service::borrow(&db, member_id, borrow_input(book_id, "2021-06-01"), &audit())
        .await
        .unwrap();
    let late_a = lending_service::borrow(&db, member_id, borrow_input(book_id, "2020-01-15"), &audit())
        .await
        .unwrap();
    let _future = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();
    let closed = lending_service::borrow(&db, member_id, borrow_input(book_id, "2019-01-01"), &audit())
        .await
        .unwrap();
    lending_service::return_lending(&db, &closed.lending.id, &audit())
        .await
        .unwrap();

    let overdue = lending_service::find_overdue(&db).await.unwrap();
    assert_eq!(overdue.len(), 2);
    // Most overdue first
    assert_eq!(overdue[0].id, late_a.lending.id);
    assert_eq!(overdue[1].id, late_b.lending.id);
    for l in &overdue {
        assert!(l.return_date.is_none());
        assert_eq!(l.status, LendingStatus::Active);
    }
}

#[tokio::test]
async fn duplicate_accession_number_is_a_conflict() {
    let db = setup_test_db().await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    create_test_exemplar(&db, book_id, "ACC-0001").await;

    let err = exemplar_service::create(
        &db,
        CreateExemplarInput {
            accession_number: "ACC-0001".to_string(),
            book_id,
            status: None,
            visible: None,
        },
        &audit(),
    )
    .await
    .expect_err("duplicate accession must fail");
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn deleting_an_on_loan_exemplar_is_refused() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();

    let err = exemplar_service::delete(&db, ex, &audit())
        .await
        .expect_err("on-loan exemplar must not be deletable");
    assert!(matches!(err, DomainError::InvalidState(_)));
}

#[tokio::test]
async fn deleted_accession_number_can_be_reissued() {
    let db = setup_test_db().await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    exemplar_service::delete(&db, ex, &audit()).await.unwrap();

    // The number is free again once its holder is soft-deleted
    let reborn = exemplar_service::create(
        &db,
        CreateExemplarInput {
            accession_number: "ACC-0001".to_string(),
            book_id,
            status: None,
            visible: None,
        },
        &audit(),
    )
    .await
    .expect("accession number should be reusable");
    assert_ne!(reborn.id, ex);
}

#[tokio::test]
async fn administrative_override_bypasses_orchestration() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();

    // The override flips the copy back without touching the ledger; the
    // active lending stays open. This desynchronization is accepted as an
    // administrative responsibility.
    let updated = exemplar_service::set_status(&db, ex, ExemplarStatus::Available, &audit())
        .await
        .unwrap();
    assert!(updated);

    let copy = exemplar_service::find_by_id(&db, ex).await.unwrap().unwrap();
    assert_eq!(copy.status, ExemplarStatus::Available);
    let active = exemplar_service::active_lending_count(&db, ex).await.unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn returning_a_withdrawn_copy_keeps_it_withdrawn() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let ex = create_test_exemplar(&db, book_id, "ACC-0001").await;

    let outcome = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();

    // The copy comes back damaged; an admin withdraws it before the
    // lending is closed in the ledger.
    exemplar_service::set_status(&db, ex, ExemplarStatus::Damaged, &audit())
        .await
        .unwrap();

    let returned = lending_service::return_lending(&db, &outcome.lending.id, &audit())
        .await
        .expect("return closes the ledger row");
    assert_eq!(returned.status, LendingStatus::Returned);
    assert!(returned.return_date.is_some());

    // Return must not resurrect the withdrawn copy
    let copy = exemplar_service::find_by_id(&db, ex).await.unwrap().unwrap();
    assert_eq!(copy.status, ExemplarStatus::Damaged);
    let active = exemplar_service::active_lending_count(&db, ex).await.unwrap();
    assert_eq!(active, 0);
}

#[tokio::test]
async fn exemplar_stats_count_per_status() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    create_test_exemplar(&db, book_id, "ACC-0001").await;
    create_test_exemplar(&db, book_id, "ACC-0002").await;
    let damaged = create_test_exemplar(&db, book_id, "ACC-0003").await;

    exemplar_service::set_status(&db, damaged, ExemplarStatus::Damaged, &audit())
        .await
        .unwrap();
    lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();

    let stats = exemplar_service::stats(&db, Some(book_id)).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.available, 1);
    assert_eq!(stats.on_loan, 1);
    assert_eq!(stats.damaged, 1);
    assert_eq!(stats.lost, 0);
}

#[tokio::test]
async fn lending_reads_ignore_soft_deleted_rows() {
    let db = setup_test_db().await;
    let member_id = create_test_member(&db, "alice").await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    create_test_exemplar(&db, book_id, "ACC-0001").await;

    let outcome = lending_service::borrow(&db, member_id, borrow_input(book_id, "2099-01-01"), &audit())
        .await
        .unwrap();

    // Soft-delete the row directly; reads must no longer surface it
    let mut active: lending::ActiveModel = outcome.lending.clone().into();
    active.is_deleted = Set(true);
    active.update(&db).await.unwrap();

    let found = lending_service::find_by_id(&db, &outcome.lending.id)
        .await
        .unwrap();
    assert!(found.is_none());

    let mine = lending_service::find_by_member(&db, member_id).await.unwrap();
    assert!(mine.is_empty());
}

#[tokio::test]
async fn available_listing_excludes_deleted_and_non_available() {
    let db = setup_test_db().await;
    let book_id = create_test_book(&db, "Dune", true, book::BookStatus::Normal).await;
    let keep = create_test_exemplar(&db, book_id, "ACC-0002").await;
    let gone = create_test_exemplar(&db, book_id, "ACC-0001").await;
    let broken = create_test_exemplar(&db, book_id, "ACC-0003").await;

    exemplar_service::delete(&db, gone, &audit()).await.unwrap();
    exemplar_service::set_status(&db, broken, ExemplarStatus::Damaged, &audit())
        .await
        .unwrap();

    let available = exemplar_service::find_available(&db, book_id).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, keep);

    let visible = exemplar::Entity::find()
        .filter(exemplar::Column::IsDeleted.eq(false))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(visible, 2);
}
