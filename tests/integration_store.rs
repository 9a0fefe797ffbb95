//! Credential Store Integration Tests

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal_macros::dec;

use cashai_backend::store::{LoginMethod, NewTransaction, StoreError};

mod common;

fn new_transaction(id: &str, date: NaiveDate) -> NewTransaction {
    NewTransaction {
        aggregator_transaction_id: id.to_string(),
        amount: dec!(12.34),
        category: Some("FOOD_AND_DRINK".to_string()),
        merchant: Some("Blue Bottle".to_string()),
        date,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

#[tokio::test]
async fn test_create_and_get_user() {
    let store = common::setup_store().await;

    let first = store.create_user("ada@example.com", "Ada").await.unwrap();
    let second = store.create_user("grace@example.com", "Grace").await.unwrap();
    assert!(second > first, "user ids must strictly increase");

    let user = store
        .get_user_by_email("ada@example.com")
        .await
        .unwrap()
        .expect("user exists");
    assert_eq!(user.id, first);
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.name, "Ada");
    assert_eq!(user.login_method, LoginMethod::Email);

    let by_id = store.get_user_by_id(second).await.unwrap().unwrap();
    assert_eq!(by_id.email, "grace@example.com");

    assert!(store.get_user_by_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let store = common::setup_store().await;

    store.create_user("ada@example.com", "Ada").await.unwrap();
    let err = store
        .create_user("ada@example.com", "Someone Else")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind("ada@example.com")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_update_login_method() {
    let store = common::setup_store().await;
    let id = store.create_user("ada@example.com", "Ada").await.unwrap();

    let affected = store
        .update_user_login_method(id, LoginMethod::Apple)
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let user = store.get_user_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.login_method, LoginMethod::Apple);

    let missing = store
        .update_user_login_method(id + 100, LoginMethod::Google)
        .await
        .unwrap();
    assert_eq!(missing, 0);
}

#[tokio::test]
async fn test_dashboard_counts_active_users() {
    let store = common::setup_store().await;

    for i in 0..5 {
        store
            .create_user(&format!("user{}@example.com", i), "User")
            .await
            .unwrap();
    }

    // Backdate two users beyond the seven-day window
    sqlx::query("UPDATE users SET created_at = ? WHERE email IN (?, ?)")
        .bind(Utc::now() - Duration::days(10))
        .bind("user0@example.com")
        .bind("user1@example.com")
        .execute(store.pool())
        .await
        .unwrap();

    let stats = store.dashboard_stats(Utc::now()).await.unwrap();
    assert_eq!(stats.total_users, 5);
    assert_eq!(stats.active_users, 3);
    assert_eq!(stats.total_linked_accounts, 0);
    assert_eq!(stats.total_transactions, 0);
}

#[tokio::test]
async fn test_linked_account_credential_sealed_at_rest() {
    let store = common::setup_store().await;
    let user_id = store.create_user("ada@example.com", "Ada").await.unwrap();

    let account_id = store
        .save_linked_account(
            user_id,
            "item-1",
            "access-sandbox-secret",
            "Checking",
            "depository",
        )
        .await
        .unwrap();

    let raw: String = sqlx::query_scalar("SELECT plaid_access_token FROM bank_accounts WHERE id = ?")
        .bind(account_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert!(!raw.contains("access-sandbox-secret"));
    assert!(raw.starts_with("v1:"));

    let account = store.get_linked_account(account_id).await.unwrap().unwrap();
    assert_eq!(account.access_credential, "access-sandbox-secret");
    assert_eq!(account.item_id, "item-1");

    let json = serde_json::to_value(&account).unwrap();
    assert!(json.get("access_credential").is_none());

    let for_user = store.list_linked_accounts(Some(user_id)).await.unwrap();
    assert_eq!(for_user.len(), 1);
    let for_other = store.list_linked_accounts(Some(user_id + 1)).await.unwrap();
    assert!(for_other.is_empty());
}

#[tokio::test]
async fn test_linked_account_requires_existing_user() {
    let store = common::setup_store().await;

    let result = store
        .save_linked_account(999, "item-1", "access", "Checking", "depository")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_list_transactions_newest_first_with_limit() {
    let store = common::setup_store().await;
    let user_id = store.create_user("ada@example.com", "Ada").await.unwrap();
    let account_id = store
        .save_linked_account(user_id, "item-1", "access", "Checking", "depository")
        .await
        .unwrap();

    for d in [3, 1, 5, 2, 4] {
        store
            .save_transaction(user_id, account_id, &new_transaction(&format!("txn-{}", d), day(d)))
            .await
            .unwrap();
    }

    let records = store.list_transactions(Some(user_id), 2).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].date, day(5));
    assert_eq!(records[1].date, day(4));
    assert_eq!(records[0].amount, dec!(12.34));
    assert_eq!(records[0].aggregator_transaction_id, "txn-5");
}

#[tokio::test]
async fn test_duplicate_transactions_skipped() {
    let store = common::setup_store().await;
    let user_id = store.create_user("ada@example.com", "Ada").await.unwrap();
    let account_id = store
        .save_linked_account(user_id, "item-1", "access", "Checking", "depository")
        .await
        .unwrap();

    let batch = vec![new_transaction("txn-1", day(1)), new_transaction("txn-2", day(2))];
    assert_eq!(
        store.save_transactions(user_id, account_id, &batch).await.unwrap(),
        2
    );

    let overlapping = vec![new_transaction("txn-2", day(2)), new_transaction("txn-3", day(3))];
    assert_eq!(
        store
            .save_transactions(user_id, account_id, &overlapping)
            .await
            .unwrap(),
        1
    );

    let err = store
        .save_transaction(user_id, account_id, &new_transaction("txn-1", day(1)))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let all = store.list_transactions(None, 100).await.unwrap();
    assert_eq!(all.len(), 3);
}
