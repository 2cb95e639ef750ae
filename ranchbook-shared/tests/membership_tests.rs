/// Integration tests for farm membership and its administrator invariant
///
/// Skipped when `DATABASE_URL` is not set.

use ranchbook_shared::auth::middleware::Principal;
use ranchbook_shared::db::migrations::run_migrations;
use ranchbook_shared::error::ScopeError;
use ranchbook_shared::models::farm::{CreateFarm, Farm};
use ranchbook_shared::models::membership::{FarmRole, Membership};
use ranchbook_shared::models::user::{CreateUser, User};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.expect("Failed to connect");
    run_migrations(&pool).await.expect("Migrations failed");
    Some(pool)
}

async fn user(pool: &PgPool, prefix: &str) -> Principal {
    let user = User::create(
        pool,
        CreateUser {
            email: format!("{}-{}@example.com", prefix, Uuid::new_v4()),
            password_hash: "unused".to_string(),
            name: None,
        },
    )
    .await
    .unwrap();

    Principal::new(user.id, None, user.email)
}

/// A farm run by two administrators
async fn two_admin_farm(pool: &PgPool) -> (Farm, Principal, Principal) {
    let first = user(pool, "admin-a").await;
    let second = user(pool, "admin-b").await;

    let farm = Farm::create(
        pool,
        &first,
        CreateFarm {
            name: "Fazenda Dois Donos".to_string(),
            location: None,
            area_hectares: None,
        },
    )
    .await
    .unwrap();

    Membership::add_member(pool, &first, farm.id, &second.email, FarmRole::Administrator)
        .await
        .unwrap();

    (farm, first, second)
}

async fn administrators(pool: &PgPool, farm_id: Uuid) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM farm_members WHERE farm_id = $1 AND role = 'administrator'",
    )
    .bind(farm_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn cleanup(pool: &PgPool, farm: &Farm, users: &[&Principal]) {
    sqlx::query("DELETE FROM farms WHERE id = $1")
        .bind(farm.id)
        .execute(pool)
        .await
        .unwrap();
    for principal in users {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(principal.user_id)
            .execute(pool)
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mutual_removal_keeps_an_administrator() {
    let Some(pool) = test_pool().await else { return };

    for _ in 0..5 {
        let (farm, a, b) = two_admin_farm(&pool).await;

        let (a_removes_b, b_removes_a) = tokio::join!(
            Membership::remove_member(&pool, &a, farm.id, b.user_id),
            Membership::remove_member(&pool, &b, farm.id, a.user_id),
        );

        assert!(a_removes_b.is_err() || b_removes_a.is_err());
        assert_eq!(administrators(&pool, farm.id).await, 1);

        cleanup(&pool, &farm, &[&a, &b]).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mutual_demotion_keeps_an_administrator() {
    let Some(pool) = test_pool().await else { return };

    for _ in 0..5 {
        let (farm, a, b) = two_admin_farm(&pool).await;

        let (a_demotes_b, b_demotes_a) = tokio::join!(
            Membership::change_role(&pool, &a, farm.id, b.user_id, FarmRole::Viewer),
            Membership::change_role(&pool, &b, farm.id, a.user_id, FarmRole::Viewer),
        );

        assert!(a_demotes_b.is_err() || b_demotes_a.is_err());
        assert_eq!(administrators(&pool, farm.id).await, 1);

        cleanup(&pool, &farm, &[&a, &b]).await;
    }
}

#[tokio::test]
async fn test_removed_administrator_cannot_act() {
    let Some(pool) = test_pool().await else { return };
    let (farm, a, b) = two_admin_farm(&pool).await;

    Membership::remove_member(&pool, &a, farm.id, b.user_id).await.unwrap();

    let result = Membership::remove_member(&pool, &b, farm.id, a.user_id).await;
    assert!(matches!(result, Err(ScopeError::AccessDenied)));

    let result = Membership::remove_member(&pool, &a, farm.id, a.user_id).await;
    assert!(matches!(result, Err(ScopeError::Validation(_))));
    assert_eq!(administrators(&pool, farm.id).await, 1);

    cleanup(&pool, &farm, &[&a, &b]).await;
}

#[tokio::test]
async fn test_membership_changes_are_audited() {
    let Some(pool) = test_pool().await else { return };
    let (farm, a, b) = two_admin_farm(&pool).await;

    Membership::change_role(&pool, &a, farm.id, b.user_id, FarmRole::Worker)
        .await
        .unwrap();
    Membership::remove_member(&pool, &a, farm.id, b.user_id).await.unwrap();

    let actions: Vec<(String, String, Option<Uuid>)> = sqlx::query_as(
        "SELECT action, entity, entity_id FROM audit_logs \
         WHERE farm_id = $1 AND entity = 'member' ORDER BY created_at, id",
    )
    .bind(farm.id)
    .fetch_all(&pool)
    .await
    .unwrap();

    let expected = ["create", "update", "delete"];
    assert_eq!(actions.len(), expected.len());
    for ((action, _, entity_id), want) in actions.iter().zip(expected) {
        assert_eq!(action, want);
        assert_eq!(*entity_id, Some(b.user_id));
    }

    cleanup(&pool, &farm, &[&a, &b]).await;
}
