/// Paging, search and filter behaviour of the listing endpoints

mod common;

use axum::http::StatusCode;
use common::TestContext;
use serde_json::{json, Value};

async fn seed_animals(ctx: &TestContext, count: usize) {
    for i in 0..count {
        let sex = if i % 2 == 0 { "female" } else { "male" };
        ctx.create(
            "/v1/animals",
            &ctx.a.token,
            json!({ "tag": format!("BR-{:03}", i), "sex": sex }),
        )
        .await;
    }
}

fn ids(page: &Value) -> Vec<String> {
    page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_page_never_exceeds_total() {
    let Some(ctx) = TestContext::new().await else { return };
    seed_animals(&ctx, 5).await;

    for take in [1, 2, 5, 50] {
        let (status, body) = ctx
            .get(&format!("/v1/animals?take={}", take), &ctx.a.token)
            .await;
        assert_eq!(status, StatusCode::OK);

        let returned = body["data"].as_array().unwrap().len() as i64;
        let total = body["total"].as_i64().unwrap();
        assert_eq!(total, 5);
        assert!(returned <= total);
        assert!(returned <= take);
    }

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_pages_concatenate_to_the_full_listing() {
    let Some(ctx) = TestContext::new().await else { return };
    seed_animals(&ctx, 7).await;

    let (_, everything) = ctx.get("/v1/animals?take=100", &ctx.a.token).await;
    let expected = ids(&everything);
    assert_eq!(expected.len(), 7);

    let mut paged = Vec::new();
    for skip in (0..7).step_by(3) {
        let (status, page) = ctx
            .get(&format!("/v1/animals?take=3&skip={}", skip), &ctx.a.token)
            .await;
        assert_eq!(status, StatusCode::OK);
        paged.extend(ids(&page));
    }

    assert_eq!(paged, expected);

    let (_, past_end) = ctx.get("/v1/animals?skip=50", &ctx.a.token).await;
    assert_eq!(past_end["total"], 7);
    assert!(past_end["data"].as_array().unwrap().is_empty());

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_search_matches_case_insensitively() {
    let Some(ctx) = TestContext::new().await else { return };

    ctx.create(
        "/v1/paddocks",
        &ctx.a.token,
        json!({ "name": "Piquete do Rio", "forage": "Brachiaria" }),
    )
    .await;
    ctx.create(
        "/v1/paddocks",
        &ctx.a.token,
        json!({ "name": "Piquete da Serra", "forage": "Mombaça" }),
    )
    .await;

    let (status, body) = ctx.get("/v1/paddocks?search=BRACH", &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["name"], "Piquete do Rio");

    // Wildcards in the term are literal
    let (_, body) = ctx.get("/v1/paddocks?search=%25", &ctx.a.token).await;
    assert_eq!(body["total"], 0);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_children_filter_by_parent() {
    let Some(ctx) = TestContext::new().await else { return };

    let mimosa = ctx
        .create("/v1/animals", &ctx.a.token, json!({ "tag": "M-1", "sex": "female" }))
        .await;
    let trovao = ctx
        .create("/v1/animals", &ctx.a.token, json!({ "tag": "T-1", "sex": "male" }))
        .await;

    for (animal, weight, date) in [
        (mimosa, 310, "2024-02-01"),
        (mimosa, 325, "2024-03-01"),
        (trovao, 480, "2024-03-01"),
    ] {
        ctx.create(
            "/v1/weighings",
            &ctx.a.token,
            json!({ "animal_id": animal, "weighed_on": date, "weight_kg": weight }),
        )
        .await;
    }

    let (_, body) = ctx
        .get(&format!("/v1/weighings?animal_id={}", mimosa), &ctx.a.token)
        .await;
    assert_eq!(body["total"], 2);
    // Most recent first
    assert_eq!(body["data"][0]["weighed_on"], "2024-03-01");

    let (_, body) = ctx
        .get("/v1/weighings?from=2024-03-01&to=2024-03-31", &ctx.a.token)
        .await;
    assert_eq!(body["total"], 2);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_invalid_window_is_rejected() {
    let Some(ctx) = TestContext::new().await else { return };

    let (status, body) = ctx.get("/v1/animals?take=0", &ctx.a.token).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = ctx.get("/v1/animals?skip=-1", &ctx.a.token).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    seed_animals(&ctx, 3).await;
    let (status, body) = ctx.get("/v1/animals?take=500", &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    ctx.cleanup().await;
}
