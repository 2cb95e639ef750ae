/// Farm management, membership roles, dashboard, exports and device readings

mod common;

use axum::http::{header, Method, StatusCode};
use common::{token_for, TestContext};
use serde_json::json;

#[tokio::test]
async fn test_farm_listing_carries_role() {
    let Some(ctx) = TestContext::new().await else { return };

    let (status, body) = ctx.get("/v1/farms", &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);

    let farms = body.as_array().unwrap();
    assert_eq!(farms.len(), 1);
    assert_eq!(farms[0]["id"], ctx.a.farm.id.to_string());
    assert_eq!(farms[0]["role"], "administrator");

    let (status, _) = ctx
        .get(&format!("/v1/farms/{}", ctx.b.farm.id), &ctx.a.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_members_gain_access_with_their_role() {
    let Some(ctx) = TestContext::new().await else { return };
    let farm_uri = format!("/v1/farms/{}", ctx.a.farm.id);

    // B joins A's farm as a worker
    let (status, body) = ctx
        .post(
            &format!("{}/members", farm_uri),
            &ctx.a.token,
            json!({ "email": ctx.b.user.email, "role": "worker" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "worker");

    let (status, _) = ctx
        .post(
            &format!("{}/members", farm_uri),
            &ctx.a.token,
            json!({ "email": ctx.b.user.email }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Workers keep records but cannot manage the farm
    let b_on_a = token_for(&ctx.b.user, Some(ctx.a.farm.id)).unwrap();
    ctx.create(
        "/v1/occurrences",
        &b_on_a,
        json!({ "occurred_on": "2024-04-02", "title": "Cerca quebrada", "severity": "high" }),
    )
    .await;

    let (status, body) = ctx.patch(&farm_uri, &b_on_a, json!({ "name": "Renamed" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    assert_eq!(ctx.delete(&farm_uri, &b_on_a).await, StatusCode::FORBIDDEN);

    let (status, body) = ctx.get(&format!("{}/members", farm_uri), &b_on_a).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    // Removing B revokes access
    let member_uri = format!("{}/members/{}", farm_uri, ctx.b.user.id);
    assert_eq!(ctx.delete(&member_uri, &ctx.a.token).await, StatusCode::NO_CONTENT);

    let uri = format!("/v1/occurrences?farm_id={}", ctx.a.farm.id);
    let (status, _) = ctx.get(&uri, &b_on_a).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_last_administrator_is_kept() {
    let Some(ctx) = TestContext::new().await else { return };
    let member_uri = format!("/v1/farms/{}/members/{}", ctx.a.farm.id, ctx.a.user.id);

    let (status, _) = ctx
        .patch(&member_uri, &ctx.a.token, json!({ "role": "viewer" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(ctx.delete(&member_uri, &ctx.a.token).await, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = ctx.get("/v1/farms", &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["role"], "administrator");

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_farm_update_is_audited() {
    let Some(ctx) = TestContext::new().await else { return };
    let farm_uri = format!("/v1/farms/{}", ctx.a.farm.id);

    let (status, body) = ctx
        .patch(
            &farm_uri,
            &ctx.a.token,
            json!({ "name": "Fazenda Boa Vista", "area_hectares": 250.5 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Fazenda Boa Vista");
    assert_eq!(body["area_hectares"], "250.50");

    ctx.create(
        "/v1/medications",
        &ctx.a.token,
        json!({ "name": "Ivermectina", "unit": "ml" }),
    )
    .await;

    let (status, body) = ctx.get(&format!("{}/audit", farm_uri), &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["entity"] == "medication" && e["action"] == "create"));

    let (status, _) = ctx.get(&format!("{}/audit", farm_uri), &ctx.b.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_dashboard_summary() {
    let Some(ctx) = TestContext::new().await else { return };

    ctx.create("/v1/paddocks", &ctx.a.token, json!({ "name": "Piquete 1" })).await;
    let animal = ctx
        .create("/v1/animals", &ctx.a.token, json!({ "tag": "D-1", "sex": "female" }))
        .await;
    for (date, weight) in [("2024-05-02", 300), ("2024-05-28", 311)] {
        ctx.create(
            "/v1/weighings",
            &ctx.a.token,
            json!({ "animal_id": animal, "weighed_on": date, "weight_kg": weight }),
        )
        .await;
    }
    ctx.create(
        "/v1/purchases",
        &ctx.a.token,
        json!({ "purchased_on": "2024-05-10", "item": "Sal", "quantity": 2, "unit": "saco", "amount": 120 }),
    )
    .await;
    ctx.create(
        "/v1/ledger",
        &ctx.a.token,
        json!({ "entry_date": "2024-05-20", "description": "Venda de leite", "amount": 300, "kind": "revenue" }),
    )
    .await;

    let uri = format!("/v1/farms/{}/dashboard/summary", ctx.a.farm.id);
    let (status, body) = ctx.get(&uri, &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_animals"], 1);
    assert_eq!(body["paddocks"], 1);
    assert_eq!(body["crop_fields"], 0);
    assert_eq!(body["revenue"], "300.00");
    assert_eq!(body["expense"], "120.00");
    assert_eq!(body["balance"], "180.00");

    let uri = format!("/v1/farms/{}/dashboard/finance?from=2024-05-01&to=2024-05-31", ctx.a.farm.id);
    let (status, body) = ctx.get(&uri, &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    let months = body.as_array().unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0]["month"], "2024-05-01");

    let uri = format!("/v1/farms/{}/dashboard/weighings?animal_id={}", ctx.a.farm.id, animal);
    let (status, body) = ctx.get(&uri, &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["month"], "2024-05-01");
    assert_eq!(body[0]["weighings"], 2);
    assert_eq!(body[0]["average_weight_kg"], "305.50");

    let uri = format!("/v1/farms/{}/dashboard/summary?from=2024-06-01&to=2024-05-01", ctx.a.farm.id);
    let (status, _) = ctx.get(&uri, &ctx.a.token).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let uri = format!("/v1/farms/{}/dashboard/summary", ctx.a.farm.id);
    let (status, _) = ctx.get(&uri, &ctx.b.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_csv_export() {
    let Some(ctx) = TestContext::new().await else { return };

    ctx.create("/v1/animals", &ctx.a.token, json!({ "tag": "E-1", "sex": "male" })).await;
    ctx.create("/v1/animals", &ctx.b.token, json!({ "tag": "FOREIGN", "sex": "male" })).await;

    let (status, headers, body) = ctx
        .send_raw(Method::GET, "/v1/exports/animals", Some(&ctx.a.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");

    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"animals-"));
    assert!(disposition.ends_with(".csv\""));

    let text = String::from_utf8(body).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("id,farm_id,paddock_id,tag"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains("E-1"));

    let (status, _) = ctx.get("/v1/exports/spreadsheets", &ctx.a.token).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_device_reading_batch() {
    let Some(ctx) = TestContext::new().await else { return };

    let readings = json!([
        { "device_id": "sonda-7", "metric": "soil_moisture", "value": 31.5, "unit": "%", "recorded_at": "2024-05-01T06:00:00Z" },
        { "device_id": "sonda-7", "metric": "soil_moisture", "value": 29.0, "unit": "%", "recorded_at": "2024-05-01T12:00:00Z" }
    ]);

    let (status, body) = ctx.post("/v1/device-readings/batch", &ctx.a.token, readings).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["inserted"], 2);

    let (status, body) = ctx.get("/v1/device-readings?search=sonda", &ctx.a.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    // Newest first
    assert_eq!(body["data"][0]["value"], 29.0);

    let (_, body) = ctx.get("/v1/device-readings", &ctx.b.token).await;
    assert_eq!(body["total"], 0);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_device_reading_correction() {
    let Some(ctx) = TestContext::new().await else { return };

    let own_paddock = ctx.create("/v1/paddocks", &ctx.a.token, json!({ "name": "Piquete 3" })).await;
    let foreign_paddock = ctx.create("/v1/paddocks", &ctx.b.token, json!({ "name": "Alheio" })).await;
    let reading = ctx
        .create(
            "/v1/device-readings",
            &ctx.a.token,
            json!({ "device_id": "pluv-01", "metric": "rainfall", "value": 12.4, "unit": "mm", "recorded_at": "2024-02-01T06:00:00Z" }),
        )
        .await;
    let uri = format!("/v1/device-readings/{}", reading);

    let (status, body) = ctx
        .patch(&uri, &ctx.a.token, json!({ "value": 14.0, "paddock_id": own_paddock }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 14.0);
    assert_eq!(body["paddock_id"], own_paddock.to_string());
    assert_eq!(body["unit"], "mm");

    let (status, _) = ctx
        .patch(&uri, &ctx.a.token, json!({ "paddock_id": foreign_paddock }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = ctx.patch(&uri, &ctx.a.token, json!({ "metric": "  " })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = ctx.patch(&uri, &ctx.b.token, json!({ "value": 0.0 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx.patch(&uri, &ctx.a.token, json!({ "paddock_id": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paddock_id"].is_null());
    assert_eq!(body["value"], 14.0);

    let audit_uri = format!("/v1/farms/{}/audit", ctx.a.farm.id);
    let (_, body) = ctx.get(&audit_uri, &ctx.a.token).await;
    let reading_actions: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["entity"] == "device_reading" && e["entity_id"] == reading.to_string())
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(reading_actions.contains(&"create"));
    assert_eq!(reading_actions.iter().filter(|a| **a == "update").count(), 2);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_member_changes_are_audited() {
    let Some(ctx) = TestContext::new().await else { return };
    let farm_uri = format!("/v1/farms/{}", ctx.a.farm.id);
    let member_uri = format!("{}/members/{}", farm_uri, ctx.b.user.id);

    let (status, _) = ctx
        .post(
            &format!("{}/members", farm_uri),
            &ctx.a.token,
            json!({ "email": ctx.b.user.email, "role": "viewer" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = ctx.patch(&member_uri, &ctx.a.token, json!({ "role": "manager" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.delete(&member_uri, &ctx.a.token).await, StatusCode::NO_CONTENT);

    let (_, body) = ctx.get(&format!("{}/audit", farm_uri), &ctx.a.token).await;
    let member_actions: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["entity"] == "member" && e["entity_id"] == ctx.b.user.id.to_string())
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    for action in ["create", "update", "delete"] {
        assert!(member_actions.contains(&action), "missing {}", action);
    }

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_blank_names_are_rejected() {
    let Some(ctx) = TestContext::new().await else { return };

    let (status, body) = ctx.post("/v1/farms", &ctx.a.token, json!({ "name": "   " })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = ctx
        .post("/v1/animals", &ctx.a.token, json!({ "tag": "\t", "sex": "female" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = ctx
        .patch(&format!("/v1/farms/{}", ctx.a.farm.id), &ctx.a.token, json!({ "name": " " }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = ctx.get("/v1/animals", &ctx.a.token).await;
    assert_eq!(body["total"], 0);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let Some(ctx) = TestContext::new().await else { return };

    let (status, headers, body) = ctx.send_raw(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");

    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");

    let (status, _, _) = ctx.send_raw(Method::GET, "/v1/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.cleanup().await;
}
