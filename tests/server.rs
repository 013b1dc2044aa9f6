//! HTTP routes exercised in-process with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use company_intel::jobs::JobManager;
use company_intel::models::{CleanedRecord, EmployeeSize, RawRecord};
use company_intel::server::{build_router, AppState};
use company_intel::store::CompanyStore;
use helpers::{harness, Harness, ScriptedAi, ScriptedNews};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    build_router(AppState::new(JobManager::new(h.pipeline.clone())))
}

async fn submit_csv(app: &Router, csv: &str) -> String {
    let (status, body) = send(app, post_json("/api/upload", json!({ "csv": csv }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["job_id"].as_str().unwrap().to_string()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn record(name: &str, domain: &str, country: &str, size: EmployeeSize) -> CleanedRecord {
    CleanedRecord {
        name: name.to_string(),
        domain: Some(domain.to_string()),
        country: country.to_string(),
        employee_size: size,
        raw_json: RawRecord::new(),
    }
}

async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["state"] == "completed" || body["state"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

#[tokio::test]
async fn test_health() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let (status, body) = send(&app(&h), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_list_companies_with_filters() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    h.store
        .insert(&record("Alpha", "alpha.com", "United States", EmployeeSize::Giant))
        .await
        .unwrap();
    h.store
        .insert(&record("Beta", "beta.de", "Germany", EmployeeSize::Small))
        .await
        .unwrap();
    let app = app(&h);

    let (status, body) = send(&app, get("/api/companies")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["limit"], 50);

    let (_, body) = send(&app, get("/api/companies?country=germ")).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["companies"][0]["name"], "Beta");

    let (_, body) = send(&app, get("/api/companies?employee_size=10%2C000%2B")).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["companies"][0]["employee_size"], "10,000+");

    let (_, body) = send(&app, get("/api/companies?limit=500&offset=1")).await;
    assert_eq!(body["limit"], 100);
    assert_eq!(body["companies"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_rejects_unknown_size() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let (status, body) = send(&app(&h), get("/api/companies?employee_size=huge")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_get_company_and_not_found() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let company = h
        .store
        .insert(&record("Alpha", "alpha.com", "United States", EmployeeSize::Medium))
        .await
        .unwrap();
    let app = app(&h);

    let (status, body) = send(&app, get(&format!("/api/companies/{}", company.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], "alpha.com");
    assert_eq!(body["enrichment_data"], Value::Null);

    let (status, body) = send(&app, get("/api/companies/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_enrich_company_route() {
    let ai = ScriptedAi::new().with_signals(json!({"leadership_changes": ["New CEO"]}));
    let h = harness(ai, ScriptedNews::failing_for(&["Broken"]));
    let ok = h
        .store
        .insert(&record("Alpha", "alpha.com", "United States", EmployeeSize::Medium))
        .await
        .unwrap();
    let broken = h
        .store
        .insert(&record("Broken", "broken.com", "United States", EmployeeSize::Medium))
        .await
        .unwrap();
    let app = app(&h);

    let (status, body) = send(
        &app,
        post_json(&format!("/api/companies/{}/enrich", ok.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // 2 articles (20) + 1 signal (5) + leadership (15)
    assert_eq!(body["enrichment_data"]["confidence_score"], 40);

    let (status, body) = send(
        &app,
        post_json(&format!("/api/companies/{}/enrich", broken.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "processing_failed");

    let (status, _) = send(&app, post_json("/api/companies/nope/enrich", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_all_companies() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    h.store
        .insert(&record("Alpha", "alpha.com", "US", EmployeeSize::Tiny))
        .await
        .unwrap();
    let app = app(&h);

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/companies")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (_, body) = send(&app, get("/api/companies")).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_upload_job_lifecycle() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let app = app(&h);

    let csv = "name,domain,country,employee_size\nAcme Inc.,acme.com,us,100\n,,,\n";
    let (status, body) = send(
        &app,
        post_json("/api/upload", json!({"csv": csv, "enable_enrichment": true})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let job = wait_for_job(&app, &job_id).await;
    assert_eq!(job["state"], "completed");
    assert_eq!(job["progress"], 100);
    assert_eq!(job["result"]["processed"], 2);
    assert_eq!(job["result"]["inserted"], 1);
    assert_eq!(job["result"]["enriched"], 1);
    assert_eq!(job["failure_reason"], Value::Null);

    let stored = h.store.find_by_domain("acme.com").await.unwrap().unwrap();
    assert_eq!(stored.name, "Acme");
}

#[tokio::test]
async fn test_upload_records_job() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let app = app(&h);

    let (status, body) = send(
        &app,
        post_json(
            "/api/upload",
            json!({"records": [{"name": "Alpha", "domain": "alpha.com"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = wait_for_job(&app, body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["state"], "completed");
    assert_eq!(job["result"]["enrichment_skipped"], 1);
}

#[tokio::test]
async fn test_failed_upload_job_reports_reason() {
    let h = harness(ScriptedAi::failing_for(&["Acme"]), ScriptedNews::new());
    let app = app(&h);

    let csv = "name,domain\nAcme,acme.com\n";
    let (_, body) = send(&app, post_json("/api/upload", json!({"csv": csv}))).await;

    let job = wait_for_job(&app, body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["state"], "failed");
    assert!(job["failure_reason"]
        .as_str()
        .unwrap()
        .contains("AI cleaning failed for all companies"));
}

#[tokio::test]
async fn test_upload_rejects_empty_body() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let app = app(&h);

    let (status, body) = send(&app, post_json("/api/upload", json!({"csv": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(&app, post_json("/api/upload", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let (status, body) = send(&app(&h), get("/api/jobs/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_finished_jobs_evicted_after_retention() {
    let h = harness(ScriptedAi::new(), ScriptedNews::new());
    let jobs = JobManager::new(h.pipeline.clone()).with_retention(Duration::ZERO);
    let app = build_router(AppState::new(jobs));
    let csv = "name,domain\nAcme,acme.com\n";

    let first = submit_csv(&app, csv).await;
    assert_eq!(wait_for_job(&app, &first).await["state"], "completed");

    // The next submission sweeps the finished job away.
    let second = submit_csv(&app, csv).await;
    let (status, _) = send(&app, get(&format!("/api/jobs/{}", first))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(wait_for_job(&app, &second).await["state"], "completed");
}
