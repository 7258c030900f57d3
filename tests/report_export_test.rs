//! Report aggregation and movement exports through the HTTP surface.

mod common;

use axum::http::{header, StatusCode};
use common::{body_bytes, location, response_json, TestApp};
use inventory_tracker::entities::{state, Role};
use serde_json::{json, Value};
use std::io::{Cursor, Read};

/// Three state changes, oldest first: Alpha, Beta, Gamma.
async fn seeded_history(app: &TestApp, admin_cookie: &str) {
    let repair = app.state_id(state::IN_REPAIR).await;
    for name in ["Alpha", "Beta", "Gamma"] {
        let product = app.create_product(name, state::AVAILABLE).await;
        let response = app
            .post(
                &format!("/admin/producto/{}/cambiar_estado", product.id),
                json!({ "state_id": repair }),
                admin_cookie,
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}

#[tokio::test]
async fn csv_export_lists_every_movement_newest_first() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;
    seeded_history(&app, &cookie).await;

    let response = app.get("/reportes/exportar/csv", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=movement_report.csv"
    );
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Date,Product,User,Previous State,New State");
    assert_eq!(lines.len(), 4);
    let products: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(products, ["Gamma", "Beta", "Alpha"]);
    assert!(lines[1].ends_with(",jefa,Available,In-Repair"));
}

#[tokio::test]
async fn json_export_matches_csv_rows() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;
    seeded_history(&app, &cookie).await;

    let response = app.get("/reportes/exportar/JSON", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rows: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let rows = rows.as_array().expect("row array");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["product"], "Gamma");
    assert_eq!(rows[2]["product"], "Alpha");
    assert_eq!(rows[0]["new_state"], "In-Repair");
}

#[tokio::test]
async fn binary_exports_carry_their_formats() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;
    seeded_history(&app, &cookie).await;

    let excel = app.get("/reportes/exportar/excel", &cookie).await;
    assert_eq!(excel.status(), StatusCode::OK);
    assert_eq!(
        excel.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=movement_report.xlsx"
    );
    let workbook = body_bytes(excel).await;
    assert!(workbook.starts_with(b"PK"));
    let mut archive = zip::ZipArchive::new(Cursor::new(workbook)).unwrap();
    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut sheet)
        .unwrap();
    assert_eq!(sheet.matches("<row ").count(), 4);

    let pdf = app.get("/reportes/exportar/pdf", &cookie).await;
    assert_eq!(pdf.status(), StatusCode::OK);
    assert_eq!(pdf.headers()[header::CONTENT_TYPE], "application/pdf");
    let document = body_bytes(pdf).await;
    assert!(document.starts_with(b"%PDF"));
    let drawn = pdf_strings(&document);
    let products: Vec<&str> = drawn
        .iter()
        .map(String::as_str)
        .filter(|t| ["Alpha", "Beta", "Gamma"].contains(t))
        .collect();
    assert_eq!(products, ["Gamma", "Beta", "Alpha"]);
}

/// Strings drawn on every page of a generated PDF.
fn pdf_strings(bytes: &[u8]) -> Vec<String> {
    use printpdf::lopdf::{content::Content, Document, Object};

    let doc = Document::load_mem(bytes).unwrap();
    let mut drawn = Vec::new();
    for page_id in doc.get_pages().into_values() {
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        for op in content.operations.iter().filter(|op| op.operator == "Tj") {
            if let Some(Object::String(raw, _)) = op.operands.first() {
                drawn.push(Document::decode_text(Some("WinAnsiEncoding"), raw));
            }
        }
    }
    drawn
}

#[tokio::test]
async fn unknown_export_format_is_not_found() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;

    let response = app.get("/reportes/exportar/docx", &cookie).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_history_exports_header_only() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;

    let response = app.get("/reportes/exportar/csv", &cookie).await;
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[tokio::test]
async fn teacher_reads_reports_but_cannot_export() {
    let app = TestApp::new().await;
    let (_, admin) = app.signed_in("jefa", Role::Admin).await;
    let (_, teacher) = app.signed_in("profe", Role::Teacher).await;
    seeded_history(&app, &admin).await;
    app.create_product("Idle", state::AVAILABLE).await;

    let report = response_json(app.get("/reportes", &teacher).await).await;
    let data = &report["data"];
    assert_eq!(data["total_products"], 4);
    assert_eq!(data["movements_by_user"][0]["name"], "jefa");
    assert_eq!(data["movements_by_user"][0]["count"], 3);
    let by_state = data["products_by_state"].as_array().unwrap();
    let repair = by_state
        .iter()
        .find(|s| s["state"] == "In-Repair")
        .expect("repair bucket");
    assert_eq!(repair["count"], 3);

    let export = app.get("/reportes/exportar/csv", &teacher).await;
    assert_eq!(export.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&export), "/");
}

#[tokio::test]
async fn report_state_filter_narrows_state_buckets() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;
    seeded_history(&app, &cookie).await;
    app.create_product("Idle", state::AVAILABLE).await;

    let filtered = response_json(app.get("/reportes?estado=Available", &cookie).await).await;
    let buckets = filtered["data"]["products_by_state"].as_array().unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["state"], "Available");
    assert_eq!(buckets[0]["count"], 1);
    assert_eq!(filtered["data"]["state_filter"], "Available");
    assert_eq!(filtered["data"]["total_products"], 4);

    let unknown = response_json(app.get("/reportes?estado=Lost", &cookie).await).await;
    assert_eq!(unknown["data"]["products_by_state"][0]["count"], 0);
    assert_eq!(unknown["data"]["warnings"].as_array().unwrap().len(), 1);

    let inverted = app
        .get("/reportes?start=2024-05-10&end=2024-05-01", &cookie)
        .await;
    assert_eq!(inverted.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn out_of_range_report_dates_are_rejected() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;

    let response = app
        .get("/reportes?fecha_fin=-262143-01-01", &cookie)
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(
        body["details"]["end"][0],
        "Invalid date, expected YYYY-MM-DD"
    );

    let future_start = app.get("/reportes?fecha_inicio=9999-01-01", &cookie).await;
    assert_eq!(future_start.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(future_start).await;
    assert_eq!(
        body["details"]["start"][0],
        "Start date must not be after end date"
    );

    let open_end = app.get("/reportes?fecha_inicio=2024-01-01", &cookie).await;
    assert_eq!(open_end.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_dashboard_summarises_activity() {
    let app = TestApp::new().await;
    let (_, cookie) = app.signed_in("jefa", Role::Admin).await;
    seeded_history(&app, &cookie).await;

    let stats = response_json(app.get("/admin/dashboard", &cookie).await).await;
    assert_eq!(stats["data"]["total_products"], 3);
    assert_eq!(stats["data"]["total_movements"], 3);
    assert_eq!(stats["data"]["recent_movements"][0]["product"], "Gamma");
}
