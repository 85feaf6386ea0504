use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use sheet_scrub::app::{FAILED_FILES_HEADER, router};
use sheet_scrub::cell::CellValue;
use sheet_scrub::config::ServerConfig;
use sheet_scrub::downloader::{FAILURES_ENTRY, ZIP_CONTENT_TYPE};
use sheet_scrub::xlsx::{XLSX_CONTENT_TYPE, XlsxDocument};
use std::io::{Cursor, Read};
use tower::ServiceExt;
use zip::ZipArchive;

const BOUNDARY: &str = "----sheet-scrub-test-boundary";

enum Part<'a> {
    File(&'a str, Vec<u8>),
    Field(&'a str, &'a str),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Field(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value).as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(parts: &[Part]) -> Request<Body> {
    let body = multipart_body(parts);
    Request::builder()
        .method("POST")
        .uri("/api/process")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

fn app() -> Router {
    router(&ServerConfig::default())
}

fn sample_xlsx(text: &str) -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, text).unwrap();
    worksheet.write_number(1, 0, 7.0).unwrap();
    workbook.save_to_buffer().unwrap()
}

fn first_cell(xlsx: &[u8]) -> CellValue {
    let document = XlsxDocument::from_bytes(xlsx.to_vec()).unwrap();
    let sheet = document.workbook().sheet("Sheet1").unwrap();
    sheet.value(0, 0).cloned().unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app()
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn landing_page_has_upload_form() {
    let response = app()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("action=\"/api/process\""));
    assert!(html.contains("name=\"files\""));
}

#[tokio::test]
async fn single_file_comes_back_as_workbook() {
    let request = upload_request(&[Part::File("report.xlsx", sample_xlsx("A [XYZ] B"))]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), XLSX_CONTENT_TYPE);
    assert!(header_str(&response, "content-disposition").contains("filename*=UTF-8''processed_report.xlsx"));
    assert_eq!(header_str(&response, FAILED_FILES_HEADER), "0");

    let bytes = body_bytes(response).await;
    assert_eq!(first_cell(&bytes), CellValue::Text("A/B".into()));
}

#[tokio::test]
async fn file_names_with_directories_are_reduced_to_the_base_name() {
    let request = upload_request(&[Part::File("q1/report.xlsx", sample_xlsx("[*] x"))]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = header_str(&response, "content-disposition");
    assert!(disposition.contains("filename=\"processed_report.xlsx\""));
    assert!(disposition.contains("filename*=UTF-8''processed_report.xlsx"));
}

#[tokio::test]
async fn mode_field_selects_legacy_rule() {
    let request = upload_request(&[
        Part::Field("mode", "asterisk"),
        Part::File("report.xlsx", sample_xlsx("A [XYZ] B")),
    ]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body_bytes(response).await;
    assert_eq!(first_cell(&bytes), CellValue::Text("A [XYZ] B".into()));
}

#[tokio::test]
async fn unknown_mode_is_rejected() {
    let request = upload_request(&[
        Part::Field("mode", "everything"),
        Part::File("report.xlsx", sample_xlsx("A [XYZ] B")),
    ]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn several_files_come_back_as_zip_with_failures() {
    let request = upload_request(&[
        Part::File("one.xlsx", sample_xlsx("[*] first")),
        Part::File("broken.xlsx", b"not a workbook".to_vec()),
        Part::File("two.xlsx", sample_xlsx("second\u{a0}[*] part")),
    ]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), ZIP_CONTENT_TYPE);
    assert!(header_str(&response, "content-disposition").contains("processed_files_"));
    assert_eq!(header_str(&response, FAILED_FILES_HEADER), "1");

    let bytes = body_bytes(response).await;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 3);

    let mut one = Vec::new();
    archive.by_name("processed_one.xlsx").unwrap().read_to_end(&mut one).unwrap();
    assert_eq!(first_cell(&one), CellValue::Text("first".into()));

    let mut two = Vec::new();
    archive.by_name("processed_two.xlsx").unwrap().read_to_end(&mut two).unwrap();
    assert_eq!(first_cell(&two), CellValue::Text("second/part".into()));

    let mut manifest = String::new();
    archive.by_name(FAILURES_ENTRY).unwrap().read_to_string(&mut manifest).unwrap();
    let failures: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(failures[0]["file"], "broken.xlsx");
}

#[tokio::test]
async fn all_files_failing_returns_report() {
    let request = upload_request(&[
        Part::File("a.xlsx", b"junk".to_vec()),
        Part::File("b.csv", b"x,y".to_vec()),
    ]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["mode"], "wildcard");
    assert_eq!(json["failures"].as_array().unwrap().len(), 2);
    assert_eq!(json["failures"][1]["file"], "b.csv");
}

#[tokio::test]
async fn request_without_files_is_rejected() {
    let request = upload_request(&[Part::Field("mode", "wildcard")]);
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_refused() {
    let config = ServerConfig {
        max_upload_mb: 1,
        ..ServerConfig::default()
    };
    let padding = vec![b'x'; 2 * 1024 * 1024];
    let request = upload_request(&[Part::File("big.xlsx", padding)]);
    let response = router(&config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
