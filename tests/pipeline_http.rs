//! End-to-end runs against a local HTTP server
//!
//! Labels are served by wiremock; the downloader fetches them either directly
//! over HTTP or through the message-passing fetch worker.

mod common;

use common::{label_pdf, label_request, page_tags, serve, test_config};
use label_dl::{
    Event, FetchGateway, HttpFetchGateway, LabelDownloader, Stage, TransformKind,
    spawn_fetch_worker,
};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::MockServer;

fn archive_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

#[tokio::test]
async fn archive_run_over_http_reports_missing_label_and_saves_zip() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    for code in ["THG-1", "THG-2", "THG-4", "THG-5"] {
        serve(&server, &format!("/labels/{code}.pdf"), label_pdf(code)).await;
    }
    let requests: Vec<_> = ["THG-1", "THG-2", "THG-3", "THG-4", "THG-5"]
        .iter()
        .enumerate()
        .map(|(i, code)| label_request(&server, code, i))
        .collect();

    let downloader = LabelDownloader::new(test_config(temp.path())).unwrap();
    let report = downloader
        .run(&requests, TransformKind::Archive)
        .await
        .unwrap();

    assert_eq!(report.success_count, 4);
    assert_eq!(report.failure_count, 1);
    assert_eq!(report.failures[0].order_code, "THG-3");
    assert_eq!(report.failures[0].error, "HTTP 404: Not Found");
    assert_eq!(downloader.stage(), Stage::Done);

    let artifact = report.artifact.as_ref().unwrap();
    assert!(artifact.filename.starts_with("shipping_labels_"));
    assert!(artifact.filename.ends_with(".zip"));
    let entries = archive_entries(&artifact.bytes);
    let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "1000--THG-1.pdf",
            "1001--THG-2.pdf",
            "1003--THG-4.pdf",
            "1004--THG-5.pdf"
        ]
    );
    assert_eq!(entries[0].1, label_pdf("THG-1"));

    let saved = downloader.save(artifact).await.unwrap();
    assert!(saved.starts_with(temp.path().join("labels")));
    assert_eq!(std::fs::read(&saved).unwrap(), artifact.bytes);

    let summary = report.summary(10);
    assert!(summary.starts_with("Downloaded 4/5 labels"));
    assert!(summary.contains("THG-3: HTTP 404: Not Found"));
}

#[tokio::test]
async fn merge_run_over_http_keeps_selection_order() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    for code in ["A", "B", "C"] {
        serve(&server, &format!("/labels/{code}.pdf"), label_pdf(code)).await;
    }
    let requests = vec![
        label_request(&server, "B", 0),
        label_request(&server, "C", 1),
        label_request(&server, "A", 2),
    ];

    let downloader = LabelDownloader::new(test_config(temp.path())).unwrap();
    let report = downloader
        .run(&requests, TransformKind::Merge)
        .await
        .unwrap();

    let artifact = report.artifact.unwrap();
    assert_eq!(page_tags(&artifact.bytes), vec!["B", "C", "A"]);
    assert_eq!(artifact.parts, 3);
    assert!(artifact.print_delay.is_some());
}

#[tokio::test]
async fn merge_run_counts_html_login_page_as_failure() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    serve(&server, "/labels/GOOD.pdf", label_pdf("GOOD")).await;
    serve(
        &server,
        "/labels/STALE.pdf",
        b"<html><body>Please log in</body></html>".to_vec(),
    )
    .await;
    let requests = vec![
        label_request(&server, "GOOD", 0),
        label_request(&server, "STALE", 1),
    ];

    let downloader = LabelDownloader::new(test_config(temp.path())).unwrap();
    let report = downloader
        .run(&requests, TransformKind::Merge)
        .await
        .unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failure_count, 1);
    assert_eq!(report.failures[0].order_code, "STALE");
    assert!(report.failures[0].error.starts_with("unreadable document"));
}

#[tokio::test]
async fn archive_run_through_fetch_worker() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    serve(&server, "/labels/W-1.pdf", label_pdf("W-1")).await;
    serve(&server, "/labels/W-2.pdf", label_pdf("W-2")).await;
    let requests = vec![
        label_request(&server, "W-1", 0),
        label_request(&server, "W-2", 1),
    ];

    let config = test_config(temp.path());
    let http: Arc<dyn FetchGateway> = Arc::new(HttpFetchGateway::new(&config.fetch).unwrap());
    let (client, _worker) = spawn_fetch_worker(http, 16);
    let downloader = LabelDownloader::with_gateway(config, Arc::new(client));
    let mut events = downloader.subscribe();

    let report = downloader
        .run(&requests, TransformKind::Archive)
        .await
        .unwrap();

    assert_eq!(report.success_count, 2);
    let entries = archive_entries(&report.artifact.unwrap().bytes);
    assert_eq!(entries[1].1, label_pdf("W-2"));

    let mut progress_texts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::Progress { text, .. } = event {
            progress_texts.push(text);
        }
    }
    assert!(progress_texts.iter().any(|t| t == "Downloading 1-2 of 2..."));
    assert!(progress_texts.iter().any(|t| t.starts_with("Compressing...")));
}

#[tokio::test]
async fn stopped_fetch_worker_surfaces_channel_errors() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let requests = vec![label_request(&server, "X-1", 0)];

    let config = test_config(temp.path());
    let http: Arc<dyn FetchGateway> = Arc::new(HttpFetchGateway::new(&config.fetch).unwrap());
    let (client, worker) = spawn_fetch_worker(http, 16);
    worker.abort();
    let _ = worker.await;
    let downloader = LabelDownloader::with_gateway(config, Arc::new(client));

    let report = downloader
        .run(&requests, TransformKind::Archive)
        .await
        .unwrap();

    assert!(report.artifact.is_none());
    assert_eq!(report.failure_count, 1);
    assert!(report.failures[0].error.starts_with("channel error"));
}
