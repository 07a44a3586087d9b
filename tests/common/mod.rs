//! Shared helpers for integration tests

#![allow(dead_code)]

use label_dl::{Config, DocumentRequest, FetchConfig};
use lopdf::{Dictionary, Document, Object};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config for fast local runs: chunked fetching, no pdftoppm lookup, output under `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.fetch = FetchConfig {
        concurrency_limit: 3,
        inter_item_delay: Duration::ZERO,
        request_timeout: Duration::from_secs(5),
        ..FetchConfig::default()
    };
    config.output.output_dir = dir.join("labels");
    config.print.search_path = false;
    config
}

/// Single-page PDF whose page carries `/LabelTag /{tag}`
pub fn label_pdf(tag: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set("Parent", Object::Reference(pages_id));
    page.set("LabelTag", Object::Name(tag.as_bytes().to_vec()));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(288),
            Object::Integer(432),
        ]),
    );
    let page_id = doc.add_object(Object::Dictionary(page));

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("failed to write test PDF");
    bytes
}

/// Tags of every page of `pdf`, in page order
pub fn page_tags(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).expect("merged output is not a PDF");
    doc.get_pages()
        .into_values()
        .map(|id| {
            let tag = doc
                .get_dictionary(id)
                .and_then(|page| page.get(b"LabelTag"))
                .and_then(|tag| tag.as_name())
                .expect("page without tag");
            String::from_utf8_lossy(tag).into_owned()
        })
        .collect()
}

/// Serve `body` at `route` on `server`
pub async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

/// Request for `{server}/labels/{code}.pdf` at `index`
pub fn label_request(server: &MockServer, code: &str, index: usize) -> DocumentRequest {
    DocumentRequest::from_row(
        &format!("{}/labels/{}.pdf", server.uri(), code),
        &format!("{}", 1000 + index),
        code,
        index,
    )
}
