use mockito::Matcher;

use updeck::pptx::PPTX_CONTENT_TYPE;
use updeck::purge::purge;
use updeck::storage::{AzureBlobStore, BlobStore, StorageError};

const KEY: &str = "c2VjcmV0";

fn store(url: String) -> AzureBlobStore {
    AzureBlobStore::new(url, "acct", KEY, "decks").expect("valid store")
}

fn listing(names: &[&str], next_marker: Option<&str>) -> String {
    let blobs: String = names
        .iter()
        .map(|n| format!("<Blob><Name>{n}</Name><Properties/></Blob>"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults ContainerName=\"decks\">\
         <Blobs>{blobs}</Blobs><NextMarker>{}</NextMarker></EnumerationResults>",
        next_marker.unwrap_or_default()
    )
}

#[tokio::test]
async fn test_put_sends_block_blob_with_write_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/decks/2024-01-01-00-00-00-AzureUpdates.pptx")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("sv".into(), "2020-12-06".into()),
            Matcher::UrlEncoded("sr".into(), "b".into()),
            Matcher::UrlEncoded("sp".into(), "cw".into()),
        ]))
        .match_header("x-ms-blob-type", "BlockBlob")
        .match_header("x-ms-version", "2020-12-06")
        .match_header("content-type", PPTX_CONTENT_TYPE)
        .match_body("deck-bytes")
        .with_status(201)
        .create_async()
        .await;

    let store = store(server.url());
    store
        .put("2024-01-01-00-00-00-AzureUpdates.pptx", b"deck-bytes".to_vec(), PPTX_CONTENT_TYPE)
        .await
        .expect("upload succeeds");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_put_reports_service_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("PUT", Matcher::Any)
        .with_status(403)
        .with_body("AuthenticationFailed")
        .create_async()
        .await;

    let result = store(server.url()).put("a.pptx", Vec::new(), PPTX_CONTENT_TYPE).await;

    match result {
        Err(StorageError::Status { operation, status, body }) => {
            assert_eq!(operation, "upload");
            assert_eq!(status, 403);
            assert_eq!(body, "AuthenticationFailed");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_list_follows_markers() {
    let mut server = mockito::Server::new_async().await;

    let second = server
        .mock("GET", "/decks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("comp".into(), "list".into()),
            Matcher::UrlEncoded("marker".into(), "page-2".into()),
        ]))
        .with_status(200)
        .with_body(listing(&["AzureUpdate-3"], None))
        .expect(1)
        .create_async()
        .await;
    let first = server
        .mock("GET", "/decks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("restype".into(), "container".into()),
            Matcher::UrlEncoded("comp".into(), "list".into()),
            Matcher::UrlEncoded("prefix".into(), "AzureUpdate-".into()),
            Matcher::UrlEncoded("sr".into(), "c".into()),
            Matcher::UrlEncoded("sp".into(), "l".into()),
        ]))
        .with_status(200)
        .with_body(listing(&["AzureUpdate-1", "AzureUpdate-2"], Some("page-2")))
        .expect(1)
        .create_async()
        .await;

    let names = store(server.url()).list("AzureUpdate-").await.expect("listing");

    assert_eq!(names, vec!["AzureUpdate-1", "AzureUpdate-2", "AzureUpdate-3"]);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_delete_maps_missing_blob() {
    let mut server = mockito::Server::new_async().await;
    let deleted = server
        .mock("DELETE", "/decks/AzureUpdate-1")
        .match_query(Matcher::UrlEncoded("sp".into(), "d".into()))
        .with_status(202)
        .create_async()
        .await;
    let _missing = server
        .mock("DELETE", "/decks/AzureUpdate-9")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let store = store(server.url());
    store.delete("AzureUpdate-1").await.expect("delete succeeds");
    assert!(matches!(
        store.delete("AzureUpdate-9").await,
        Err(StorageError::NotFound(name)) if name == "AzureUpdate-9"
    ));

    deleted.assert_async().await;
}

#[tokio::test]
async fn test_purge_reports_partial_failure() {
    let mut server = mockito::Server::new_async().await;
    let _list = server
        .mock("GET", "/decks")
        .match_query(Matcher::UrlEncoded("prefix".into(), "archive/AzureUpdate-".into()))
        .with_status(200)
        .with_body(listing(&["archive/AzureUpdate-1", "archive/AzureUpdate-2"], None))
        .create_async()
        .await;
    let ok = server
        .mock("DELETE", "/decks/archive/AzureUpdate-1")
        .match_query(Matcher::Any)
        .with_status(202)
        .create_async()
        .await;
    let failing = server
        .mock("DELETE", "/decks/archive/AzureUpdate-2")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("InternalError")
        .create_async()
        .await;

    let report = purge(&store(server.url()), "archive/AzureUpdate-")
        .await
        .expect("listing succeeds");

    assert_eq!(report.deleted, vec!["archive/AzureUpdate-1"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "archive/AzureUpdate-2");
    assert!(!report.is_clean());
    ok.assert_async().await;
    failing.assert_async().await;
}

#[tokio::test]
async fn test_purge_fails_when_listing_fails() {
    let mut server = mockito::Server::new_async().await;
    let _list = server
        .mock("GET", "/decks")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;

    let result = purge(&store(server.url()), "AzureUpdate-").await;
    assert!(matches!(result, Err(StorageError::Status { operation: "list", status: 403, .. })));
}
