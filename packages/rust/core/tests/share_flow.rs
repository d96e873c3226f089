//! Publishing a built document through the HTTP publisher, and plan
//! persistence through the libSQL store.

mod common;

use std::sync::Arc;

use common::*;
use everythingpdf_core::Session;
use everythingpdf_publish::HttpPublisher;
use everythingpdf_shared::{EverythingPdfError, KeyValueStore, TIER_STORAGE_KEY, Tier};
use everythingpdf_storage::Storage;
use url::Url;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn publisher_for(server: &MockServer) -> Arc<HttpPublisher> {
    let base = Url::parse(&server.uri()).unwrap();
    Arc::new(HttpPublisher::new(base.clone(), base, "public").unwrap())
}

#[tokio::test]
async fn share_uploads_and_returns_public_link() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/public/everythingpdf-\d+\.pdf$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = free_session()
        .await
        .with_publisher(publisher_for(&server).await);
    session.add_inputs(vec![pdf_input("a.pdf", 2)]);
    session.build().await.expect("build");
    assert!(session.can_share());

    let name = everythingpdf_publish::suggested_name();
    let url = session.share(name.clone()).await.expect("share");
    assert_eq!(url, format!("{}/public/{name}", server.uri()));
    assert!(session.can_download());
}

#[tokio::test]
async fn upload_failure_leaves_build_intact() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut session = free_session()
        .await
        .with_publisher(publisher_for(&server).await);
    session.add_inputs(vec![pdf_input("a.pdf", 1)]);
    session.build().await.expect("build");

    let err = session.share("x.pdf").await.unwrap_err();
    assert!(matches!(err, EverythingPdfError::Publish(_)));
    assert!(session.can_download());
    assert!(session.artifact().is_some());
}

#[tokio::test]
async fn plan_survives_restart_with_libsql_store() {
    let db = temp_path("state.db");
    std::fs::create_dir_all(db.parent().unwrap()).unwrap();

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(Storage::open(&db).await.expect("open db"));
        let mut session = Session::open(store).await.expect("session");
        assert_eq!(session.tier(), Tier::Free);
        session.upgrade().await.expect("upgrade");
    }

    let storage = Storage::open(&db).await.expect("reopen db");
    assert_eq!(
        storage.get(TIER_STORAGE_KEY).await.unwrap().as_deref(),
        Some("1")
    );
    let session = Session::open(Arc::new(storage)).await.expect("session");
    assert_eq!(session.tier(), Tier::Pro);

    let _ = std::fs::remove_dir_all(db.parent().unwrap());
}
