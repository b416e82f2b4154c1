#[path = "helpers/mod.rs"]
mod helpers;

use blobsnap_services::{
    Content, ContainerAccess, JsonEquality, SkipReason, Storage, StorageError, UniqueUploadRequest,
    UploadOutcome, UploadRequest,
};
use chrono::Duration;
use helpers::{setup_test_env, CountingEquality, CONTAINER};
use std::sync::Arc;

#[tokio::test]
async fn test_first_upload_writes_direct_and_latest() {
    let env = setup_test_env().await;

    let outcome = env.uploader.upload_if_unique(env.request("hello")).await.unwrap();

    let result = outcome.into_result().expect("first upload is never skipped");
    let direct = result.direct.unwrap();
    let latest = result.latest.unwrap();
    assert_eq!(direct.key, "prefix/2024.05.01.12.00.00.txt");
    assert_eq!(latest.key, "prefix/latest.txt");
    assert_eq!(
        latest.url,
        "http://localhost:8080/blobs/snapshots/prefix/latest.txt"
    );
    assert_eq!(env.read(&direct.key).await, "hello");
    assert_eq!(env.latest().await, "hello");
    assert_eq!(
        env.trace.contents(),
        "Checking for existing latest content... non-existent. Uploading.\n"
    );
}

#[tokio::test]
async fn test_missing_container_is_created() {
    let env = setup_test_env().await;
    assert!(!env.storage.container_exists(CONTAINER).await.unwrap());

    env.uploader.upload_if_unique(env.request("hello")).await.unwrap();

    assert!(env.storage.container_exists(CONTAINER).await.unwrap());
}

#[tokio::test]
async fn test_identical_upload_is_skipped_without_writes() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("hello")).await.unwrap();
    let mutations = env.storage.mutations();

    env.clock.advance(Duration::seconds(5));
    let outcome = env.uploader.upload_if_unique(env.request("hello")).await.unwrap();

    assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::Identical));
    assert_eq!(env.storage.mutations(), mutations);
    assert!(!env.storage.exists(CONTAINER, &env.direct_key_now()).await.unwrap());
    assert!(env
        .trace
        .contents()
        .ends_with("Checking for existing latest content... exactly the same! No upload required.\n"));
}

#[tokio::test]
async fn test_identical_upload_is_skipped_after_long_gap() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("report v1")).await.unwrap();

    env.clock.advance(Duration::days(30));
    let outcome = env.uploader.upload_if_unique(env.request("report v1")).await.unwrap();

    assert!(outcome.is_skipped());
}

#[tokio::test]
async fn test_different_content_is_uploaded() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("v1")).await.unwrap();

    env.clock.advance(Duration::seconds(1));
    let outcome = env.uploader.upload_if_unique(env.request("v2")).await.unwrap();

    let result = outcome.into_result().unwrap();
    assert_eq!(result.direct.unwrap().key, "prefix/2024.05.01.12.00.01.txt");
    assert_eq!(env.latest().await, "v2");
    assert_eq!(env.read("prefix/2024.05.01.12.00.00.txt").await, "v1");
    assert!(env
        .trace
        .contents()
        .ends_with("Checking for existing latest content... different. Uploading.\n"));
}

#[tokio::test]
async fn test_equality_not_consulted_when_hashes_match() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("same")).await.unwrap();

    let strategy = CountingEquality::new(false);
    env.clock.advance(Duration::seconds(1));
    let outcome = env
        .uploader
        .upload_if_unique(env.request("same").equality(strategy.clone()))
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::Identical));
    assert_eq!(strategy.calls(), 0);
}

#[tokio::test]
async fn test_equality_consulted_once_with_full_candidate() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("original")).await.unwrap();
    let mutations = env.storage.mutations();

    let strategy = CountingEquality::new(true);
    env.clock.advance(Duration::seconds(1));
    let outcome = env
        .uploader
        .upload_if_unique(env.request("reworded").equality(strategy.clone()))
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::Equivalent));
    assert_eq!(strategy.calls(), 1);
    assert_eq!(
        strategy.seen_candidates.lock().unwrap().as_slice(),
        &[b"reworded".to_vec()]
    );
    assert_eq!(env.storage.mutations(), mutations);
    assert_eq!(env.latest().await, "original");
    assert!(env
        .trace
        .contents()
        .ends_with("equivalent! No upload required.\n"));
}

#[tokio::test]
async fn test_rejected_equivalence_uploads_full_content() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("original")).await.unwrap();

    let strategy = CountingEquality::new(false);
    env.clock.advance(Duration::seconds(1));
    let outcome = env
        .uploader
        .upload_if_unique(env.request("changed").equality(strategy.clone()))
        .await
        .unwrap();

    assert!(!outcome.is_skipped());
    assert_eq!(strategy.calls(), 1);
    // The strategy consumed the candidate; the upload must still see all of it.
    assert_eq!(env.latest().await, "changed");
    assert_eq!(env.read(&env.direct_key_now()).await, "changed");
}

#[tokio::test]
async fn test_json_equality_skips_reformatted_document() {
    let env = setup_test_env().await;
    env.uploader
        .upload_if_unique(env.request(r#"{"name":"a","tags":[1,2]}"#))
        .await
        .unwrap();

    env.clock.advance(Duration::minutes(1));
    let outcome = env
        .uploader
        .upload_if_unique(
            env.request("{\n  \"tags\": [1, 2],\n  \"name\": \"a\"\n}")
                .equality(Arc::new(JsonEquality)),
        )
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::Equivalent));

    let outcome = env
        .uploader
        .upload_if_unique(
            env.request(r#"{"name":"b","tags":[1,2]}"#)
                .equality(Arc::new(JsonEquality)),
        )
        .await
        .unwrap();
    assert!(!outcome.is_skipped());
}

#[tokio::test]
async fn test_non_seekable_content_is_rejected_before_any_io() {
    let env = setup_test_env().await;

    let request = UniqueUploadRequest::new(
        UploadRequest::new(CONTAINER, env.template(), Content::stream(&b"hello"[..]))
            .write_latest(true),
    );
    let result = env.uploader.upload_if_unique(request).await;

    assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    assert!(!env.storage.container_exists(CONTAINER).await.unwrap());
    assert_eq!(env.storage.mutations(), 0);
    assert!(env.trace.contents().is_empty());
}

#[tokio::test]
async fn test_unique_upload_forces_latest() {
    let env = setup_test_env().await;

    let request = UniqueUploadRequest::new(UploadRequest::new(
        CONTAINER,
        env.template(),
        Content::from_bytes("hello"),
    ));
    let result = env.uploader.upload_if_unique(request).await.unwrap();

    assert!(result.into_result().unwrap().latest.is_some());
    assert_eq!(env.latest().await, "hello");
}

#[tokio::test]
async fn test_only_unique_disabled_always_uploads() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("hello")).await.unwrap();
    let trace_before = env.trace.contents();

    env.clock.advance(Duration::seconds(1));
    let request = UniqueUploadRequest::new(UploadRequest::new(
        CONTAINER,
        env.template(),
        Content::stream(&b"hello"[..]),
    ))
    .only_unique(false);
    let outcome = env.uploader.upload_if_unique(request).await.unwrap();

    let result = outcome.into_result().unwrap();
    assert_eq!(result.direct.unwrap().key, "prefix/2024.05.01.12.00.01.txt");
    assert!(result.latest.is_none());
    assert_eq!(env.trace.contents(), trace_before);
}

#[tokio::test]
async fn test_latest_without_recorded_md5_is_hashed() {
    let env = setup_test_env().await;
    env.storage
        .create_container_if_absent(CONTAINER, ContainerAccess::Private)
        .await
        .unwrap();
    let prefix = env.dir.path().join(CONTAINER).join("prefix");
    std::fs::create_dir_all(&prefix).unwrap();
    std::fs::write(prefix.join("latest.txt"), b"placed by hand").unwrap();

    let outcome = env
        .uploader
        .upload_if_unique(env.request("placed by hand"))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::Identical));

    // The buffered latest content is still available to the strategy.
    let strategy = Arc::new(blobsnap_services::FnEquality(|candidate: &[u8], latest: &[u8]| {
        candidate.eq_ignore_ascii_case(latest)
    }));
    let outcome = env
        .uploader
        .upload_if_unique(env.request("PLACED BY HAND").equality(strategy))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::Equivalent));

    // Rejected by the strategy: the upload is guarded by the version first read.
    let strategy = Arc::new(blobsnap_services::FnEquality(|_: &[u8], _: &[u8]| false));
    let outcome = env
        .uploader
        .upload_if_unique(env.request("replacement").equality(strategy))
        .await
        .unwrap();
    assert!(!outcome.is_skipped());
    assert_eq!(env.latest().await, "replacement");
}

#[tokio::test]
async fn test_latest_overwritten_outside_the_store_is_not_trusted() {
    let env = setup_test_env().await;
    env.uploader.upload_if_unique(env.request("hello")).await.unwrap();

    let latest_path = env.dir.path().join(CONTAINER).join("prefix").join("latest.txt");
    std::fs::write(&latest_path, b"changed!!").unwrap();

    env.clock.advance(Duration::seconds(1));
    let outcome = env.uploader.upload_if_unique(env.request("hello")).await.unwrap();

    assert!(!outcome.is_skipped());
    assert_eq!(env.latest().await, "hello");
    assert!(env
        .trace
        .contents()
        .ends_with("Checking for existing latest content... different. Uploading.\n"));
}
