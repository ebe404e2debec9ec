//! Behavior every `ArtifactStore` backend must share.

use super::fixtures::{chunked_body, hash, seeded_bytes};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use trc_core::{ArtifactMetadata, ArtifactScope};
use trc_storage::{Artifact, ArtifactStore, StorageError, collect_body};

pub async fn roundtrip(store: &dyn ArtifactStore) {
    let scope = ArtifactScope::new(Some("team_a".to_string()), Some("web".to_string()));
    let data = seeded_bytes(7, 300 * 1024);
    let metadata = ArtifactMetadata::new(data.len() as u64)
        .with_duration_ms(4200)
        .with_tag("sig");

    store
        .put(
            &hash("abc123"),
            &scope,
            Artifact::new(metadata.clone(), chunked_body(data.clone(), 10_000)),
        )
        .await
        .unwrap();

    assert_eq!(
        store.head(&hash("abc123"), &scope).await.unwrap(),
        Some(metadata.clone())
    );
    let artifact = store.get(&hash("abc123"), &scope).await.unwrap().unwrap();
    assert_eq!(artifact.metadata, metadata);
    assert_eq!(collect_body(artifact.body).await.unwrap(), data);
}

pub async fn empty_artifact(store: &dyn ArtifactStore) {
    let scope = ArtifactScope::default();
    store
        .put(
            &hash("e0"),
            &scope,
            Artifact::from_bytes(ArtifactMetadata::default(), Bytes::new()),
        )
        .await
        .unwrap();

    let artifact = store.get(&hash("e0"), &scope).await.unwrap().unwrap();
    assert_eq!(artifact.metadata.size, 0);
    assert!(collect_body(artifact.body).await.unwrap().is_empty());
}

pub async fn scope_isolation(store: &dyn ArtifactStore) {
    let team_a = ArtifactScope::team("a");
    let team_b = ArtifactScope::team("b");
    let team_a_slug = ArtifactScope::new(Some("a".to_string()), Some("x".to_string()));

    store
        .put(
            &hash("1234"),
            &team_a,
            Artifact::from_bytes(ArtifactMetadata::default(), "scoped"),
        )
        .await
        .unwrap();

    assert!(store.head(&hash("1234"), &team_a).await.unwrap().is_some());
    assert!(store.head(&hash("1234"), &team_b).await.unwrap().is_none());
    assert!(store.head(&hash("1234"), &team_a_slug).await.unwrap().is_none());
    assert!(
        store
            .head(&hash("1234"), &ArtifactScope::default())
            .await
            .unwrap()
            .is_none()
    );
}

pub async fn overwrite_last_writer_wins(store: &dyn ArtifactStore) {
    let scope = ArtifactScope::default();
    for body in ["first", "second!"] {
        store
            .put(
                &hash("0ff"),
                &scope,
                Artifact::from_bytes(ArtifactMetadata::default().with_tag(body), body),
            )
            .await
            .unwrap();
    }

    let artifact = store.get(&hash("0ff"), &scope).await.unwrap().unwrap();
    assert_eq!(artifact.metadata.size, 7);
    assert_eq!(artifact.metadata.tag.as_deref(), Some("second!"));
    assert_eq!(collect_body(artifact.body).await.unwrap(), "second!");
}

pub async fn query_mixed(store: &dyn ArtifactStore) {
    let scope = ArtifactScope::team("q");
    let metadata = ArtifactMetadata::new(5).with_duration_ms(120);
    store
        .put(
            &hash("a1"),
            &scope,
            Artifact::from_bytes(metadata.clone(), "hello"),
        )
        .await
        .unwrap();

    let result = store
        .query(&[hash("a1"), hash("b2"), hash("a1")], &scope)
        .await
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result[&hash("a1")], Some(metadata));
    assert_eq!(result[&hash("b2")], None);
}

pub async fn size_mismatch_rejected(store: &dyn ArtifactStore) {
    let scope = ArtifactScope::default();
    let err = store
        .put(
            &hash("5ee"),
            &scope,
            Artifact::new(
                ArtifactMetadata::new(4),
                chunked_body(Bytes::from_static(b"too long"), 3),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::SizeMismatch {
            expected: 4,
            actual: 8
        }
    ));
    assert!(store.head(&hash("5ee"), &scope).await.unwrap().is_none());
}

/// Concurrent writers with distinct sizes and tags on one hash, with a reader
/// polling throughout. Every observed artifact must be one writer's complete
/// body paired with that same writer's metadata.
pub async fn concurrent_puts_keep_metadata_with_body(
    store: Arc<dyn ArtifactStore>,
    rounds: usize,
) {
    let scope = ArtifactScope::default();
    let writes: Arc<Vec<(ArtifactMetadata, Bytes)>> = Arc::new(
        (0..8u64)
            .map(|w| {
                let body = seeded_bytes(w, 1000 + 37 * w as usize);
                let metadata = ArtifactMetadata::new(body.len() as u64).with_tag(format!("w{w}"));
                (metadata, body)
            })
            .collect(),
    );

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let store = store.clone();
        let scope = scope.clone();
        let writes = writes.clone();
        let done = done.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::Acquire) {
                if let Some(Artifact { metadata, body }) =
                    store.get(&hash("cc"), &scope).await.unwrap()
                {
                    let data = collect_body(body).await.unwrap();
                    assert_from_single_write(&writes, &metadata, &data);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..rounds {
        let writers: Vec<_> = writes
            .iter()
            .cloned()
            .map(|(metadata, body)| {
                let store = store.clone();
                let scope = scope.clone();
                tokio::spawn(async move {
                    store
                        .put(
                            &hash("cc"),
                            &scope,
                            Artifact::new(metadata, chunked_body(body, 256)),
                        )
                        .await
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let Artifact { metadata, body } = store.get(&hash("cc"), &scope).await.unwrap().unwrap();
        let data = collect_body(body).await.unwrap();
        assert_from_single_write(&writes, &metadata, &data);
    }

    done.store(true, Ordering::Release);
    reader.await.unwrap();
}

fn assert_from_single_write(
    writes: &[(ArtifactMetadata, Bytes)],
    metadata: &ArtifactMetadata,
    data: &Bytes,
) {
    assert_eq!(
        metadata.size,
        data.len() as u64,
        "metadata size must match the served body"
    );
    let (expected, body) = writes
        .iter()
        .find(|(m, _)| m.tag == metadata.tag)
        .expect("tag must come from one of the writers");
    assert_eq!(metadata, expected);
    assert_eq!(data, body, "body and metadata must come from the same put");
}
