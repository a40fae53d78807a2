//! Deletion Tests
//!
//! Deleting files cascades into empty versions and packages in both the
//! store and the metadata record, and `latest_version` falls back to the
//! greatest remaining version string.

mod common;

use common::{create_test_setup, entries_under};
use pkg_registry::{ErrorCode, RegistryError};

#[tokio::test]
async fn test_delete_last_file_removes_package() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "agent.whl", b"payload").await?;

    let response = setup.registry.delete_file("agent", "1.0", "agent.whl").await?;
    assert_eq!(response.message, "File 'agent.whl' deleted successfully");

    assert!(!setup.packages_dir().join("agent").exists());
    assert!(setup.metadata_json("agent").is_none());

    let err = setup.registry.get_package("agent").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Package 'agent' not found");
    assert!(setup.registry.list_packages().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_cascades_one_level_at_a_time() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "a.whl", b"a").await?;
    setup.upload("agent", "1.0", "b.whl", b"b").await?;
    setup.upload("agent", "2.0", "a.whl", b"a").await?;

    setup.registry.delete_file("agent", "1.0", "a.whl").await?;
    assert!(setup.packages_dir().join("agent/1.0").is_dir());
    let metadata = setup.metadata_json("agent").expect("record");
    assert_eq!(metadata["versions"]["1.0"]["files"].as_array().map(Vec::len), Some(1));

    setup.registry.delete_file("agent", "1.0", "b.whl").await?;
    assert!(!setup.packages_dir().join("agent/1.0").exists());
    assert!(setup.packages_dir().join("agent/2.0").is_dir());
    let metadata = setup.metadata_json("agent").expect("record");
    assert!(metadata["versions"].get("1.0").is_none());

    let package = setup.registry.get_package("agent").await?;
    assert_eq!(package.versions, vec!["2.0".to_string()]);

    setup.registry.delete_file("agent", "2.0", "a.whl").await?;
    assert!(entries_under(setup.packages_dir()).is_empty());
    assert!(entries_under(setup.metadata_dir()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_latest_falls_back_lexicographically() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "agent.whl", b"1").await?;
    setup.upload("agent", "2.0", "agent.whl", b"2").await?;

    setup.registry.delete_file("agent", "2.0", "agent.whl").await?;
    let package = setup.registry.get_package("agent").await?;
    assert_eq!(package.metadata.latest_version, "1.0");
    Ok(())
}

#[tokio::test]
async fn test_latest_fallback_is_string_order_not_semver() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    for version in ["2.0", "10.0", "3.0"] {
        setup.upload("agent", version, "agent.whl", version.as_bytes()).await?;
    }

    setup.registry.delete_file("agent", "3.0", "agent.whl").await?;
    let package = setup.registry.get_package("agent").await?;
    // "2.0" sorts after "10.0".
    assert_eq!(package.metadata.latest_version, "2.0");

    setup.registry.delete_file("agent", "2.0", "agent.whl").await?;
    let package = setup.registry.get_package("agent").await?;
    assert_eq!(package.metadata.latest_version, "10.0");
    Ok(())
}

#[tokio::test]
async fn test_latest_is_most_recent_upload() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "2.0", "agent.whl", b"2").await?;
    setup.upload("agent", "1.0", "agent.whl", b"1").await?;

    let package = setup.registry.get_package("agent").await?;
    assert_eq!(package.metadata.latest_version, "1.0");

    // Deleting a non-latest version keeps the latest.
    setup.registry.delete_file("agent", "2.0", "agent.whl").await?;
    let package = setup.registry.get_package("agent").await?;
    assert_eq!(package.metadata.latest_version, "1.0");
    Ok(())
}

#[tokio::test]
async fn test_delete_missing_entities() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "agent.whl", b"payload").await?;

    for (name, version, file) in [
        ("agent", "1.0", "missing.whl"),
        ("agent", "9.9", "agent.whl"),
        ("ghost", "1.0", "agent.whl"),
    ] {
        let err = setup.registry.delete_file(name, version, file).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{name}/{version}/{file}: {err}");
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }

    let err = setup.registry.get_version("agent", "9.9").await.unwrap_err();
    assert_eq!(err.to_string(), "Version '9.9' for package 'agent' not found");

    let err = setup
        .registry
        .download("agent", "1.0", "missing.whl")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "File 'missing.whl' not found for package 'agent' version '1.0'"
    );

    // Nothing was disturbed.
    assert!(setup.packages_dir().join("agent/1.0/agent.whl").is_file());
    Ok(())
}

#[tokio::test]
async fn test_delete_without_metadata_record() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "a.whl", b"a").await?;
    setup.upload("agent", "1.0", "b.whl", b"b").await?;
    std::fs::remove_file(setup.metadata_dir().join("agent.json"))?;

    setup.registry.delete_file("agent", "1.0", "a.whl").await?;

    // The record is rebuilt from what is still stored.
    let metadata = setup.metadata_json("agent").expect("rebuilt record");
    assert_eq!(metadata["latest_version"], "1.0");
    assert_eq!(metadata["versions"]["1.0"]["files"][0]["name"], "b.whl");
    Ok(())
}

#[tokio::test]
async fn test_delete_last_file_removes_unreadable_record() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "agent.whl", b"payload").await?;
    std::fs::write(setup.metadata_dir().join("agent.json"), "{ not json")?;

    setup.registry.delete_file("agent", "1.0", "agent.whl").await?;

    assert!(!setup.packages_dir().join("agent").exists());
    assert!(!setup.metadata_dir().join("agent.json").exists());
    Ok(())
}

#[tokio::test]
async fn test_delete_replaces_unreadable_record() -> anyhow::Result<()> {
    let setup = create_test_setup().await?;
    setup.upload("agent", "1.0", "a.whl", b"a").await?;
    setup.upload("agent", "1.0", "b.whl", b"b").await?;
    std::fs::write(setup.metadata_dir().join("agent.json"), "{ not json")?;

    setup.registry.delete_file("agent", "1.0", "a.whl").await?;

    let metadata = setup.metadata_json("agent").expect("rebuilt record");
    assert_eq!(metadata["versions"]["1.0"]["files"][0]["name"], "b.whl");
    Ok(())
}
