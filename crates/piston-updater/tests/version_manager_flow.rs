use md5::Md5;
use piston_updater::game::catalog::VersionCatalog;
use piston_updater::game::download::{DownloadJob, SilentDownloadListener};
use piston_updater::game::manager::RefreshedVersionsListener;
use piston_updater::game::platform::{Environment, OperatingSystem};
use piston_updater::game::version::{ReleaseType, VersionFilter, VersionSource};
use piston_updater::{UpdaterConfig, UpdaterError, VersionManager};
use sha1::{Digest, Sha1};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Handle;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_JAR: &[u8] = b"client jar";
const SOUND: &[u8] = b"grass step";
const LANG: &[u8] = b"language=English";

const VERSION_LIST: &str = r#"{
    "latest": {"release": "1.7.10", "snapshot": "14w02a"},
    "versions": [
        {"id": "14w02a", "type": "snapshot", "time": "2014-01-09T12:00:00+00:00", "releaseTime": "2014-01-09T12:00:00+00:00"},
        {"id": "1.7.10", "type": "release", "time": "2014-06-26T12:00:00+00:00", "releaseTime": "2014-06-26T12:00:00+00:00"}
    ]
}"#;

const VANILLA: &str = r#"{
    "id": "1.7.10",
    "type": "release",
    "time": "2014-06-26T12:00:00+00:00",
    "releaseTime": "2014-06-26T12:00:00+00:00",
    "mainClass": "net.minecraft.client.main.Main",
    "minecraftArguments": "--username ${auth_player_name}",
    "assets": "1.7.10",
    "libraries": [{"name": "com.example:vanilla:1.0"}]
}"#;

const MODDED: &str = r#"{
    "id": "modded",
    "inheritsFrom": "1.7.10",
    "jar": "1.7.10",
    "type": "release",
    "time": "2014-07-01T12:00:00+00:00",
    "releaseTime": "2014-07-01T12:00:00+00:00",
    "mainClass": "net.minecraft.launchwrapper.Launch",
    "libraries": [{"name": "com.example:modloader:2.0"}]
}"#;

fn sha1_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

fn object_path(bytes: &[u8]) -> String {
    let hash = sha1_hex(bytes);
    format!("{}/{}", &hash[..2], hash)
}

async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(path(route)).respond_with(template).mount(server).await;
}

async fn serve_library(server: &MockServer, artifact_path: &str, body: &[u8]) {
    serve(
        server,
        &format!("/libraries/{}.sha1", artifact_path),
        ResponseTemplate::new(200).set_body_string(sha1_hex(body)),
    )
    .await;
    serve(
        server,
        &format!("/libraries/{}", artifact_path),
        ResponseTemplate::new(200).set_body_bytes(body.to_vec()),
    )
    .await;
}

async fn origin() -> MockServer {
    let server = MockServer::start().await;
    serve(&server, "/versions/versions.json", ResponseTemplate::new(200).set_body_string(VERSION_LIST)).await;
    serve(&server, "/versions/1.7.10/1.7.10.json", ResponseTemplate::new(200).set_body_string(VANILLA)).await;
    serve(
        &server,
        "/versions/1.7.10/1.7.10.jar",
        ResponseTemplate::new(200)
            .insert_header("ETag", format!("\"{:x}\"", Md5::digest(CLIENT_JAR)).as_str())
            .set_body_bytes(CLIENT_JAR),
    )
    .await;
    serve_library(&server, "com/example/vanilla/1.0/vanilla-1.0.jar", b"vanilla").await;
    serve_library(&server, "com/example/modloader/2.0/modloader-2.0.jar", b"modloader").await;

    let index = format!(
        r#"{{"objects": {{
            "sounds/step/grass1.ogg": {{"hash": "{sound}", "size": {sound_size}}},
            "sounds/step/grass2.ogg": {{"hash": "{sound}", "size": {sound_size}}},
            "lang/en_US.lang": {{"hash": "{lang}", "size": {lang_size}}}
        }}}}"#,
        sound = sha1_hex(SOUND),
        sound_size = SOUND.len(),
        lang = sha1_hex(LANG),
        lang_size = LANG.len()
    );
    serve(&server, "/indexes/1.7.10.json", ResponseTemplate::new(200).set_body_string(index)).await;
    serve(
        &server,
        &format!("/resources/{}", object_path(SOUND)),
        ResponseTemplate::new(200).set_body_bytes(SOUND),
    )
    .await;
    serve(
        &server,
        &format!("/resources/{}", object_path(LANG)),
        ResponseTemplate::new(200).set_body_bytes(LANG),
    )
    .await;

    server
}

fn write_local(game_dir: &Path, id: &str, json: &str) {
    let dir = game_dir.join("versions").join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.json", id)), json).unwrap();
}

fn manager(game_dir: &Path, base: &str) -> VersionManager {
    let mut config = UpdaterConfig::new(game_dir);
    config.version_base_url = format!("{}/", base);
    config.library_base_url = format!("{}/libraries/", base);
    config.resource_base_url = format!("{}/resources/", base);
    config.max_download_workers = 4;

    VersionManager::new(config, Handle::current())
        .expect("manager")
        .with_environment(Environment::new(OperatingSystem::Linux, "6.1.0", "amd64"))
}

#[derive(Default)]
struct RefreshCounter(AtomicUsize);

impl RefreshedVersionsListener for RefreshCounter {
    fn on_versions_refreshed(&self, _manager: &VersionManager) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn refresh_lists_local_and_remote_newest_first() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = origin().await;
    let dir = TempDir::new().expect("tmpdir");
    write_local(dir.path(), "modded", MODDED);

    let manager = manager(dir.path(), &server.uri());
    let counter = Arc::new(RefreshCounter::default());
    manager.add_refresh_listener(counter.clone());

    manager.refresh_versions().await.expect("refresh");
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert!(!manager.is_refreshing());

    let listed: Vec<_> = manager
        .versions(None)
        .await
        .iter()
        .map(|sync| sync.id().unwrap().to_string())
        .collect();
    assert_eq!(listed, ["modded", "1.7.10", "14w02a"]);

    let releases_only = VersionFilter::new().only_for(&[ReleaseType::Release]).with_max_count(1);
    let listed = manager.versions(Some(&releases_only)).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), Some("modded"));
}

#[tokio::test]
async fn listing_orders_versions_without_release_time() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = origin().await;
    let dir = TempDir::new().expect("tmpdir");
    write_local(dir.path(), "modded", MODDED);
    write_local(
        dir.path(),
        "custom",
        r#"{"id": "custom", "type": "release", "time": "2014-03-01T12:00:00+00:00"}"#,
    );
    write_local(
        dir.path(),
        "patched",
        r#"{"id": "patched", "type": "snapshot", "time": "2014-08-01T12:00:00+00:00"}"#,
    );

    let manager = manager(dir.path(), &server.uri());
    manager.refresh_versions().await.expect("refresh");

    let filter = VersionFilter::new().with_max_count(10);
    let listed: Vec<_> = manager
        .versions(Some(&filter))
        .await
        .iter()
        .map(|sync| sync.id().unwrap().to_string())
        .collect();
    assert_eq!(listed, ["patched", "modded", "1.7.10", "custom", "14w02a"]);
}

#[tokio::test]
async fn resolving_installs_missing_parent() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = origin().await;
    let dir = TempDir::new().expect("tmpdir");
    write_local(dir.path(), "modded", MODDED);

    let manager = manager(dir.path(), &server.uri());
    manager.refresh_versions().await.expect("refresh");

    let sync = manager.version_sync_info("modded").await;
    assert!(sync.is_installed());
    assert_eq!(sync.latest_source(), VersionSource::Local);

    let resolved = sync.local_version().and_then(|v| v.as_complete()).unwrap();
    let libraries: Vec<_> = resolved.libraries.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(libraries, ["com.example:vanilla:1.0", "com.example:modloader:2.0"]);
    assert_eq!(resolved.main_class.as_deref(), Some("net.minecraft.launchwrapper.Launch"));
    assert_eq!(resolved.asset_index_name(), "1.7.10");
    assert!(resolved.inherits_from.is_none());

    // The parent was fetched from the remote and persisted locally
    assert!(dir.path().join("versions/1.7.10/1.7.10.json").is_file());
    assert!(manager.local().version("1.7.10").is_some());

    // Libraries aren't downloaded yet
    assert!(!sync.is_up_to_date());
}

#[tokio::test]
async fn download_version_and_resources() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = origin().await;
    let dir = TempDir::new().expect("tmpdir");
    write_local(dir.path(), "modded", MODDED);

    let manager = manager(dir.path(), &server.uri());
    manager.refresh_versions().await.expect("refresh");
    let sync = manager.version_sync_info("modded").await;

    let job = DownloadJob::new("Version & Libraries", false, Arc::new(SilentDownloadListener));
    let version = manager.download_version(&sync, &job).await.expect("queue version");
    assert_eq!(job.file_count(), 3);

    let resources = DownloadJob::new("Resources", true, Arc::new(SilentDownloadListener));
    manager.download_resources(&resources, &version).await.expect("queue resources");
    // Two logical paths share the sound object
    assert_eq!(resources.file_count(), 2);

    assert_eq!(manager.pool().max_workers(), 4);
    manager.start_job(&job).unwrap();
    manager.start_job(&resources).unwrap();
    job.wait().await;
    resources.wait().await;

    assert!(job.ensure_success().is_ok());
    assert_eq!(std::fs::read(dir.path().join("versions/1.7.10/1.7.10.jar")).unwrap(), CLIENT_JAR);
    assert!(dir
        .path()
        .join("libraries/com/example/modloader/2.0/modloader-2.0.jar")
        .is_file());
    assert!(dir.path().join("assets/indexes/1.7.10.json").is_file());
    assert_eq!(
        std::fs::read(dir.path().join("assets/objects").join(object_path(SOUND))).unwrap(),
        SOUND
    );

    let sync = manager.version_sync_info("modded").await;
    assert!(sync.is_up_to_date());

    // Nothing left to fetch the second time around
    let again = DownloadJob::new("Resources", true, Arc::new(SilentDownloadListener));
    manager.download_resources(&again, &version).await.unwrap();
    assert_eq!(again.file_count(), 0);
}

#[tokio::test]
async fn remote_version_is_synced_locally() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = origin().await;
    let dir = TempDir::new().expect("tmpdir");

    let manager = manager(dir.path(), &server.uri());
    manager.refresh_versions().await.expect("refresh");

    let sync = manager.version_sync_info("1.7.10").await;
    assert!(!sync.is_installed());
    assert_eq!(sync.latest_source(), VersionSource::Remote);

    let synced = manager.sync_version(&sync).await.expect("sync");
    assert!(synced.is_installed());
    assert!(dir.path().join("versions/1.7.10/1.7.10.json").is_file());

    manager.uninstall_version("1.7.10").await.unwrap();
    assert!(!dir.path().join("versions/1.7.10").exists());
}

#[tokio::test]
async fn circular_inheritance_is_reported() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = origin().await;
    let dir = TempDir::new().expect("tmpdir");
    write_local(
        dir.path(),
        "a",
        r#"{"id": "a", "inheritsFrom": "b", "type": "release", "time": "2014-01-01T00:00:00+00:00"}"#,
    );
    write_local(
        dir.path(),
        "b",
        r#"{"id": "b", "inheritsFrom": "a", "type": "release", "time": "2014-01-01T00:00:00+00:00"}"#,
    );

    let manager = manager(dir.path(), &server.uri());
    manager.refresh_versions().await.expect("refresh");

    let a = manager.local().store().get("a").unwrap();
    let err = manager.resolve(a.as_complete().unwrap()).await.unwrap_err();
    assert!(matches!(err, UpdaterError::CircularInheritance { .. }));

    // Listing falls back to the unresolved manifest instead of failing
    let sync = manager.version_sync_info("a").await;
    assert!(sync.is_installed());
}

#[tokio::test]
async fn failed_refresh_notifies_nobody() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = MockServer::start().await;
    serve(&server, "/versions/versions.json", ResponseTemplate::new(503)).await;

    let dir = TempDir::new().expect("tmpdir");
    let manager = manager(dir.path(), &server.uri());
    let counter = Arc::new(RefreshCounter::default());
    manager.add_refresh_listener(counter.clone());

    let err = manager.refresh_versions().await.unwrap_err();
    assert!(matches!(err, UpdaterError::HttpStatus { status: 503, .. }));
    assert!(err.is_transient());
    assert!(!manager.is_refreshing());
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
}
